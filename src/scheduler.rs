//! Cycle scheduler
//!
//! `tick` is the pure decision of what a finished cycle yields and how long
//! to wait before the next one; `run` drives the engine with it.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::collector::PoolDataCollector;
use crate::engine::{ArbitrageEngine, CycleOutcome};
use crate::network::NetworkConditionsSampler;
use crate::route::ArbitrageRoute;
use crate::simulation::ExecutionSimulator;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Minimum delay between cycles
    pub retry_delay: Duration,
    /// Consecutive cycle errors before alerting
    pub max_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(1_000),
            max_retries: 3,
        }
    }
}

/// Route to hand off (if any) and the delay before the next cycle.
/// A cycle error doubles the base delay once; anything else uses it as is.
pub fn tick(outcome: CycleOutcome, base_delay: Duration) -> (Option<ArbitrageRoute>, Duration) {
    match outcome {
        CycleOutcome::Execute(route) => (Some(route), base_delay),
        CycleOutcome::Skip(reason) if reason.is_cycle_error() => (None, base_delay.saturating_mul(2)),
        CycleOutcome::Skip(_) => (None, base_delay),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub routes: u64,
    pub cycle_errors: u64,
}

/// Run cycles until `max_cycles` (forever if `None`), passing every accepted
/// route to `on_route`. Errors never stop the loop.
pub async fn run<C, N, S, F>(
    engine: &ArbitrageEngine<C, N, S>,
    config: &SchedulerConfig,
    max_cycles: Option<u64>,
    mut on_route: F,
) -> RunSummary
where
    C: PoolDataCollector,
    N: NetworkConditionsSampler,
    S: ExecutionSimulator,
    F: FnMut(ArbitrageRoute),
{
    let mut summary = RunSummary::default();
    let mut consecutive_failures = 0u32;

    loop {
        let outcome = engine.run_cycle().await;
        let failed = matches!(&outcome, CycleOutcome::Skip(reason) if reason.is_cycle_error());
        summary.cycles += 1;

        if failed {
            summary.cycle_errors += 1;
            consecutive_failures += 1;
            if consecutive_failures == config.max_retries {
                error!("{} consecutive cycle failures, still retrying", consecutive_failures);
            }
        } else {
            if consecutive_failures > 0 {
                info!("Recovered after {} failed cycles", consecutive_failures);
            }
            consecutive_failures = 0;
        }

        let (route, delay) = tick(outcome, config.retry_delay);
        if let Some(route) = route {
            summary.routes += 1;
            on_route(route);
        }

        if max_cycles.is_some_and(|max| summary.cycles >= max) {
            break;
        }
        if failed {
            warn!("Backing off for {}ms", delay.as_millis());
        }
        tokio::time::sleep(delay).await;
    }

    summary
}
