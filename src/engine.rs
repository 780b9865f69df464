//! Arbitrage Engine
//!
//! One evaluation cycle:
//! Idle -> Snapshotting -> Optimizing -> Validating -> Deciding -> {Execute | Skip} -> Idle
//!
//! Every failure inside a cycle ends in a `Skip`; nothing propagates past
//! `run_cycle`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};

use crate::collector::PoolDataCollector;
use crate::error::ArbError;
use crate::network::{NetworkConditions, NetworkConditionsSampler};
use crate::pools::PoolSnapshot;
use crate::route::ArbitrageRoute;
use crate::simulation::{ExecutionSimulator, ProfitabilityGate, RouteValidator, TradeSizeOptimizer};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cycles above this congestion are skipped
    pub max_congestion: Decimal,
    pub min_pool_tvl_usd: Decimal,
    pub pool_ids: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_congestion: dec!(0.9),
            min_pool_tvl_usd: dec!(10000),
            pool_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CyclePhase {
    #[default]
    Idle,
    Snapshotting,
    Optimizing,
    Validating,
    Deciding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A required snapshot or the network view was missing
    DataUnavailable(String),
    /// A collaborator call failed; the scheduler backs off
    Upstream(String),
    NetworkCongested(Decimal),
    InsufficientPools(usize),
    NoOpportunity,
    ValidationFailed,
    Unprofitable,
    /// Another cycle on this engine has not finished yet
    CycleInProgress,
}

impl SkipReason {
    /// Only upstream failures count as cycle errors for backoff
    pub fn is_cycle_error(&self) -> bool {
        matches!(self, SkipReason::Upstream(_))
    }

    fn from_report(report: &eyre::Report) -> Self {
        match report.downcast_ref::<ArbError>() {
            Some(ArbError::DataUnavailable(msg)) => SkipReason::DataUnavailable(msg.clone()),
            Some(err) if !err.is_transient() => SkipReason::DataUnavailable(err.to_string()),
            _ => SkipReason::Upstream(format!("{:#}", report)),
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DataUnavailable(msg) => write!(f, "data unavailable: {}", msg),
            SkipReason::Upstream(msg) => write!(f, "upstream failure: {}", msg),
            SkipReason::NetworkCongested(c) => write!(f, "network congested ({})", c.round_dp(3)),
            SkipReason::InsufficientPools(n) => write!(f, "only {} usable pools", n),
            SkipReason::NoOpportunity => write!(f, "no profitable route"),
            SkipReason::ValidationFailed => write!(f, "simulation rejected route"),
            SkipReason::Unprofitable => write!(f, "route failed profitability gate"),
            SkipReason::CycleInProgress => write!(f, "previous cycle still running"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Execute(ArbitrageRoute),
    Skip(SkipReason),
}

impl CycleOutcome {
    pub fn route(&self) -> Option<&ArbitrageRoute> {
        match self {
            CycleOutcome::Execute(route) => Some(route),
            CycleOutcome::Skip(_) => None,
        }
    }
}

pub struct ArbitrageEngine<C, N, S> {
    collector: C,
    sampler: N,
    optimizer: TradeSizeOptimizer,
    validator: RouteValidator<S>,
    gate: ProfitabilityGate,
    config: EngineConfig,
    phase: Mutex<CyclePhase>,
    cycles: AtomicU64,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when the cycle ends or its future is dropped
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<C, N, S> ArbitrageEngine<C, N, S>
where
    C: PoolDataCollector,
    N: NetworkConditionsSampler,
    S: ExecutionSimulator,
{
    pub fn new(
        collector: C,
        sampler: N,
        optimizer: TradeSizeOptimizer,
        validator: RouteValidator<S>,
        gate: ProfitabilityGate,
        config: EngineConfig,
    ) -> Self {
        Self {
            collector,
            sampler,
            optimizer,
            validator,
            gate,
            config,
            phase: Mutex::new(CyclePhase::Idle),
            cycles: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.lock()
    }

    /// Cycles started so far
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    fn enter(&self, phase: CyclePhase) {
        *self.phase.lock() = phase;
    }

    /// Run one cycle. A call made while another cycle is running returns
    /// `Skip(CycleInProgress)` without touching engine state.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Cycle requested while another is running");
            return CycleOutcome::Skip(SkipReason::CycleInProgress);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let started = Utc::now();
        debug!("Cycle {} started at {}", cycle, started.format("%H:%M:%S%.3f"));

        let outcome = self.evaluate().await;
        self.enter(CyclePhase::Idle);

        let elapsed_ms = (Utc::now() - started).num_milliseconds();
        match &outcome {
            CycleOutcome::Execute(route) => {
                info!("Cycle {} accepted in {}ms: {}", cycle, elapsed_ms, route.summary())
            }
            CycleOutcome::Skip(reason) if reason.is_cycle_error() => {
                warn!("Cycle {} skipped after {}ms: {}", cycle, elapsed_ms, reason)
            }
            CycleOutcome::Skip(reason) => {
                debug!("Cycle {} skipped after {}ms: {}", cycle, elapsed_ms, reason)
            }
        }
        outcome
    }

    async fn evaluate(&self) -> CycleOutcome {
        self.enter(CyclePhase::Snapshotting);
        let (snapshots, conditions) = match self.gather().await {
            Ok(inputs) => inputs,
            Err(reason) => return CycleOutcome::Skip(reason),
        };

        let congestion = conditions.congestion();
        if congestion > self.config.max_congestion {
            return CycleOutcome::Skip(SkipReason::NetworkCongested(congestion));
        }

        let pools = self.usable_pools(snapshots);
        if pools.len() < 2 {
            return CycleOutcome::Skip(SkipReason::InsufficientPools(pools.len()));
        }

        self.enter(CyclePhase::Optimizing);
        let Some(route) = self.optimizer.find_optimal_route(&pools, &conditions) else {
            return CycleOutcome::Skip(SkipReason::NoOpportunity);
        };

        self.enter(CyclePhase::Validating);
        if !self.validator.validate(&route).await {
            return CycleOutcome::Skip(SkipReason::ValidationFailed);
        }

        self.enter(CyclePhase::Deciding);
        if !self.gate.is_profitable(&route, &conditions) {
            return CycleOutcome::Skip(SkipReason::Unprofitable);
        }

        CycleOutcome::Execute(route)
    }

    /// Fetch every snapshot and the network view concurrently.
    /// Any missing or failed input aborts the cycle.
    async fn gather(&self) -> Result<(Vec<PoolSnapshot>, NetworkConditions), SkipReason> {
        let fetches = self.config.pool_ids.iter().map(|id| self.collector.snapshot(id));
        let (results, conditions) = tokio::join!(join_all(fetches), self.sampler.sample());

        let conditions = conditions.map_err(|e| SkipReason::from_report(&e))?;

        let mut snapshots = Vec::with_capacity(results.len());
        for (id, result) in self.config.pool_ids.iter().zip(results) {
            match result {
                Ok(Some(snapshot)) => snapshots.push(snapshot),
                Ok(None) => {
                    return Err(SkipReason::DataUnavailable(format!("no snapshot for pool {}", id)))
                }
                Err(e) => return Err(SkipReason::from_report(&e)),
            }
        }

        Ok((snapshots, conditions))
    }

    /// Drop invalid pools and pools below the TVL floor
    fn usable_pools(&self, snapshots: Vec<PoolSnapshot>) -> Vec<PoolSnapshot> {
        snapshots
            .into_iter()
            .filter(|s| {
                if let Err(e) = s.validate() {
                    warn!("Excluding pool: {}", e);
                    return false;
                }
                if s.tvl_usd < self.config.min_pool_tvl_usd {
                    debug!(
                        "Excluding pool {}: TVL ${} below ${}",
                        s.address,
                        s.tvl_usd.round_dp(2),
                        self.config.min_pool_tvl_usd
                    );
                    return false;
                }
                debug!(
                    "Using pool {}: price {} | TVL ${} | effective spread {}",
                    s.address,
                    s.price,
                    s.tvl_usd.round_dp(2),
                    s.effective_spread().round_dp(6)
                );
                true
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::FixtureCollector;
    use crate::pools::{ActiveLiquidity, LiquidityModel, PairDecimals, PoolFees};
    use crate::simulation::{FeeModel, OptimizerConfig, SnapshotSimulator, ValidatorConfig};
    use async_trait::async_trait;
    use rust_decimal::prelude::ToPrimitive;

    struct FixedConditions(Result<NetworkConditions, ArbError>);

    #[async_trait]
    impl NetworkConditionsSampler for FixedConditions {
        async fn sample(&self) -> eyre::Result<NetworkConditions> {
            self.0.clone().map_err(Into::into)
        }
    }

    fn pool(address: &str, price: Decimal, tvl_usd: Decimal) -> PoolSnapshot {
        let base_sol = 100_000u64;
        PoolSnapshot {
            address: address.to_string(),
            price,
            active_liquidity: ActiveLiquidity {
                base_amount: base_sol * 1_000_000_000,
                quote_amount: (Decimal::from(base_sol) * price * dec!(1000000)).to_u64().unwrap(),
            },
            fees: PoolFees { base_fee_rate: dec!(0.0001), volatility_fee_rate: Decimal::ZERO },
            tvl_usd,
            decimals: PairDecimals::default(),
            model: LiquidityModel::ConstantProduct,
        }
    }

    fn engine(
        pools: Vec<PoolSnapshot>,
        conditions: Result<NetworkConditions, ArbError>,
    ) -> ArbitrageEngine<FixtureCollector, FixedConditions, SnapshotSimulator> {
        let config = EngineConfig {
            pool_ids: pools.iter().map(|p| p.address.clone()).collect(),
            ..EngineConfig::default()
        };
        ArbitrageEngine::new(
            FixtureCollector::new(pools.clone()),
            FixedConditions(conditions),
            TradeSizeOptimizer::new(OptimizerConfig::default(), FeeModel::default()),
            RouteValidator::new(SnapshotSimulator::from_snapshots(pools), ValidatorConfig::default()),
            ProfitabilityGate::default(),
            config,
        )
    }

    fn calm() -> Result<NetworkConditions, ArbError> {
        Ok(NetworkConditions::new(dec!(0.2), 100_000))
    }

    #[tokio::test]
    async fn test_profitable_cycle_executes_and_returns_to_idle() {
        let e = engine(
            vec![pool("low", dec!(100), dec!(1000000)), pool("high", dec!(110), dec!(1000000))],
            calm(),
        );
        let outcome = e.run_cycle().await;

        let route = outcome.route().unwrap();
        assert_eq!(route.source_pool, "low");
        assert_eq!(e.phase(), CyclePhase::Idle);
        assert_eq!(e.cycles(), 1);
    }

    #[tokio::test]
    async fn test_congested_network_skips() {
        let e = engine(
            vec![pool("low", dec!(100), dec!(1000000)), pool("high", dec!(110), dec!(1000000))],
            Ok(NetworkConditions::new(dec!(0.95), 100_000)),
        );
        assert!(matches!(
            e.run_cycle().await,
            CycleOutcome::Skip(SkipReason::NetworkCongested(_))
        ));
    }

    #[tokio::test]
    async fn test_low_tvl_pools_are_excluded() {
        let e = engine(
            vec![pool("low", dec!(100), dec!(5000)), pool("high", dec!(110), dec!(1000000))],
            calm(),
        );
        assert_eq!(
            e.run_cycle().await,
            CycleOutcome::Skip(SkipReason::InsufficientPools(1))
        );
    }

    #[tokio::test]
    async fn test_missing_snapshot_aborts_cycle() {
        let mut e = engine(vec![pool("low", dec!(100), dec!(1000000))], calm());
        e.config.pool_ids.push("ghost".to_string());

        let outcome = e.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Skip(SkipReason::DataUnavailable(_))));
        assert_eq!(e.phase(), CyclePhase::Idle);
    }

    #[tokio::test]
    async fn test_sampler_failures_are_classified() {
        let pools = vec![pool("low", dec!(100), dec!(1000000)), pool("high", dec!(110), dec!(1000000))];

        let e = engine(pools.clone(), Err(ArbError::TransientUpstream("timeout".into())));
        let CycleOutcome::Skip(reason) = e.run_cycle().await else {
            panic!("expected skip");
        };
        assert!(reason.is_cycle_error());

        let e = engine(pools, Err(ArbError::DataUnavailable("no samples".into())));
        let CycleOutcome::Skip(reason) = e.run_cycle().await else {
            panic!("expected skip");
        };
        assert!(!reason.is_cycle_error());
    }

    #[tokio::test]
    async fn test_equal_prices_find_no_opportunity() {
        let e = engine(
            vec![pool("a", dec!(100), dec!(1000000)), pool("b", dec!(100), dec!(1000000))],
            calm(),
        );
        assert_eq!(e.run_cycle().await, CycleOutcome::Skip(SkipReason::NoOpportunity));
    }

    /// Holds every sample long enough for a second cycle to overlap
    struct SlowConditions;

    #[async_trait]
    impl NetworkConditionsSampler for SlowConditions {
        async fn sample(&self) -> eyre::Result<NetworkConditions> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(NetworkConditions::new(dec!(0.2), 100_000))
        }
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_skipped() {
        let pools = vec![pool("low", dec!(100), dec!(1000000)), pool("high", dec!(110), dec!(1000000))];
        let e = ArbitrageEngine::new(
            FixtureCollector::new(pools.clone()),
            SlowConditions,
            TradeSizeOptimizer::new(OptimizerConfig::default(), FeeModel::default()),
            RouteValidator::new(SnapshotSimulator::from_snapshots(pools.clone()), ValidatorConfig::default()),
            ProfitabilityGate::default(),
            EngineConfig {
                pool_ids: pools.iter().map(|p| p.address.clone()).collect(),
                ..EngineConfig::default()
            },
        );

        let (first, second) = tokio::join!(e.run_cycle(), e.run_cycle());
        assert!(first.route().is_some());
        assert_eq!(second, CycleOutcome::Skip(SkipReason::CycleInProgress));
        assert!(!SkipReason::CycleInProgress.is_cycle_error());
        assert_eq!(e.cycles(), 1);

        // The flag is released once the first cycle finishes
        assert!(e.run_cycle().await.route().is_some());
        assert_eq!(e.cycles(), 2);
    }
}
