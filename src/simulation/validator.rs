//! Route Validator
//!
//! Replays both legs of a route through an `ExecutionSimulator` and rejects
//! it when the simulated final output strays from the analytical prediction.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

use super::simulator::ExecutionSimulator;
use crate::error::ArbError;
use crate::route::ArbitrageRoute;

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Maximum relative deviation of the final output, inclusive
    pub tolerance: Decimal,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self { tolerance: dec!(0.01) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub simulated_intermediate: u64,
    pub simulated_output: u64,
    pub deviation: Decimal,
}

pub struct RouteValidator<S> {
    simulator: S,
    config: ValidatorConfig,
}

impl<S> RouteValidator<S>
where
    S: ExecutionSimulator,
{
    pub fn new(simulator: S, config: ValidatorConfig) -> Self {
        Self { simulator, config }
    }

    /// `|simulated - expected| / expected`; `None` when nothing was expected
    pub fn deviation(expected: u64, simulated: u64) -> Option<Decimal> {
        if expected == 0 {
            return None;
        }
        Some(Decimal::from(expected.abs_diff(simulated)) / Decimal::from(expected))
    }

    /// Simulate both legs and measure the final deviation.
    pub async fn check(&self, route: &ArbitrageRoute) -> Result<ValidationReport, ArbError> {
        let buy = self
            .simulator
            .simulate_leg(&route.source_pool, route.input_amount, true)
            .await
            .map_err(|e| ArbError::divergence(&route.source_pool, format!("buy leg errored: {}", e)))?;
        if !buy.success {
            return Err(ArbError::divergence(&route.source_pool, "buy leg failed"));
        }

        let sell = self
            .simulator
            .simulate_leg(&route.dest_pool, buy.output_amount, false)
            .await
            .map_err(|e| ArbError::divergence(&route.dest_pool, format!("sell leg errored: {}", e)))?;
        if !sell.success {
            return Err(ArbError::divergence(&route.dest_pool, "sell leg failed"));
        }

        let deviation = Self::deviation(route.expected_output_amount, sell.output_amount)
            .ok_or_else(|| ArbError::divergence(&route.dest_pool, "route expects no output"))?;

        if deviation > self.config.tolerance {
            return Err(ArbError::divergence(
                &route.dest_pool,
                format!(
                    "output {} vs expected {} ({:.4}% > {:.4}%)",
                    sell.output_amount,
                    route.expected_output_amount,
                    deviation * dec!(100),
                    self.config.tolerance * dec!(100)
                ),
            ));
        }

        Ok(ValidationReport {
            simulated_intermediate: buy.output_amount,
            simulated_output: sell.output_amount,
            deviation,
        })
    }

    pub async fn validate(&self, route: &ArbitrageRoute) -> bool {
        match self.check(route).await {
            Ok(report) => {
                debug!(
                    "Validated {} -> {}: simulated {} (deviation {:.4}%)",
                    route.source_pool,
                    route.dest_pool,
                    report.simulated_output,
                    report.deviation * dec!(100)
                );
                true
            }
            Err(e) => {
                warn!("Route rejected: {}", e);
                false
            }
        }
    }
}
