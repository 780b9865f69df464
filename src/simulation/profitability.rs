//! Profitability Gate
//!
//! Final accept/reject of a validated route:
//! - expected profit is discounted by a safety margin
//! - the discounted profit must beat every cost of the route
//! - and clear the absolute minimum profit floor

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::network::NetworkConditions;
use crate::route::ArbitrageRoute;

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Fraction of expected profit trusted at decision time
    pub safety_margin: Decimal,
    pub min_profit_threshold_usd: Decimal,
    /// USD value of one priority fee unit
    pub priority_fee_unit_usd: Decimal,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            safety_margin: dec!(0.8),
            min_profit_threshold_usd: dec!(10),
            priority_fee_unit_usd: dec!(0.00000015),
        }
    }
}

/// Breakdown behind a gate decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub margin_adjusted_profit_usd: Decimal,
    pub priority_fee_usd: Decimal,
    pub total_cost_usd: Decimal,
    pub covers_cost: bool,
    pub above_threshold: bool,
}

impl GateDecision {
    pub fn is_profitable(&self) -> bool {
        self.covers_cost && self.above_threshold
    }

    pub fn summary(&self) -> String {
        format!(
            "adjusted=${} cost=${} (priority ${}) | covers_cost={} above_threshold={}",
            self.margin_adjusted_profit_usd.round_dp(4),
            self.total_cost_usd.round_dp(4),
            self.priority_fee_usd.round_dp(6),
            self.covers_cost,
            self.above_threshold
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfitabilityGate {
    config: GateConfig,
}

impl ProfitabilityGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn evaluate(&self, route: &ArbitrageRoute, conditions: &NetworkConditions) -> GateDecision {
        let margin_adjusted_profit_usd = route.expected_profit_usd * self.config.safety_margin;
        let priority_fee_usd =
            Decimal::from(conditions.recommended_priority_fee) * self.config.priority_fee_unit_usd;
        let total_cost_usd =
            route.fees.trading_fees_usd + route.fees.network_fees_usd + priority_fee_usd;

        GateDecision {
            margin_adjusted_profit_usd,
            priority_fee_usd,
            total_cost_usd,
            // Both comparisons are strict: a tie rejects
            covers_cost: margin_adjusted_profit_usd > total_cost_usd,
            above_threshold: margin_adjusted_profit_usd > self.config.min_profit_threshold_usd,
        }
    }

    pub fn is_profitable(&self, route: &ArbitrageRoute, conditions: &NetworkConditions) -> bool {
        let decision = self.evaluate(route, conditions);
        debug!("Gate {} -> {}: {}", route.source_pool, route.dest_pool, decision.summary());
        decision.is_profitable()
    }
}
