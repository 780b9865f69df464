use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::network::NetworkConditions;
use crate::route::{ArbitrageRoute, StrategyTier};

/// Congestion above which routes bid aggressively
pub const AGGRESSIVE_CONGESTION: Decimal = dec!(0.8);

/// Congestion above which routes use the normal tier
pub const NORMAL_CONGESTION: Decimal = dec!(0.5);

/// Finalizes execution parameters for the current congestion.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteBuilder;

impl RouteBuilder {
    pub fn tier_for(congestion: Decimal) -> StrategyTier {
        if congestion > AGGRESSIVE_CONGESTION {
            StrategyTier::Aggressive
        } else if congestion > NORMAL_CONGESTION {
            StrategyTier::Normal
        } else {
            StrategyTier::Conservative
        }
    }

    /// `recommended_priority_fee * (1 + congestion)`, floored
    pub fn adjusted_priority_fee(conditions: &NetworkConditions) -> u64 {
        (Decimal::from(conditions.recommended_priority_fee) * (Decimal::ONE + conditions.congestion()))
            .floor()
            .to_u64()
            .unwrap_or(u64::MAX)
    }

    /// Rewrites only the execution block; profitability is not re-evaluated.
    pub fn adjust_for_network_conditions(
        mut route: ArbitrageRoute,
        conditions: &NetworkConditions,
    ) -> ArbitrageRoute {
        route.execution.priority_fee = Self::adjusted_priority_fee(conditions);
        route.execution.strategy_tier = Self::tier_for(conditions.congestion());
        route
    }
}
