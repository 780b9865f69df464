use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::network::NetworkConditions;

/// Execution-priority bucket derived from congestion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTier {
    #[default]
    Conservative,
    Normal,
    Aggressive,
}

impl std::fmt::Display for StrategyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyTier::Conservative => write!(f, "conservative"),
            StrategyTier::Normal => write!(f, "normal"),
            StrategyTier::Aggressive => write!(f, "aggressive"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteFees {
    pub trading_fees_usd: Decimal,
    pub network_fees_usd: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionParams {
    pub priority_fee: u64,
    pub strategy_tier: StrategyTier,
}

/// Two-leg round trip: buy base on `source_pool`, sell it on `dest_pool`.
///
/// Amounts are quote-token native units. The execution block is only
/// rewritten by `RouteBuilder`; everything else is fixed by the optimizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrageRoute {
    pub source_pool: String,
    pub dest_pool: String,
    pub input_amount: u64,
    /// Base received on the source leg
    pub intermediate_amount: u64,
    /// Quote received after the dest leg
    pub expected_output_amount: u64,
    pub expected_profit_usd: Decimal,
    pub fees: RouteFees,
    pub execution: ExecutionParams,
}

impl ArbitrageRoute {
    /// Execution block seeded from the current conditions, before finalization
    pub fn initial_execution(conditions: &NetworkConditions) -> ExecutionParams {
        ExecutionParams {
            priority_fee: conditions.recommended_priority_fee,
            strategy_tier: StrategyTier::Conservative,
        }
    }

    /// One-line summary for logging
    pub fn summary(&self) -> String {
        format!(
            "{} -> {} | in={} out={} | profit=${} | fees: trading=${} network=${} | priority={} ({})",
            self.source_pool,
            self.dest_pool,
            self.input_amount,
            self.expected_output_amount,
            self.expected_profit_usd.round_dp(4),
            self.fees.trading_fees_usd.round_dp(4),
            self.fees.network_fees_usd.round_dp(6),
            self.execution.priority_fee,
            self.execution.strategy_tier
        )
    }
}

/// Accepted route as emitted to the log sink, one JSON line each
#[derive(Debug, Clone, Serialize)]
pub struct RouteEvent {
    pub timestamp: String,
    pub cycle: u64,
    #[serde(flatten)]
    pub route: ArbitrageRoute,
}

impl RouteEvent {
    pub fn now(cycle: u64, route: ArbitrageRoute) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            cycle,
            route,
        }
    }

    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
