//! Fee Model
//!
//! Relative cost of a two-leg round trip:
//! - pool base fees on both legs
//! - volatility / host fees on both legs
//! - slippage tolerance
//! - network priority fee, normalized into the same relative unit as price spread

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::network::NetworkConditions;
use crate::pools::PoolSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeModel {
    /// Slippage tolerance added to every round trip
    pub max_slippage: Decimal,
    /// Fee units -> fraction of notional
    pub priority_fee_rate_scale: Decimal,
    /// USD value of one fee unit
    pub priority_fee_unit_usd: Decimal,
}

impl Default for FeeModel {
    fn default() -> Self {
        Self {
            max_slippage: dec!(0.005),
            priority_fee_rate_scale: dec!(0.000000001),
            priority_fee_unit_usd: dec!(0.00000015),
        }
    }
}

impl FeeModel {
    pub fn new(
        max_slippage: Decimal,
        priority_fee_rate_scale: Decimal,
        priority_fee_unit_usd: Decimal,
    ) -> Self {
        Self {
            max_slippage,
            priority_fee_rate_scale,
            priority_fee_unit_usd,
        }
    }

    /// `|price(dest) - price(source)| / price(source)`
    pub fn relative_spread(source: &PoolSnapshot, dest: &PoolSnapshot) -> Decimal {
        if source.price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (dest.price - source.price)
            .abs()
            .checked_div(source.price)
            .unwrap_or(Decimal::MAX)
    }

    /// Pool fees charged on both legs
    pub fn trading_fee_rate(source: &PoolSnapshot, dest: &PoolSnapshot) -> Decimal {
        source.fees.total() + dest.fees.total()
    }

    pub fn network_fee_rate(&self, conditions: &NetworkConditions) -> Decimal {
        Decimal::from(conditions.recommended_priority_fee) * self.priority_fee_rate_scale
    }

    pub fn total_relative_cost(
        &self,
        source: &PoolSnapshot,
        dest: &PoolSnapshot,
        conditions: &NetworkConditions,
    ) -> Decimal {
        Self::trading_fee_rate(source, dest) + self.max_slippage + self.network_fee_rate(conditions)
    }

    /// Early filter: a pair whose spread is below the round-trip cost cannot
    /// be profitable at any size.
    pub fn spread_covers_cost(
        &self,
        source: &PoolSnapshot,
        dest: &PoolSnapshot,
        conditions: &NetworkConditions,
    ) -> bool {
        Self::relative_spread(source, dest) >= self.total_relative_cost(source, dest, conditions)
    }

    /// Absolute USD cost of paying `priority_fee` fee units
    pub fn priority_fee_usd(&self, priority_fee: u64) -> Decimal {
        Decimal::from(priority_fee) * self.priority_fee_unit_usd
    }
}
