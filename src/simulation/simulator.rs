//! Execution Simulator
//!
//! Re-executes single legs against pool state with integer arithmetic so the
//! validator has a second opinion on the analytical quotes.

use std::collections::HashMap;

use async_trait::async_trait;
use eyre::Result;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::ArbError;
use crate::pools::{bin_price, leg_label, BinLayout, LiquidityModel, PoolSnapshot};

/// Fee rates are applied in parts per million
const FEE_DENOMINATOR: u128 = 1_000_000;

/// Fixed-point scale for bin prices
const PRICE_SCALE: u128 = 1_000_000_000_000;

/// Outcome of simulating one leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegSimulation {
    pub output_amount: u64,
    pub success: bool,
}

impl LegSimulation {
    pub fn filled(output_amount: u64) -> Self {
        Self { output_amount, success: true }
    }

    pub fn failed() -> Self {
        Self { output_amount: 0, success: false }
    }
}

/// Simulated execution of a single swap leg (RPC simulation in production).
#[async_trait]
pub trait ExecutionSimulator: Send + Sync {
    async fn simulate_leg(&self, pool: &str, input_amount: u64, is_buy: bool) -> Result<LegSimulation>;
}

/// `ExecutionSimulator` over an in-memory registry of pool states.
#[derive(Debug, Default)]
pub struct SnapshotSimulator {
    pools: HashMap<String, PoolSnapshot>,
}

impl SnapshotSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshots(snapshots: impl IntoIterator<Item = PoolSnapshot>) -> Self {
        let pools = snapshots
            .into_iter()
            .map(|s| (s.address.clone(), s))
            .collect();
        Self { pools }
    }
}

fn fee_ppm(rate: Decimal) -> Option<u128> {
    let ppm = (rate * Decimal::from(FEE_DENOMINATOR as u64)).round().to_u128()?;
    (ppm < FEE_DENOMINATOR).then_some(ppm)
}

fn after_fee(input_amount: u64, fee_ppm: u128) -> Option<u128> {
    (input_amount as u128)
        .checked_mul(FEE_DENOMINATOR - fee_ppm)
        .map(|v| v / FEE_DENOMINATOR)
}

/// `x * y = k` fill on the pool's reserves
fn constant_product_fill(snapshot: &PoolSnapshot, input_amount: u64, is_buy: bool) -> Option<u64> {
    let (reserve_in, reserve_out) = if is_buy {
        (snapshot.active_liquidity.quote_amount, snapshot.active_liquidity.base_amount)
    } else {
        (snapshot.active_liquidity.base_amount, snapshot.active_liquidity.quote_amount)
    };
    if reserve_in == 0 || reserve_out == 0 {
        return None;
    }

    let input = after_fee(input_amount, fee_ppm(snapshot.fees.total())?)?;
    let numerator = (reserve_out as u128).checked_mul(input)?;
    let denominator = (reserve_in as u128).checked_add(input)?;
    u64::try_from(numerator / denominator).ok()
}

/// Bin-by-bin fill with fixed-point prices. `None` if the bins run dry.
fn bin_fill(layout: &BinLayout, fee_rate: Decimal, input_amount: u64, is_buy: bool) -> Option<u64> {
    let mut remaining = after_fee(input_amount, fee_ppm(fee_rate)?)?;
    let mut output: u128 = 0;

    let scaled_price = |id: i32| -> Option<u128> {
        let price = bin_price(layout.bin_step, id)?;
        price
            .checked_mul(Decimal::from(PRICE_SCALE as u64))?
            .round()
            .to_u128()
            .filter(|p| *p > 0)
    };

    if is_buy {
        for bin in layout.asks() {
            let price = scaled_price(bin.id)?;
            let available = bin.base_amount as u128;
            let cost = available.checked_mul(price)? / PRICE_SCALE;
            if remaining >= cost {
                output += available;
                remaining -= cost;
            } else {
                output += remaining.checked_mul(PRICE_SCALE)? / price;
                remaining = 0;
                break;
            }
        }
    } else {
        for bin in layout.bids() {
            let price = scaled_price(bin.id)?;
            let available = bin.quote_amount as u128;
            let value = remaining.checked_mul(price)? / PRICE_SCALE;
            if value >= available {
                output += available;
                remaining -= available.checked_mul(PRICE_SCALE)? / price;
            } else {
                output += value;
                remaining = 0;
                break;
            }
        }
    }

    // Sub-unit rounding leftovers count as filled
    if remaining > 1 {
        return None;
    }
    u64::try_from(output).ok()
}

#[async_trait]
impl ExecutionSimulator for SnapshotSimulator {
    async fn simulate_leg(&self, pool: &str, input_amount: u64, is_buy: bool) -> Result<LegSimulation> {
        let Some(snapshot) = self.pools.get(pool) else {
            return Err(ArbError::DataUnavailable(format!("no simulation state for pool {}", pool)).into());
        };

        let output = match &snapshot.model {
            LiquidityModel::ConstantProduct => constant_product_fill(snapshot, input_amount, is_buy),
            LiquidityModel::Bins(layout) => bin_fill(layout, snapshot.fees.total(), input_amount, is_buy),
        };

        match output {
            Some(amount) if amount > 0 => {
                debug!("Simulated {} on {}: {} -> {}", leg_label(is_buy), pool, input_amount, amount);
                Ok(LegSimulation::filled(amount))
            }
            _ => {
                debug!("Simulated {} on {} failed for input {}", leg_label(is_buy), pool, input_amount);
                Ok(LegSimulation::failed())
            }
        }
    }
}
