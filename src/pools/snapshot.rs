use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ArbError;
use crate::pools::bins::{BinCurve, BinLayout};
use crate::pools::constant_product::ConstantProductCurve;
use crate::pools::traits::PricingModel;

/// Token decimals of the pool's base/quote pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairDecimals {
    pub base: u8,
    pub quote: u8,
}

impl Default for PairDecimals {
    fn default() -> Self {
        // SOL / USDC
        Self { base: 9, quote: 6 }
    }
}

/// Largest power of ten a `Decimal` can hold exactly
pub const MAX_DECIMALS: u8 = 28;

fn pow10(exp: u8) -> Option<Decimal> {
    if exp > MAX_DECIMALS {
        return None;
    }
    (0..exp).try_fold(Decimal::ONE, |acc, _| acc.checked_mul(Decimal::TEN))
}

impl PairDecimals {
    pub fn base_unit(&self) -> Option<Decimal> {
        pow10(self.base)
    }

    pub fn quote_unit(&self) -> Option<Decimal> {
        pow10(self.quote)
    }

    /// Human price (quote per whole base) -> native units
    pub fn to_native_price(&self, price: Decimal) -> Option<Decimal> {
        price.checked_mul(self.quote_unit()?)?.checked_div(self.base_unit()?)
    }

    /// Native price -> human price (quote per whole base)
    pub fn to_human_price(&self, native_price: Decimal) -> Option<Decimal> {
        native_price.checked_mul(self.base_unit()?)?.checked_div(self.quote_unit()?)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveLiquidity {
    pub base_amount: u64,
    pub quote_amount: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolFees {
    pub base_fee_rate: Decimal,
    /// Dynamic volatility fee or host fee, depending on the venue
    #[serde(default)]
    pub volatility_fee_rate: Decimal,
}

impl PoolFees {
    pub fn total(&self) -> Decimal {
        self.base_fee_rate + self.volatility_fee_rate
    }
}

/// How a pool prices an order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LiquidityModel {
    #[default]
    ConstantProduct,
    Bins(BinLayout),
}

/// Immutable view of a pool for one analysis cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub address: String,
    /// Quote per whole base token (e.g. USDC per SOL)
    pub price: Decimal,
    pub active_liquidity: ActiveLiquidity,
    pub fees: PoolFees,
    pub tvl_usd: Decimal,
    #[serde(default)]
    pub decimals: PairDecimals,
    #[serde(default)]
    pub model: LiquidityModel,
}

impl PoolSnapshot {
    /// Build a snapshot from the bins around the active id.
    ///
    /// Price is the quote-weighted mean of bin prices and TVL values the
    /// summed reserves at that price. A layout with no quote liquidity yields
    /// a zero price, which `validate` rejects.
    pub fn from_bins(
        address: impl Into<String>,
        layout: BinLayout,
        fees: PoolFees,
        decimals: PairDecimals,
    ) -> Self {
        let active_liquidity = layout.active_liquidity();
        let price = layout.weighted_price(decimals).unwrap_or(Decimal::ZERO);
        let tvl_usd = Self::reserve_value(active_liquidity, price, decimals).unwrap_or(Decimal::ZERO);

        Self {
            address: address.into(),
            price,
            active_liquidity,
            fees,
            tvl_usd,
            decimals,
            model: LiquidityModel::Bins(layout),
        }
    }

    fn reserve_value(
        liquidity: ActiveLiquidity,
        price: Decimal,
        decimals: PairDecimals,
    ) -> Option<Decimal> {
        let base_value = Decimal::from(liquidity.base_amount)
            .checked_div(decimals.base_unit()?)?
            .checked_mul(price)?;
        let quote_value = Decimal::from(liquidity.quote_amount).checked_div(decimals.quote_unit()?)?;
        base_value.checked_add(quote_value)
    }

    pub fn validate(&self) -> Result<(), ArbError> {
        if self.address.is_empty() {
            return Err(ArbError::invalid_snapshot("<unknown>", "empty address"));
        }
        if self.price <= Decimal::ZERO {
            return Err(ArbError::invalid_snapshot(
                &self.address,
                format!("price must be positive, got {}", self.price),
            ));
        }
        if self.decimals.base > MAX_DECIMALS || self.decimals.quote > MAX_DECIMALS {
            return Err(ArbError::invalid_snapshot(
                &self.address,
                format!(
                    "token decimals {}/{} exceed {}",
                    self.decimals.base, self.decimals.quote, MAX_DECIMALS
                ),
            ));
        }
        if self.native_price().is_none() {
            return Err(ArbError::invalid_snapshot(
                &self.address,
                format!("price {} not representable in native units", self.price),
            ));
        }
        for (name, rate) in [
            ("base fee", self.fees.base_fee_rate),
            ("volatility fee", self.fees.volatility_fee_rate),
        ] {
            if rate < Decimal::ZERO || rate >= Decimal::ONE {
                return Err(ArbError::invalid_snapshot(
                    &self.address,
                    format!("{} rate {} outside [0, 1)", name, rate),
                ));
            }
        }
        if let LiquidityModel::Bins(layout) = &self.model {
            if layout.bin_step == 0 {
                return Err(ArbError::invalid_snapshot(&self.address, "bin step is zero"));
            }
            if layout.bins.is_empty() {
                return Err(ArbError::invalid_snapshot(&self.address, "no active bins"));
            }
        }
        Ok(())
    }

    /// Quote native units per base native unit; `None` on overflow
    pub fn native_price(&self) -> Option<Decimal> {
        self.decimals.to_native_price(self.price)
    }

    /// Value of `base_amount` base units in quote native units at the snapshot price
    pub fn base_value_in_quote(&self, base_amount: u64) -> Option<Decimal> {
        Decimal::from(base_amount).checked_mul(self.native_price()?)
    }

    /// Base fee plus the bin step's price granularity
    pub fn effective_spread(&self) -> Decimal {
        match &self.model {
            LiquidityModel::Bins(layout) => {
                self.fees.base_fee_rate + Decimal::from(layout.bin_step) / Decimal::from(10_000u32)
            }
            LiquidityModel::ConstantProduct => self.fees.base_fee_rate,
        }
    }
}

impl PricingModel for PoolSnapshot {
    fn quote(&self, input_amount: u64, is_buy: bool) -> Option<u64> {
        match &self.model {
            LiquidityModel::ConstantProduct => {
                ConstantProductCurve::from_snapshot(self).quote(input_amount, is_buy)
            }
            LiquidityModel::Bins(layout) => {
                BinCurve::new(layout, self.fees.base_fee_rate).quote(input_amount, is_buy)
            }
        }
    }
}
