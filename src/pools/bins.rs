use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pools::snapshot::{ActiveLiquidity, PairDecimals};
use crate::pools::traits::PricingModel;

/// Leftover input below one native unit is treated as fully filled.
const DUST: Decimal = Decimal::ONE;

/// A single liquidity bin with its own reserve pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bin {
    pub id: i32,
    pub base_amount: u64,
    pub quote_amount: u64,
}

/// Bins around the active id of a concentrated-liquidity pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinLayout {
    /// Price increment between adjacent bins, in basis points
    pub bin_step: u16,
    pub active_id: i32,
    pub bins: Vec<Bin>,
}

/// Native price (quote units per base unit) of a bin.
/// Formula: price = (1 + binStep/10_000)^binId
pub fn bin_price(bin_step: u16, bin_id: i32) -> Option<Decimal> {
    let base = Decimal::ONE + Decimal::from(bin_step) / Decimal::from(10_000u32);
    pow_decimal(base, bin_id as i64)
}

/// Exponentiation by squaring; negative exponents invert the result.
fn pow_decimal(base: Decimal, exp: i64) -> Option<Decimal> {
    let mut result = Decimal::ONE;
    let mut factor = base;
    let mut remaining = exp.unsigned_abs();

    while remaining > 0 {
        if remaining & 1 == 1 {
            result = result.checked_mul(factor)?;
        }
        remaining >>= 1;
        if remaining > 0 {
            factor = factor.checked_mul(factor)?;
        }
    }

    if exp < 0 {
        Decimal::ONE.checked_div(result)
    } else {
        Some(result)
    }
}

impl BinLayout {
    /// Bins that can sell base to a buyer, nearest first.
    pub fn asks(&self) -> impl Iterator<Item = &Bin> {
        let mut asks: Vec<&Bin> = self
            .bins
            .iter()
            .filter(|b| b.id >= self.active_id && b.base_amount > 0)
            .collect();
        asks.sort_by_key(|b| b.id);
        asks.into_iter()
    }

    /// Bins that can pay quote to a seller, nearest first.
    pub fn bids(&self) -> impl Iterator<Item = &Bin> {
        let mut bids: Vec<&Bin> = self
            .bins
            .iter()
            .filter(|b| b.id <= self.active_id && b.quote_amount > 0)
            .collect();
        bids.sort_by_key(|b| std::cmp::Reverse(b.id));
        bids.into_iter()
    }

    pub fn active_liquidity(&self) -> ActiveLiquidity {
        self.bins.iter().fold(ActiveLiquidity::default(), |acc, bin| ActiveLiquidity {
            base_amount: acc.base_amount.saturating_add(bin.base_amount),
            quote_amount: acc.quote_amount.saturating_add(bin.quote_amount),
        })
    }

    /// Quote-liquidity weighted price in human units (quote per whole base).
    /// Zero when no bin holds quote; `None` if the arithmetic overflows.
    pub fn weighted_price(&self, decimals: PairDecimals) -> Option<Decimal> {
        let quote_unit = decimals.quote_unit()?;
        let mut weighted_sum = Decimal::ZERO;
        let mut total_weight = Decimal::ZERO;

        for bin in &self.bins {
            let Some(native) = bin_price(self.bin_step, bin.id) else {
                continue;
            };
            let weight = Decimal::from(bin.quote_amount).checked_div(quote_unit)?;
            let weighted = decimals.to_human_price(native)?.checked_mul(weight)?;
            weighted_sum = weighted_sum.checked_add(weighted)?;
            total_weight = total_weight.checked_add(weight)?;
        }

        if total_weight.is_zero() {
            Some(Decimal::ZERO)
        } else {
            weighted_sum.checked_div(total_weight)
        }
    }
}

/// Analytical quote that walks bins outward from the active id.
#[derive(Debug, Clone)]
pub struct BinCurve<'a> {
    layout: &'a BinLayout,
    fee_rate: Decimal,
}

impl<'a> BinCurve<'a> {
    pub fn new(layout: &'a BinLayout, fee_rate: Decimal) -> Self {
        Self { layout, fee_rate }
    }
}

impl PricingModel for BinCurve<'_> {
    fn quote(&self, input_amount: u64, is_buy: bool) -> Option<u64> {
        let mut remaining = Decimal::from(input_amount).checked_mul(Decimal::ONE - self.fee_rate)?;
        let mut output = Decimal::ZERO;

        if is_buy {
            for bin in self.layout.asks() {
                let price = bin_price(self.layout.bin_step, bin.id)?;
                if price.is_zero() {
                    continue;
                }
                let available = Decimal::from(bin.base_amount);
                let cost = available.checked_mul(price)?;
                if remaining >= cost {
                    output += available;
                    remaining -= cost;
                } else {
                    output += remaining.checked_div(price)?;
                    remaining = Decimal::ZERO;
                    break;
                }
            }
        } else {
            for bin in self.layout.bids() {
                let price = bin_price(self.layout.bin_step, bin.id)?;
                if price.is_zero() {
                    continue;
                }
                let available = Decimal::from(bin.quote_amount);
                let value = remaining.checked_mul(price)?;
                if value >= available {
                    output += available;
                    remaining -= available.checked_div(price)?;
                } else {
                    output += value;
                    remaining = Decimal::ZERO;
                    break;
                }
            }
        }

        if remaining >= DUST {
            return None;
        }

        output.floor().to_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn layout() -> BinLayout {
        // 1% bins around id 0 (native price 1.0)
        BinLayout {
            bin_step: 100,
            active_id: 0,
            bins: vec![
                Bin { id: -1, base_amount: 0, quote_amount: 1_000 },
                Bin { id: 0, base_amount: 500, quote_amount: 500 },
                Bin { id: 1, base_amount: 1_000, quote_amount: 0 },
            ],
        }
    }

    #[test]
    fn test_bin_price() {
        assert_eq!(bin_price(100, 0), Some(Decimal::ONE));
        assert_eq!(bin_price(100, 1), Some(dec!(1.01)));
        assert_eq!(bin_price(100, 2), Some(dec!(1.0201)));

        let below = bin_price(100, -1).unwrap();
        assert!((below * dec!(1.01) - Decimal::ONE).abs() < dec!(0.0000000001));
    }

    #[test]
    fn test_buy_within_active_bin() {
        let l = layout();
        let curve = BinCurve::new(&l, Decimal::ZERO);
        assert_eq!(curve.quote(200, true), Some(200));
    }

    #[test]
    fn test_buy_crosses_into_next_bin() {
        let l = layout();
        let curve = BinCurve::new(&l, Decimal::ZERO);
        // 500 quote empties bin 0, remaining 505 buys 500 base at 1.01
        assert_eq!(curve.quote(1_005, true), Some(1_000));
    }

    #[test]
    fn test_sell_walks_down() {
        let l = layout();
        let curve = BinCurve::new(&l, Decimal::ZERO);
        // 500 base drains bin 0's quote, rest goes to bin -1 at ~0.990099
        let out = curve.quote(600, false).unwrap();
        assert_eq!(out, 599);
    }

    #[test]
    fn test_exhausted_liquidity() {
        let l = layout();
        let curve = BinCurve::new(&l, Decimal::ZERO);
        assert_eq!(curve.quote(10_000, true), None);
        assert_eq!(curve.quote(10_000, false), None);
    }

    #[test]
    fn test_active_liquidity_and_weighted_price() {
        let l = layout();
        let liquidity = l.active_liquidity();
        assert_eq!(liquidity.base_amount, 1_500);
        assert_eq!(liquidity.quote_amount, 1_500);

        let decimals = PairDecimals { base: 0, quote: 0 };
        let price = l.weighted_price(decimals).unwrap();
        // (0.990099 * 1000 + 1.0 * 500) / 1500
        assert!(price > dec!(0.993) && price < dec!(0.994));

        let empty = BinLayout { bin_step: 10, active_id: 0, bins: vec![] };
        assert_eq!(empty.weighted_price(decimals), Some(Decimal::ZERO));

        // Decimals beyond what a Decimal can scale by
        assert_eq!(l.weighted_price(PairDecimals { base: 0, quote: 40 }), None);
    }
}
