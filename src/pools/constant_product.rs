use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::pools::snapshot::PoolSnapshot;
use crate::pools::traits::PricingModel;

/// Blended constant-product quote.
///
/// The fill converts at the snapshot price and is then scaled by
/// `reserve_in / (reserve_in + effective_input)`, which is the exact
/// constant-product fill when the reserves are priced at `native_price`.
/// A single blended rate is applied per evaluation.
#[derive(Debug, Clone)]
pub struct ConstantProductCurve {
    /// Quote native units per base native unit
    pub native_price: Decimal,
    pub base_reserve: u64,
    pub quote_reserve: u64,
    pub fee_rate: Decimal,
}

impl ConstantProductCurve {
    pub fn from_snapshot(snapshot: &PoolSnapshot) -> Self {
        Self {
            // An unrepresentable price quotes nothing
            native_price: snapshot.native_price().unwrap_or(Decimal::ZERO),
            base_reserve: snapshot.active_liquidity.base_amount,
            quote_reserve: snapshot.active_liquidity.quote_amount,
            fee_rate: snapshot.fees.base_fee_rate,
        }
    }
}

impl PricingModel for ConstantProductCurve {
    fn quote(&self, input_amount: u64, is_buy: bool) -> Option<u64> {
        if self.native_price <= Decimal::ZERO {
            return None;
        }

        let effective = Decimal::from(input_amount).checked_mul(Decimal::ONE - self.fee_rate)?;
        let (reserve_in, reserve_out, nominal) = if is_buy {
            (
                self.quote_reserve,
                self.base_reserve,
                effective.checked_div(self.native_price)?,
            )
        } else {
            (
                self.base_reserve,
                self.quote_reserve,
                effective.checked_mul(self.native_price)?,
            )
        };

        if reserve_in == 0 {
            return None;
        }

        let reserve_in = Decimal::from(reserve_in);
        let depth = reserve_in.checked_div(reserve_in.checked_add(effective)?)?;
        let output = nominal.checked_mul(depth)?;

        // Cannot pay out more than the pool holds
        if output > Decimal::from(reserve_out) {
            return None;
        }

        output.floor().to_u64()
    }
}
