/// Pricing capability of a single pool.
///
/// `is_buy == true` buys the base token with `input_amount` quote units,
/// `is_buy == false` sells `input_amount` base units for quote. Amounts are
/// native token units. `None` means the pool cannot fill the order
/// (liquidity exhausted or a degenerate state such as a zero price).
pub trait PricingModel {
    fn quote(&self, input_amount: u64, is_buy: bool) -> Option<u64>;
}

/// Direction of a single leg, used for logging.
pub fn leg_label(is_buy: bool) -> &'static str {
    if is_buy {
        "buy base"
    } else {
        "sell base"
    }
}
