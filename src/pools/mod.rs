pub mod bins;
pub mod constant_product;
pub mod snapshot;
pub mod traits;

pub use bins::{bin_price, Bin, BinCurve, BinLayout};
pub use constant_product::ConstantProductCurve;
pub use snapshot::{ActiveLiquidity, LiquidityModel, PairDecimals, PoolFees, PoolSnapshot};
pub use traits::{leg_label, PricingModel};
