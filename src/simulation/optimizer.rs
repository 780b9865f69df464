//! Trade Size Optimizer
//!
//! Searches the input size that maximizes net profit for a pool pair under
//! the analytical quotes and the fee model. Two strategies:
//! - `Binary`: bisect towards the largest profitable size
//! - `GridRefine`: coarse grid over the whole range, then ternary refinement
//!   inside the best grid cell

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

use super::fee_model::FeeModel;
use super::route_builder::RouteBuilder;
use crate::error::ArbError;
use crate::network::NetworkConditions;
use crate::pools::{PairDecimals, PoolSnapshot, PricingModel};
use crate::route::{ArbitrageRoute, RouteFees};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchStrategy {
    Binary,
    #[default]
    GridRefine,
}

impl FromStr for SearchStrategy {
    type Err = ArbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" => Ok(SearchStrategy::Binary),
            "grid" | "grid_refine" => Ok(SearchStrategy::GridRefine),
            other => Err(ArbError::config(
                "SEARCH_STRATEGY",
                format!("unknown strategy {:?}, expected binary or grid", other),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Smallest input considered, quote native units
    pub min_trade_size: u64,
    /// Search stops once the bracket is narrower than this, quote native units
    pub convergence_epsilon: u64,
    /// Hard cap on evaluations per pair
    pub max_iterations: u32,
    pub grid_points: usize,
    pub strategy: SearchStrategy,
    /// USD value of one whole quote token
    pub quote_price_usd: Decimal,
    /// Best route below this profit is dropped before finalization
    pub min_profit_threshold_usd: Decimal,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            min_trade_size: 10_000_000,      // 10 USDC
            convergence_epsilon: 1_000_000, // 1 USDC
            max_iterations: 64,
            grid_points: 16,
            strategy: SearchStrategy::GridRefine,
            quote_price_usd: Decimal::ONE,
            min_profit_threshold_usd: dec!(10),
        }
    }
}

/// Result of evaluating one input size against both legs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeEvaluation {
    pub input_amount: u64,
    pub buy_output: u64,
    pub sell_output: u64,
    pub gross_profit_usd: Decimal,
    pub trading_fees_usd: Decimal,
    pub network_fees_usd: Decimal,
    pub net_profit_usd: Decimal,
}

pub struct TradeSizeOptimizer {
    config: OptimizerConfig,
    fee_model: FeeModel,
}

impl TradeSizeOptimizer {
    pub fn new(config: OptimizerConfig, fee_model: FeeModel) -> Self {
        Self { config, fee_model }
    }

    fn quote_to_usd(&self, amount: Decimal, decimals: PairDecimals) -> Option<Decimal> {
        amount
            .checked_div(decimals.quote_unit()?)?
            .checked_mul(self.config.quote_price_usd)
    }

    /// `[min_size, max_size]` in quote native units, or `None` if empty.
    ///
    /// The source leg is limited by its base reserve valued at the source
    /// price, the dest leg by its quote reserve. A reserve value that does
    /// not fit a `Decimal` also yields `None`.
    pub fn size_bounds(&self, source: &PoolSnapshot, dest: &PoolSnapshot) -> Option<(u64, u64)> {
        let Some(source_value) = source.base_value_in_quote(source.active_liquidity.base_amount) else {
            debug!("Skipping {}: reserve value overflows", source.address);
            return None;
        };
        let source_capacity = source_value.floor().to_u64().unwrap_or(u64::MAX);
        let max_size = source_capacity.min(dest.active_liquidity.quote_amount);
        let min_size = self.config.min_trade_size.max(1);

        if max_size < min_size {
            None
        } else {
            Some((min_size, max_size))
        }
    }

    /// Evaluate the round trip at `amount`; `None` if either leg cannot fill.
    pub fn simulate_trade(
        &self,
        source: &PoolSnapshot,
        dest: &PoolSnapshot,
        conditions: &NetworkConditions,
        amount: u64,
    ) -> Option<TradeEvaluation> {
        let buy_output = source.quote(amount, true)?;
        if buy_output == 0 {
            return None;
        }
        let sell_output = dest.quote(buy_output, false)?;

        let gross = Decimal::from(sell_output) - Decimal::from(amount);
        let gross_profit_usd = self.quote_to_usd(gross, source.decimals)?;
        let notional_usd = self.quote_to_usd(Decimal::from(amount), source.decimals)?;

        let trading_rate = FeeModel::trading_fee_rate(source, dest) + self.fee_model.max_slippage;
        let trading_fees_usd = trading_rate.checked_mul(notional_usd)?;
        let network_fees_usd = self.fee_model.network_fee_rate(conditions).checked_mul(notional_usd)?;

        Some(TradeEvaluation {
            input_amount: amount,
            buy_output,
            sell_output,
            gross_profit_usd,
            trading_fees_usd,
            network_fees_usd,
            net_profit_usd: gross_profit_usd - trading_fees_usd - network_fees_usd,
        })
    }

    /// Best profitable trade for the pair, or `None` if no evaluated size
    /// yields positive net profit.
    pub fn find_optimal_trade(
        &self,
        source: &PoolSnapshot,
        dest: &PoolSnapshot,
        conditions: &NetworkConditions,
    ) -> Option<ArbitrageRoute> {
        let (min_size, max_size) = self.size_bounds(source, dest)?;

        let mut evaluations = 0u32;
        let best = self.search(min_size, max_size, |size| {
            evaluations += 1;
            self.simulate_trade(source, dest, conditions, size)
        });

        debug!(
            "{:?} search {} -> {}: {} evaluations, best size {:?}",
            self.config.strategy,
            source.address,
            dest.address,
            evaluations,
            best.as_ref().map(|b| b.input_amount)
        );

        let Some(best) = best.filter(|e| e.net_profit_usd > Decimal::ZERO) else {
            debug!(
                "{} -> {}: {}",
                source.address,
                dest.address,
                ArbError::OptimizationExhausted { min_size, max_size }
            );
            return None;
        };

        Some(ArbitrageRoute {
            source_pool: source.address.clone(),
            dest_pool: dest.address.clone(),
            input_amount: best.input_amount,
            intermediate_amount: best.buy_output,
            expected_output_amount: best.sell_output,
            expected_profit_usd: best.net_profit_usd,
            fees: RouteFees {
                trading_fees_usd: best.trading_fees_usd,
                network_fees_usd: best.network_fees_usd,
            },
            execution: ArbitrageRoute::initial_execution(conditions),
        })
    }

    /// Run the configured strategy over `[min_size, max_size]`. `evaluate` is
    /// called at most `max_iterations` times.
    fn search<F>(&self, min_size: u64, max_size: u64, mut evaluate: F) -> Option<TradeEvaluation>
    where
        F: FnMut(u64) -> Option<TradeEvaluation>,
    {
        match self.config.strategy {
            SearchStrategy::Binary => self.binary_search(min_size, max_size, &mut evaluate),
            SearchStrategy::GridRefine => self.grid_refine(min_size, max_size, &mut evaluate),
        }
    }

    /// Records each profitable midpoint and probes larger sizes past it.
    fn binary_search<F>(&self, min_size: u64, max_size: u64, evaluate: &mut F) -> Option<TradeEvaluation>
    where
        F: FnMut(u64) -> Option<TradeEvaluation>,
    {
        let epsilon = self.config.convergence_epsilon.max(1);
        let (mut left, mut right) = (min_size, max_size);
        let mut best: Option<TradeEvaluation> = None;
        let mut iterations = 0u32;

        // A degenerate range still gets one evaluation
        while iterations < self.config.max_iterations
            && (iterations == 0 || (left < right && right - left >= epsilon))
        {
            iterations += 1;
            let mid = left + (right - left) / 2;

            match evaluate(mid) {
                Some(eval) if eval.net_profit_usd > Decimal::ZERO => {
                    best = Some(eval);
                    left = mid.saturating_add(epsilon);
                }
                _ => right = mid,
            }
        }
        best
    }

    /// Grid scan plus ternary refinement. Profit under both curve families is
    /// concave in size, so the refinement bracket holds the optimum once the
    /// grid has located its cell. The grid shrinks to fit the iteration budget.
    fn grid_refine<F>(&self, min_size: u64, max_size: u64, evaluate: &mut F) -> Option<TradeEvaluation>
    where
        F: FnMut(u64) -> Option<TradeEvaluation>,
    {
        let epsilon = self.config.convergence_epsilon.max(1);
        let mut budget = self.config.max_iterations as usize;
        let points = self.config.grid_points.max(2).min(budget);
        let span = (max_size - min_size) as u128;

        let mut grid: Vec<u64> = match points {
            0 => return None,
            1 => vec![min_size + (span / 2) as u64],
            _ => (0..points)
                .map(|i| min_size + (span * i as u128 / (points - 1) as u128) as u64)
                .collect(),
        };
        grid.dedup();

        let mut best: Option<TradeEvaluation> = None;
        let mut best_index = None;

        for (i, &size) in grid.iter().enumerate() {
            budget -= 1;
            if let Some(eval) = evaluate(size) {
                if is_better(&eval, best.as_ref()) {
                    best = Some(eval);
                    best_index = Some(i);
                }
            }
        }

        let index = best_index?;
        let mut lo = grid[index.saturating_sub(1)];
        let mut hi = grid[(index + 1).min(grid.len() - 1)];

        while hi - lo > epsilon && budget >= 2 {
            let third = (hi - lo) / 3;
            if third == 0 {
                break;
            }
            let m1 = lo + third;
            let m2 = hi - third;
            budget -= 2;

            let p1 = evaluate(m1);
            let p2 = evaluate(m2);
            let v1 = p1.as_ref().map_or(Decimal::MIN, |e| e.net_profit_usd);
            let v2 = p2.as_ref().map_or(Decimal::MIN, |e| e.net_profit_usd);

            for eval in [p1, p2].into_iter().flatten() {
                if is_better(&eval, best.as_ref()) {
                    best = Some(eval);
                }
            }

            if v1 < v2 {
                lo = m1;
            } else {
                hi = m2;
            }
        }
        best
    }

    /// Evaluate every cheaper -> dearer pair and return the most profitable
    /// route, finalized for current network conditions.
    pub fn find_optimal_route(
        &self,
        snapshots: &[PoolSnapshot],
        conditions: &NetworkConditions,
    ) -> Option<ArbitrageRoute> {
        let mut pools: Vec<&PoolSnapshot> = snapshots
            .iter()
            .filter(|s| match s.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Excluding pool: {}", e);
                    false
                }
            })
            .collect();
        pools.sort_by(|a, b| a.price.cmp(&b.price));

        let mut best: Option<ArbitrageRoute> = None;

        for (i, source) in pools.iter().enumerate() {
            for dest in pools.iter().skip(i + 1) {
                if source.decimals != dest.decimals {
                    debug!(
                        "Skipping {} -> {}: token decimals differ",
                        source.address, dest.address
                    );
                    continue;
                }

                if !self.fee_model.spread_covers_cost(source, dest, conditions) {
                    debug!(
                        "Skipping {} -> {}: spread {} below cost {}",
                        source.address,
                        dest.address,
                        FeeModel::relative_spread(source, dest).round_dp(6),
                        self.fee_model
                            .total_relative_cost(source, dest, conditions)
                            .round_dp(6)
                    );
                    continue;
                }

                if let Some(route) = self.find_optimal_trade(source, dest, conditions) {
                    let improves = best
                        .as_ref()
                        .map_or(true, |b| route.expected_profit_usd > b.expected_profit_usd);
                    if improves {
                        best = Some(route);
                    }
                }
            }
        }

        let best = best?;
        if best.expected_profit_usd < self.config.min_profit_threshold_usd {
            debug!(
                "Best route {} -> {} profit ${} below threshold ${}",
                best.source_pool,
                best.dest_pool,
                best.expected_profit_usd.round_dp(4),
                self.config.min_profit_threshold_usd
            );
            return None;
        }

        Some(RouteBuilder::adjust_for_network_conditions(best, conditions))
    }
}

fn is_better(candidate: &TradeEvaluation, best: Option<&TradeEvaluation>) -> bool {
    best.map_or(true, |b| candidate.net_profit_usd > b.net_profit_usd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pools::{ActiveLiquidity, LiquidityModel, PoolFees};
    use crate::route::StrategyTier;

    /// Reserves priced consistently with `price` (SOL/USDC decimals).
    fn pool(address: &str, price: Decimal, fee: Decimal, base_sol: u64) -> PoolSnapshot {
        let base_amount = base_sol * 1_000_000_000;
        let quote_amount = (Decimal::from(base_sol) * price * dec!(1000000)).to_u64().unwrap();
        PoolSnapshot {
            address: address.to_string(),
            price,
            active_liquidity: ActiveLiquidity { base_amount, quote_amount },
            fees: PoolFees { base_fee_rate: fee, volatility_fee_rate: Decimal::ZERO },
            tvl_usd: dec!(1000000),
            decimals: PairDecimals::default(),
            model: LiquidityModel::ConstantProduct,
        }
    }

    fn conditions() -> NetworkConditions {
        NetworkConditions::new(dec!(0.2), 100_000)
    }

    fn optimizer(strategy: SearchStrategy) -> TradeSizeOptimizer {
        TradeSizeOptimizer::new(
            OptimizerConfig { strategy, ..OptimizerConfig::default() },
            FeeModel::default(),
        )
    }

    #[test]
    fn test_search_strategy_parsing() {
        assert_eq!("binary".parse::<SearchStrategy>().unwrap(), SearchStrategy::Binary);
        assert_eq!("GRID".parse::<SearchStrategy>().unwrap(), SearchStrategy::GridRefine);
        assert!("simplex".parse::<SearchStrategy>().is_err());
    }

    #[test]
    fn test_size_bounds() {
        let opt = optimizer(SearchStrategy::GridRefine);
        let source = pool("a", dec!(100), dec!(0.0001), 1_000);
        let dest = pool("b", dec!(110), dec!(0.0001), 500);

        // source: 1000 SOL * 100 = 100k USDC; dest: 500 SOL * 110 = 55k USDC
        assert_eq!(opt.size_bounds(&source, &dest), Some((10_000_000, 55_000_000_000)));

        let tiny = pool("tiny", dec!(110), dec!(0.0001), 0);
        assert_eq!(opt.size_bounds(&source, &tiny), None);
    }

    #[test]
    fn test_net_profit_subtracts_total_relative_cost() {
        let opt = optimizer(SearchStrategy::GridRefine);
        let source = pool("a", dec!(100), dec!(0.0001), 1_000_000);
        let dest = pool("b", dec!(110), dec!(0.0001), 1_000_000);
        let c = conditions();

        let eval = opt.simulate_trade(&source, &dest, &c, 1_000_000_000).unwrap();
        let notional_usd = dec!(1000);
        let cost = opt.fee_model.total_relative_cost(&source, &dest, &c);

        assert_eq!(eval.net_profit_usd, eval.gross_profit_usd - cost * notional_usd);
        assert_eq!(eval.trading_fees_usd + eval.network_fees_usd, cost * notional_usd);
        assert!(eval.gross_profit_usd > dec!(99) && eval.gross_profit_usd < dec!(100));
    }

    #[test]
    fn test_scenario_b_returns_profitable_route_in_bounds() {
        let source = pool("a", dec!(100), dec!(0.0001), 1_000_000);
        let dest = pool("b", dec!(110), dec!(0.0001), 1_000_000);
        let c = conditions();

        for strategy in [SearchStrategy::Binary, SearchStrategy::GridRefine] {
            let opt = optimizer(strategy);
            let (min_size, max_size) = opt.size_bounds(&source, &dest).unwrap();
            let route = opt.find_optimal_trade(&source, &dest, &c).unwrap();

            assert!(route.input_amount >= min_size && route.input_amount <= max_size);
            assert!(route.expected_profit_usd > Decimal::ZERO);
            assert_eq!(route.source_pool, "a");
            assert_eq!(route.dest_pool, "b");
        }
    }

    #[test]
    fn test_grid_refine_beats_boundary_seeking_binary_search() {
        let source = pool("a", dec!(100), dec!(0.0001), 1_000_000);
        let dest = pool("b", dec!(110), dec!(0.0001), 1_000_000);
        let c = conditions();

        let binary = optimizer(SearchStrategy::Binary).find_optimal_trade(&source, &dest, &c).unwrap();
        let grid = optimizer(SearchStrategy::GridRefine).find_optimal_trade(&source, &dest, &c).unwrap();

        assert!(grid.expected_profit_usd >= binary.expected_profit_usd);
    }

    #[test]
    fn test_search_respects_iteration_budget() {
        let source = pool("a", dec!(100), dec!(0.0001), 1_000_000);
        let dest = pool("b", dec!(110), dec!(0.0001), 1_000_000);
        let c = conditions();

        for strategy in [SearchStrategy::Binary, SearchStrategy::GridRefine] {
            for max_iterations in [1, 3] {
                let opt = TradeSizeOptimizer::new(
                    OptimizerConfig { strategy, max_iterations, grid_points: 16, ..OptimizerConfig::default() },
                    FeeModel::default(),
                );
                let (min_size, max_size) = opt.size_bounds(&source, &dest).unwrap();

                let mut calls = 0u32;
                let best = opt.search(min_size, max_size, |size| {
                    calls += 1;
                    opt.simulate_trade(&source, &dest, &c, size)
                });

                assert!(calls >= 1 && calls <= max_iterations, "{:?} cap {}: {} calls", strategy, max_iterations, calls);
                if let Some(best) = best {
                    assert!(best.input_amount >= min_size && best.input_amount <= max_size);
                }
            }
        }
    }

    #[test]
    fn test_overflowing_reserve_value_skips_pair() {
        let decimals = PairDecimals { base: 6, quote: 18 };
        let mut source = pool("a", dec!(3000), dec!(0.0001), 0);
        let mut dest = pool("b", dec!(3100), dec!(0.0001), 0);
        for p in [&mut source, &mut dest] {
            p.decimals = decimals;
            p.active_liquidity = ActiveLiquidity {
                base_amount: 100_000_000_000_000,
                quote_amount: 1_000_000_000_000_000_000,
            };
        }
        assert!(source.validate().is_ok() && dest.validate().is_ok());

        let opt = optimizer(SearchStrategy::GridRefine);
        assert_eq!(opt.size_bounds(&source, &dest), None);
        assert!(opt.find_optimal_route(&[source, dest], &conditions()).is_none());
    }

    #[test]
    fn test_equal_prices_yield_no_route() {
        let c = conditions();
        let snapshots = vec![
            pool("a", dec!(100), dec!(0.003), 10_000),
            pool("b", dec!(100), dec!(0.003), 10_000),
        ];
        for strategy in [SearchStrategy::Binary, SearchStrategy::GridRefine] {
            assert!(optimizer(strategy).find_optimal_route(&snapshots, &c).is_none());
        }

        // Even with no fees at all the round trip cannot gain
        let free = TradeSizeOptimizer::new(
            OptimizerConfig::default(),
            FeeModel::new(Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
        );
        let snapshots = vec![
            pool("a", dec!(100), Decimal::ZERO, 10_000),
            pool("b", dec!(100), Decimal::ZERO, 10_000),
        ];
        assert!(free.find_optimal_route(&snapshots, &c).is_none());
    }

    #[test]
    fn test_scenario_a_yields_no_route() {
        let snapshots = vec![
            pool("a", dec!(100.00), dec!(0.003), 100_000),
            pool("b", dec!(100.50), dec!(0.003), 100_000),
        ];
        let c = NetworkConditions::new(Decimal::ZERO, 0);
        assert!(optimizer(SearchStrategy::GridRefine).find_optimal_route(&snapshots, &c).is_none());
    }

    #[test]
    fn test_find_optimal_route_picks_best_pair_and_finalizes() {
        let snapshots = vec![
            pool("mid", dec!(105), dec!(0.0001), 100_000),
            pool("high", dec!(110), dec!(0.0001), 100_000),
            pool("low", dec!(100), dec!(0.0001), 100_000),
        ];
        let c = NetworkConditions::new(dec!(0.9), 100_000);
        let route = optimizer(SearchStrategy::GridRefine)
            .find_optimal_route(&snapshots, &c)
            .unwrap();

        assert_eq!(route.source_pool, "low");
        assert_eq!(route.dest_pool, "high");
        assert_eq!(route.execution.strategy_tier, StrategyTier::Aggressive);
        assert_eq!(route.execution.priority_fee, 190_000);
    }

    #[test]
    fn test_invalid_pools_are_excluded() {
        let mut broken = pool("broken", dec!(90), dec!(0.0001), 100_000);
        broken.price = Decimal::ZERO;
        let snapshots = vec![
            broken,
            pool("low", dec!(100), dec!(0.0001), 100_000),
            pool("high", dec!(110), dec!(0.0001), 100_000),
        ];
        let route = optimizer(SearchStrategy::GridRefine)
            .find_optimal_route(&snapshots, &conditions())
            .unwrap();
        assert_eq!(route.source_pool, "low");
    }

    #[test]
    fn test_min_profit_threshold_drops_route() {
        let snapshots = vec![
            pool("low", dec!(100), dec!(0.0001), 100_000),
            pool("high", dec!(110), dec!(0.0001), 100_000),
        ];
        let opt = TradeSizeOptimizer::new(
            OptimizerConfig {
                min_profit_threshold_usd: dec!(1000000000),
                ..OptimizerConfig::default()
            },
            FeeModel::default(),
        );
        assert!(opt.find_optimal_route(&snapshots, &conditions()).is_none());
    }
}
