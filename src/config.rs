use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::engine::EngineConfig;
use crate::error::ArbError;
use crate::network::NetworkMonitorConfig;
use crate::scheduler::SchedulerConfig;
use crate::simulation::{FeeModel, GateConfig, OptimizerConfig, SearchStrategy, ValidatorConfig};

/// Complete runtime configuration, assembled from the environment.
#[derive(Debug, Clone)]
pub struct ArbConfig {
    pub fee_model: FeeModel,
    pub optimizer: OptimizerConfig,
    pub validator: ValidatorConfig,
    pub gate: GateConfig,
    pub monitor: NetworkMonitorConfig,
    pub engine: EngineConfig,
    pub scheduler: SchedulerConfig,
    pub fixture_path: PathBuf,
    /// Stop after this many cycles; run forever if unset
    pub max_cycles: Option<u64>,
}

impl Default for ArbConfig {
    fn default() -> Self {
        Self {
            fee_model: FeeModel::default(),
            optimizer: OptimizerConfig::default(),
            validator: ValidatorConfig::default(),
            gate: GateConfig::default(),
            monitor: NetworkMonitorConfig::default(),
            engine: EngineConfig::default(),
            scheduler: SchedulerConfig::default(),
            fixture_path: PathBuf::from("fixtures/pools.json"),
            max_cycles: None,
        }
    }
}

/// Parse `key` if set, otherwise keep `default`.
fn env_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ArbError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| ArbError::config(key, format!("{:?}: {}", raw, e))),
        _ => Ok(default),
    }
}

impl ArbConfig {
    pub fn from_env() -> eyre::Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Self::from_lookup(|key| std::env::var(key).ok())?)
    }

    /// Build from any key/value source; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ArbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();

        let min_profit_threshold_usd =
            env_or(&lookup, "MIN_PROFIT_THRESHOLD_USD", d.gate.min_profit_threshold_usd)?;
        let priority_fee_unit_usd =
            env_or(&lookup, "PRIORITY_FEE_UNIT_USD", d.fee_model.priority_fee_unit_usd)?;

        let fee_model = FeeModel::new(
            env_or(&lookup, "MAX_SLIPPAGE", d.fee_model.max_slippage)?,
            env_or(&lookup, "PRIORITY_FEE_RATE_SCALE", d.fee_model.priority_fee_rate_scale)?,
            priority_fee_unit_usd,
        );

        let optimizer = OptimizerConfig {
            min_trade_size: env_or(&lookup, "MIN_TRADE_SIZE", d.optimizer.min_trade_size)?,
            convergence_epsilon: env_or(&lookup, "CONVERGENCE_EPSILON", d.optimizer.convergence_epsilon)?,
            max_iterations: env_or(&lookup, "MAX_SEARCH_ITERATIONS", d.optimizer.max_iterations)?,
            grid_points: env_or(&lookup, "GRID_POINTS", d.optimizer.grid_points)?,
            strategy: env_or::<SearchStrategy, _>(&lookup, "SEARCH_STRATEGY", d.optimizer.strategy)?,
            quote_price_usd: env_or(&lookup, "QUOTE_PRICE_USD", d.optimizer.quote_price_usd)?,
            min_profit_threshold_usd,
        };

        let validator = ValidatorConfig {
            tolerance: env_or(&lookup, "VALIDATION_TOLERANCE", d.validator.tolerance)?,
        };

        let gate = GateConfig {
            safety_margin: env_or(&lookup, "PROFIT_SAFETY_MARGIN", d.gate.safety_margin)?,
            min_profit_threshold_usd,
            priority_fee_unit_usd,
        };

        let monitor = NetworkMonitorConfig {
            base_priority_fee: env_or(&lookup, "PRIORITY_FEE", d.monitor.base_priority_fee)?,
            min_priority_fee: env_or(&lookup, "MIN_PRIORITY_FEE", d.monitor.min_priority_fee)?,
            max_priority_fee: env_or(&lookup, "MAX_PRIORITY_FEE", d.monitor.max_priority_fee)?,
            priority_fee_multiplier: env_or(
                &lookup,
                "PRIORITY_FEE_MULTIPLIER",
                d.monitor.priority_fee_multiplier,
            )?,
            tx_per_slot_saturation: env_or(
                &lookup,
                "TX_PER_SLOT_SATURATION",
                d.monitor.tx_per_slot_saturation,
            )?,
            sample_limit: env_or(&lookup, "PERFORMANCE_SAMPLE_LIMIT", d.monitor.sample_limit)?,
            history_capacity: env_or(&lookup, "HISTORY_CAPACITY", d.monitor.history_capacity)?,
        };

        let pool_ids = lookup("POOL_IDS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let engine = EngineConfig {
            max_congestion: env_or(&lookup, "MAX_CONGESTION", d.engine.max_congestion)?,
            min_pool_tvl_usd: env_or(&lookup, "MIN_POOL_TVL_USD", d.engine.min_pool_tvl_usd)?,
            pool_ids,
        };

        let scheduler = SchedulerConfig {
            retry_delay: Duration::from_millis(env_or(&lookup, "RETRY_DELAY_MS", 1_000u64)?),
            max_retries: env_or(&lookup, "MAX_RETRIES", d.scheduler.max_retries)?,
        };

        let max_cycles = match lookup("MAX_CYCLES") {
            Some(_) => Some(env_or(&lookup, "MAX_CYCLES", 0u64)?),
            None => None,
        };

        let config = Self {
            fee_model,
            optimizer,
            validator,
            gate,
            monitor,
            engine,
            scheduler,
            fixture_path: env_or(&lookup, "FIXTURE_PATH", d.fixture_path)?,
            max_cycles,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ArbError> {
        let unit = |field: &str, v: Decimal| -> Result<(), ArbError> {
            if v < Decimal::ZERO || v > Decimal::ONE {
                return Err(ArbError::config(field, format!("{} outside [0, 1]", v)));
            }
            Ok(())
        };
        unit("MAX_SLIPPAGE", self.fee_model.max_slippage)?;
        unit("VALIDATION_TOLERANCE", self.validator.tolerance)?;
        unit("MAX_CONGESTION", self.engine.max_congestion)?;

        let margin = self.gate.safety_margin;
        if margin <= Decimal::ZERO || margin >= Decimal::ONE {
            return Err(ArbError::config("PROFIT_SAFETY_MARGIN", format!("{} outside (0, 1)", margin)));
        }

        if self.monitor.min_priority_fee > self.monitor.max_priority_fee {
            return Err(ArbError::config(
                "MIN_PRIORITY_FEE",
                format!(
                    "{} exceeds MAX_PRIORITY_FEE {}",
                    self.monitor.min_priority_fee, self.monitor.max_priority_fee
                ),
            ));
        }
        if self.monitor.priority_fee_multiplier <= Decimal::ZERO {
            return Err(ArbError::config("PRIORITY_FEE_MULTIPLIER", "must be positive"));
        }
        if self.optimizer.quote_price_usd <= Decimal::ZERO {
            return Err(ArbError::config("QUOTE_PRICE_USD", "must be positive"));
        }
        if self.gate.min_profit_threshold_usd < Decimal::ZERO {
            return Err(ArbError::config("MIN_PROFIT_THRESHOLD_USD", "must not be negative"));
        }
        if self.optimizer.max_iterations == 0 {
            return Err(ArbError::config("MAX_SEARCH_ITERATIONS", "must be at least 1"));
        }
        if self.optimizer.grid_points < 2 {
            return Err(ArbError::config("GRID_POINTS", "must be at least 2"));
        }
        Ok(())
    }
}
