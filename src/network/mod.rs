//! Network conditions: the per-cycle congestion/fee view and the
//! collaborator that samples it.

pub mod history;
pub mod monitor;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use history::RollingWindow;
pub use monitor::{NetworkMonitor, NetworkMonitorConfig, PerformanceSample, PerformanceSource};

/// Congestion and fee view for one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConditions {
    /// Congestion in [0, 1]
    pub congestion_level: Decimal,
    /// Recommended priority fee in fee units (e.g. micro-lamports)
    pub recommended_priority_fee: u64,
    #[serde(default)]
    pub block_time_ms: Option<u64>,
}

impl NetworkConditions {
    pub fn new(congestion_level: Decimal, recommended_priority_fee: u64) -> Self {
        Self {
            congestion_level: clamp_unit(congestion_level),
            recommended_priority_fee,
            block_time_ms: None,
        }
    }

    pub fn with_block_time(mut self, block_time_ms: Option<u64>) -> Self {
        self.block_time_ms = block_time_ms;
        self
    }

    /// Congestion clamped to [0, 1]; fields may be set directly or deserialized.
    pub fn congestion(&self) -> Decimal {
        clamp_unit(self.congestion_level)
    }
}

fn clamp_unit(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO).min(Decimal::ONE)
}

/// Source of network conditions, sampled once per cycle.
#[async_trait]
pub trait NetworkConditionsSampler: Send + Sync {
    async fn sample(&self) -> eyre::Result<NetworkConditions>;
}
