//! Network Conditions Monitor
//!
//! Derives congestion from recent performance samples and smooths the
//! recommended priority fee and block time over a rolling window owned by
//! the monitor instance.

use async_trait::async_trait;
use eyre::Result;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::history::RollingWindow;
use super::{NetworkConditions, NetworkConditionsSampler};
use crate::error::ArbError;

pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// One performance sample as reported by the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub num_transactions: u64,
    pub num_slots: u64,
    pub sample_period_secs: u64,
}

/// Node-side source of performance samples (RPC in production).
#[async_trait]
pub trait PerformanceSource: Send + Sync {
    async fn recent_performance_samples(&self, limit: usize) -> Result<Vec<PerformanceSample>>;
}

#[derive(Debug, Clone)]
pub struct NetworkMonitorConfig {
    /// Fee at zero congestion, in fee units
    pub base_priority_fee: u64,
    pub min_priority_fee: u64,
    pub max_priority_fee: u64,
    /// Buffer applied on top of the smoothed fee
    pub priority_fee_multiplier: Decimal,
    /// Transactions per slot considered full load
    pub tx_per_slot_saturation: u64,
    pub sample_limit: usize,
    pub history_capacity: usize,
}

impl Default for NetworkMonitorConfig {
    fn default() -> Self {
        Self {
            base_priority_fee: 100_000,
            min_priority_fee: 10_000,
            max_priority_fee: 1_000_000,
            priority_fee_multiplier: dec!(1.2),
            tx_per_slot_saturation: 5_000,
            sample_limit: 10,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

#[derive(Debug)]
struct History {
    priority_fees: RollingWindow<u64>,
    block_times_ms: RollingWindow<u64>,
}

/// `NetworkConditionsSampler` backed by a `PerformanceSource`.
pub struct NetworkMonitor<S> {
    source: S,
    config: NetworkMonitorConfig,
    history: Mutex<History>,
}

impl<S> NetworkMonitor<S>
where
    S: PerformanceSource,
{
    pub fn new(source: S, config: NetworkMonitorConfig) -> Self {
        let history = History {
            priority_fees: RollingWindow::new(config.history_capacity),
            block_times_ms: RollingWindow::new(config.history_capacity),
        };
        Self {
            source,
            config,
            history: Mutex::new(history),
        }
    }

    pub fn config(&self) -> &NetworkMonitorConfig {
        &self.config
    }

    /// Raw (unsmoothed) priority fees currently held, oldest first
    pub fn fee_history(&self) -> Vec<u64> {
        self.history.lock().priority_fees.iter().copied().collect()
    }

    /// Mean transactions per slot normalized by `saturation`, capped at 1.
    /// Samples with zero slots are ignored; `None` if nothing usable remains.
    pub fn congestion_from_samples(samples: &[PerformanceSample], saturation: u64) -> Option<Decimal> {
        let per_slot: Vec<Decimal> = samples
            .iter()
            .filter(|s| s.num_slots > 0)
            .map(|s| Decimal::from(s.num_transactions) / Decimal::from(s.num_slots))
            .collect();

        if per_slot.is_empty() || saturation == 0 {
            return None;
        }

        let mean = per_slot.iter().copied().sum::<Decimal>() / Decimal::from(per_slot.len());
        Some((mean / Decimal::from(saturation)).min(Decimal::ONE))
    }

    /// Mean slot time in milliseconds across usable samples
    pub fn block_time_from_samples(samples: &[PerformanceSample]) -> Option<u64> {
        let times: Vec<u64> = samples
            .iter()
            .filter(|s| s.num_slots > 0 && s.sample_period_secs > 0)
            .map(|s| s.sample_period_secs.saturating_mul(1_000) / s.num_slots)
            .collect();

        if times.is_empty() {
            return None;
        }
        Some(times.iter().sum::<u64>() / times.len() as u64)
    }

    fn raw_priority_fee(&self, congestion: Decimal) -> u64 {
        (Decimal::from(self.config.base_priority_fee) * (Decimal::ONE + congestion))
            .floor()
            .to_u64()
            .unwrap_or(self.config.max_priority_fee)
    }

    fn bounded_fee(&self, smoothed: u64) -> u64 {
        let buffered = (Decimal::from(smoothed) * self.config.priority_fee_multiplier)
            .floor()
            .to_u64()
            .unwrap_or(self.config.max_priority_fee);
        buffered.clamp(self.config.min_priority_fee, self.config.max_priority_fee)
    }
}

#[async_trait]
impl<S> NetworkConditionsSampler for NetworkMonitor<S>
where
    S: PerformanceSource,
{
    async fn sample(&self) -> Result<NetworkConditions> {
        let samples = self
            .source
            .recent_performance_samples(self.config.sample_limit)
            .await
            .map_err(|e| ArbError::TransientUpstream(format!("performance samples: {}", e)))?;

        let congestion = Self::congestion_from_samples(&samples, self.config.tx_per_slot_saturation)
            .ok_or_else(|| ArbError::DataUnavailable("no usable performance samples".to_string()))?;

        let raw_fee = self.raw_priority_fee(congestion);
        let block_time = Self::block_time_from_samples(&samples);

        let (smoothed_fee, smoothed_block_time) = {
            let mut history = self.history.lock();
            history.priority_fees.push(raw_fee);
            if let Some(block_time) = block_time {
                history.block_times_ms.push(block_time);
            }
            (
                history.priority_fees.mean().unwrap_or(raw_fee),
                history.block_times_ms.mean(),
            )
        };

        let recommended = self.bounded_fee(smoothed_fee);

        debug!(
            "Network: congestion={:.3} raw_fee={} smoothed_fee={} recommended={} block_time={:?}ms",
            congestion, raw_fee, smoothed_fee, recommended, smoothed_block_time
        );

        Ok(NetworkConditions::new(congestion, recommended).with_block_time(smoothed_block_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSource {
        samples: Vec<PerformanceSample>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PerformanceSource for FixedSource {
        async fn recent_performance_samples(&self, limit: usize) -> Result<Vec<PerformanceSample>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(self.samples.iter().take(limit).copied().collect())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl PerformanceSource for FailingSource {
        async fn recent_performance_samples(&self, _limit: usize) -> Result<Vec<PerformanceSample>> {
            Err(eyre::eyre!("connection refused"))
        }
    }

    fn sample(tx: u64, slots: u64, secs: u64) -> PerformanceSample {
        PerformanceSample { num_transactions: tx, num_slots: slots, sample_period_secs: secs }
    }

    fn monitor(samples: Vec<PerformanceSample>) -> NetworkMonitor<FixedSource> {
        NetworkMonitor::new(
            FixedSource { samples, calls: AtomicUsize::new(0) },
            NetworkMonitorConfig::default(),
        )
    }

    #[test]
    fn test_congestion_from_samples() {
        // 2500 tx/slot over a 5000 saturation -> 0.5
        let samples = vec![sample(250_000, 100, 60), sample(125_000, 50, 30)];
        assert_eq!(
            NetworkMonitor::<FixedSource>::congestion_from_samples(&samples, 5_000),
            Some(dec!(0.5))
        );

        // Saturated load caps at 1
        let samples = vec![sample(1_000_000, 100, 60)];
        assert_eq!(
            NetworkMonitor::<FixedSource>::congestion_from_samples(&samples, 5_000),
            Some(Decimal::ONE)
        );

        let samples = vec![sample(100, 0, 60)];
        assert_eq!(NetworkMonitor::<FixedSource>::congestion_from_samples(&samples, 5_000), None);
    }

    #[test]
    fn test_block_time_from_samples() {
        let samples = vec![sample(0, 150, 60), sample(0, 100, 40)];
        assert_eq!(NetworkMonitor::<FixedSource>::block_time_from_samples(&samples), Some(400));
        assert_eq!(NetworkMonitor::<FixedSource>::block_time_from_samples(&[]), None);
    }

    #[tokio::test]
    async fn test_sample_applies_congestion_multiplier_and_bounds() {
        // congestion 0.5 -> raw 150_000, x1.2 -> 180_000
        let m = monitor(vec![sample(250_000, 100, 40)]);
        let conditions = m.sample().await.unwrap();

        assert_eq!(conditions.congestion_level, dec!(0.5));
        assert_eq!(conditions.recommended_priority_fee, 180_000);
        assert_eq!(conditions.block_time_ms, Some(400));
        assert_eq!(m.fee_history(), vec![150_000]);
    }

    #[tokio::test]
    async fn test_fee_is_clamped_to_max() {
        let config = NetworkMonitorConfig {
            base_priority_fee: 900_000,
            ..NetworkMonitorConfig::default()
        };
        let m = NetworkMonitor::new(
            FixedSource { samples: vec![sample(1_000_000, 100, 40)], calls: AtomicUsize::new(0) },
            config,
        );
        let conditions = m.sample().await.unwrap();
        assert_eq!(conditions.recommended_priority_fee, 1_000_000);
    }

    #[tokio::test]
    async fn test_history_is_bounded_and_owned_by_monitor() {
        let m = monitor(vec![sample(0, 100, 40)]);
        for _ in 0..11 {
            m.sample().await.unwrap();
        }
        assert_eq!(m.fee_history().len(), DEFAULT_HISTORY_CAPACITY);
        assert_eq!(m.source.calls.load(Ordering::Relaxed), 11);

        let other = monitor(vec![sample(0, 100, 40)]);
        assert!(other.fee_history().is_empty());
    }

    #[tokio::test]
    async fn test_sampling_errors_are_classified() {
        let m = NetworkMonitor::new(FailingSource, NetworkMonitorConfig::default());
        let err = m.sample().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArbError>(),
            Some(ArbError::TransientUpstream(_))
        ));

        let m = monitor(vec![]);
        let err = m.sample().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArbError>(),
            Some(ArbError::DataUnavailable(_))
        ));
    }
}
