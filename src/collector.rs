//! Pool data collection
//!
//! `PoolDataCollector` is the per-cycle source of pool snapshots. The
//! fixture-backed implementations here drive the binary and the tests; a
//! production deployment plugs an RPC-backed collector in behind the same
//! trait.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::network::{PerformanceSample, PerformanceSource};
use crate::pools::PoolSnapshot;

#[async_trait]
pub trait PoolDataCollector: Send + Sync {
    /// Current snapshot of `pool_id`, or `None` if the pool is unknown.
    async fn snapshot(&self, pool_id: &str) -> Result<Option<PoolSnapshot>>;
}

/// On-disk fixture: pool states and recent performance samples.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    pub pools: Vec<PoolSnapshot>,
    #[serde(default)]
    pub performance: Vec<PerformanceSample>,
}

impl Fixture {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading fixture {}", path.display()))?;
        Self::from_json(&raw).wrap_err_with(|| format!("parsing fixture {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn pool_ids(&self) -> Vec<String> {
        self.pools.iter().map(|p| p.address.clone()).collect()
    }
}

/// Serves snapshots from a fixed set of pools.
#[derive(Debug, Clone, Default)]
pub struct FixtureCollector {
    pools: HashMap<String, PoolSnapshot>,
}

impl FixtureCollector {
    pub fn new(pools: impl IntoIterator<Item = PoolSnapshot>) -> Self {
        Self {
            pools: pools.into_iter().map(|p| (p.address.clone(), p)).collect(),
        }
    }
}

#[async_trait]
impl PoolDataCollector for FixtureCollector {
    async fn snapshot(&self, pool_id: &str) -> Result<Option<PoolSnapshot>> {
        let snapshot = self.pools.get(pool_id).cloned();
        if snapshot.is_none() {
            debug!("Fixture has no pool {}", pool_id);
        }
        Ok(snapshot)
    }
}

/// Replays a fixed list of performance samples.
#[derive(Debug, Clone, Default)]
pub struct FixturePerformanceSource {
    samples: Vec<PerformanceSample>,
}

impl FixturePerformanceSource {
    pub fn new(samples: Vec<PerformanceSample>) -> Self {
        Self { samples }
    }
}

#[async_trait]
impl PerformanceSource for FixturePerformanceSource {
    async fn recent_performance_samples(&self, limit: usize) -> Result<Vec<PerformanceSample>> {
        Ok(self.samples.iter().take(limit).copied().collect())
    }
}
