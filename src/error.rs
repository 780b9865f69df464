use thiserror::Error;

/// Failure kinds the evaluation pipeline distinguishes.
///
/// None of these escape a cycle: the engine turns each one into a skip,
/// and only `TransientUpstream` makes the scheduler back off.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArbError {
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("invalid snapshot for pool {pool}: {reason}")]
    InvalidSnapshot { pool: String, reason: String },

    #[error("simulation diverged on {pool}: {reason}")]
    SimulationDivergence { pool: String, reason: String },

    #[error("no profitable trade size in [{min_size}, {max_size}]")]
    OptimizationExhausted { min_size: u64, max_size: u64 },

    #[error("upstream call failed: {0}")]
    TransientUpstream(String),

    #[error("invalid configuration for {field}: {message}")]
    Config { field: String, message: String },
}

impl ArbError {
    pub fn invalid_snapshot(pool: &str, reason: impl Into<String>) -> Self {
        ArbError::InvalidSnapshot {
            pool: pool.to_string(),
            reason: reason.into(),
        }
    }

    pub fn divergence(pool: &str, reason: impl Into<String>) -> Self {
        ArbError::SimulationDivergence {
            pool: pool.to_string(),
            reason: reason.into(),
        }
    }

    pub fn config(field: &str, message: impl Into<String>) -> Self {
        ArbError::Config {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Whether the scheduler should treat this as a cycle-level failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, ArbError::TransientUpstream(_))
    }
}
