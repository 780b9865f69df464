//! Opportunity Evaluation Module
//!
//! Everything between pool snapshots and the accept/reject decision:
//! - Round-trip fee model
//! - Trade size search over a pool pair
//! - Route finalization for congestion
//! - Simulated-execution cross check
//! - Safety-margin profitability gate

pub mod fee_model;
pub mod optimizer;
pub mod profitability;
pub mod route_builder;
pub mod simulator;
pub mod validator;

// Re-exports for external use
pub use fee_model::FeeModel;
pub use optimizer::{OptimizerConfig, SearchStrategy, TradeEvaluation, TradeSizeOptimizer};
pub use profitability::{GateConfig, GateDecision, ProfitabilityGate};
pub use route_builder::{RouteBuilder, AGGRESSIVE_CONGESTION, NORMAL_CONGESTION};
pub use simulator::{ExecutionSimulator, LegSimulation, SnapshotSimulator};
pub use validator::{RouteValidator, ValidationReport, ValidatorConfig};
