//! Two-pool arbitrage evaluation: fee model, trade size search, route
//! finalization, simulated cross check and the final profitability gate.

pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod network;
pub mod pools;
pub mod route;
pub mod scheduler;
pub mod simulation;

pub use config::ArbConfig;
pub use engine::{ArbitrageEngine, CycleOutcome, CyclePhase, EngineConfig, SkipReason};
pub use error::ArbError;
pub use route::{ArbitrageRoute, ExecutionParams, RouteEvent, RouteFees, StrategyTier};
