use eyre::{Result, WrapErr};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use dlmm_arb::collector::{Fixture, FixtureCollector, FixturePerformanceSource};
use dlmm_arb::network::NetworkMonitor;
use dlmm_arb::scheduler;
use dlmm_arb::simulation::{ProfitabilityGate, RouteValidator, SnapshotSimulator, TradeSizeOptimizer};
use dlmm_arb::{ArbConfig, ArbitrageEngine, RouteEvent};

fn init_tracing() -> Result<()> {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        let subscriber = FmtSubscriber::builder()
            .json()
            .with_max_level(Level::INFO)
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::INFO)
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Loads .env before tracing reads LOG_FORMAT
    let mut config = ArbConfig::from_env()?;
    init_tracing()?;

    let fixture = Fixture::load(&config.fixture_path)
        .wrap_err("loading pool fixture, set FIXTURE_PATH to override")?;

    if config.engine.pool_ids.is_empty() {
        config.engine.pool_ids = fixture.pool_ids();
    }
    if fixture.performance.is_empty() {
        warn!("Fixture has no performance samples; every cycle will be skipped");
    }

    info!(
        "Evaluating {} pools | min profit ${} | slippage {} | strategy {:?}",
        config.engine.pool_ids.len(),
        config.gate.min_profit_threshold_usd,
        config.fee_model.max_slippage,
        config.optimizer.strategy
    );

    let sampler = NetworkMonitor::new(
        FixturePerformanceSource::new(fixture.performance.clone()),
        config.monitor.clone(),
    );
    let validator = RouteValidator::new(
        SnapshotSimulator::from_snapshots(fixture.pools.clone()),
        config.validator.clone(),
    );
    let engine = ArbitrageEngine::new(
        FixtureCollector::new(fixture.pools),
        sampler,
        TradeSizeOptimizer::new(config.optimizer.clone(), config.fee_model.clone()),
        validator,
        ProfitabilityGate::new(config.gate.clone()),
        config.engine.clone(),
    );

    let summary = scheduler::run(&engine, &config.scheduler, config.max_cycles, |route| {
        match RouteEvent::now(engine.cycles(), route).to_json_line() {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize route: {}", e),
        }
    })
    .await;

    info!(
        "Finished {} cycles: {} routes accepted, {} cycle errors",
        summary.cycles, summary.routes, summary.cycle_errors
    );
    Ok(())
}
