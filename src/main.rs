//! Margin Trading Keeper
//!
//! Executes eligible orders and liquidates under-collateralised positions on a
//! Sui perpetuals protocol, refreshing Pyth prices in the same batch.
//! Every market runs an order cycle and a liquidation cycle of its own.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use keeper_api::HermesClient;
use keeper_chain::{KeeperSigner, Ledger, SuiLedgerBuilder};
use keeper_core::{
    ExecutionGate, KeeperConfig, KeeperContext, MarketCalls, MarketPipeline, MarketRegistry, ProcessAll,
    PythDeployment, PythOracle, Scheduler,
};

/// Environment variable names.
mod env {
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Print startup banner
    print_banner();

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = KeeperConfig::load().context("loading keeper configuration")?;
    config.log_config();

    let (registry, ctx) = initialize_components(&config).await?;
    if registry.is_empty() {
        info!("No markets to process");
        return Ok(());
    }
    info!(markets = ?registry.names(), "Markets resolved");

    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(config.poll_interval(), shutdown.clone());
    let pipelines: Vec<_> = registry
        .iter()
        .map(|market| Arc::new(MarketPipeline::new(ctx.clone(), market.clone())))
        .collect();
    let handles = scheduler.spawn_all(pipelines);

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("Shutdown requested, stopping cycles");
    shutdown.cancel();

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Cycle task ended abnormally");
        }
    }

    info!("Keeper stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,keeper_core=debug,keeper_chain=debug"));

    let json = std::env::var(env::LOG_FORMAT).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
    }
}

async fn initialize_components(config: &KeeperConfig) -> Result<(MarketRegistry, Arc<KeeperContext>)> {
    info!("Initializing components...");

    let signer = KeeperSigner::from_hex(config.private_key()?).context("invalid signing key")?;
    info!(address = %signer.address(), "Signer loaded");

    let ledger: Arc<dyn Ledger> = Arc::new(
        SuiLedgerBuilder::new(config.network.rpc_url())
            .gas_budget(config.gas.budget)
            .build(signer)?,
    );

    let hermes = Arc::new(HermesClient::new(&config.pyth.hermes_url)?);

    let objects = config.protocol_objects()?;
    let deployment = PythDeployment::load(ledger.as_ref(), objects.pyth_state, config.wormhole_state_id()?)
        .await
        .context("loading Pyth deployment")?;
    let oracle = Arc::new(PythOracle::new(deployment, hermes));
    let calls = MarketCalls::new(objects);

    let specs = config.market_specs()?;
    let registry = MarketRegistry::resolve(ledger.as_ref(), &calls, &oracle, &specs).await;

    let ctx = Arc::new(KeeperContext {
        gate: ExecutionGate::new(ledger.clone(), config.rpc_backoff()),
        ledger,
        calls,
        oracle,
        policy: Arc::new(ProcessAll),
        network: config.network.name.clone(),
    });

    info!("All components initialized");
    Ok((registry, ctx))
}

/// Print startup banner.
fn print_banner() {
    println!(
        r#"
    ╦╔═┌─┐┌─┐┌─┐┌─┐┬─┐
    ╠╩╗├┤ ├┤ ├─┘├┤ ├┬┘
    ╩ ╩└─┘└─┘┴  └─┘┴└─
    Margin Trading Keeper v0.1.0
    "#
    );
}
