//! rpool-daemon: runs a staking and rewards pool deployment.
//!
//! Restores the deployment from `$RPOOL_DATA_DIR/rpool.db` (or creates one at
//! genesis), drives simulated node activity block by block, logs every
//! committed event as JSON and persists state on checkpoints and shutdown.

mod config;
mod events;
mod simulation;

use tracing::{error, info};

use rpool_engine::LocalDeployment;
use rpool_ledger::{InflationToken, TokenVault};
use rpool_types::{derive_address, BlockNumber};

use crate::config::{tokens, DaemonConfig};
use crate::events::EventBus;
use crate::simulation::Simulation;

/// Block the deployment is created at.
const GENESIS_BLOCK: BlockNumber = 0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Config and logging
    let config = DaemonConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("rpool={}", config.logging.level).parse()?),
        )
        .init();

    info!("rpool daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 2. Storage
    let db_path = data_dir.join("rpool.db");
    let mut conn = rpool_db::open(&db_path)?;

    // 3. Restore, or deploy at genesis
    let settings = config.rewards.dao_settings()?;
    let treasury = config.rewards.treasury_address()?;
    let mut deployment = match rpool_db::load_deployment(&conn, settings.clone(), treasury)? {
        Some(deployment) => deployment,
        None => {
            let token = InflationToken::new(
                derive_address("token"),
                treasury,
                tokens(config.token.genesis_supply),
                config.token.schedule(GENESIS_BLOCK)?,
            )?;
            let vault = TokenVault::new(derive_address("vault"));
            let deployment =
                LocalDeployment::genesis(settings, token, vault, treasury, GENESIS_BLOCK)?;
            rpool_db::save_deployment(&mut conn, &deployment)?;
            deployment
        }
    };

    // 4. Event log
    let event_bus = EventBus::new(1000);
    let logger = tokio::spawn(events::log_events(event_bus.subscribe()));

    // 5. Simulated nodes
    let start_block = deployment
        .claim_interval_block_last()
        .max(deployment.claim_interval_block_start())
        + 1;
    let mut sim = Simulation::new(config.simulation.clone(), treasury)?;
    sim.bootstrap(&mut deployment, start_block)?;
    event_bus.publish(start_block, deployment.take_events());

    info!(
        start_block,
        nodes = sim.nodes().len(),
        total_stake = %deployment.total_stake(),
        db = ?db_path,
        "simulation starting"
    );

    // 6. Run until done or interrupted
    tokio::select! {
        result = simulation::run(&mut sim, &mut deployment, &mut conn, &event_bus, start_block) => {
            if let Err(e) = result {
                error!("simulation error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
        }
    }

    // 7. Final checkpoint
    rpool_db::save_deployment(&mut conn, &deployment)?;
    let published = event_bus.published();
    drop(event_bus);
    let logger_clean = events::join_logger(logger).await;

    info!(published, logger_clean, "daemon stopped");
    Ok(())
}
