//! The City server binary.
//!
//! Wires together the world, the tick engine, the persistence writer,
//! and the gateway, then runs until interrupted. The repository is
//! authoritative: on startup every resident row is reconstituted before
//! the first tick.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `city-config.yaml`
//! 3. Load the tile map (configured JSON or the built-in town)
//! 4. Connect to `PostgreSQL` and run migrations
//! 5. Reconstitute residents from the repository
//! 6. Seed job postings and laws into the store
//! 7. Spawn the persistence writer and the gateway
//! 8. Run the tick loop until shutdown

mod bootstrap;
mod error;

use std::path::Path;
use std::sync::Arc;

use city_core::{CityConfig, Engine, WorldClock};
use city_db::{spawn_writer, JobRow, PersistRequest, PostgresPool, PostgresRepository, Repository as _};
use city_gateway::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineSetupError;

/// Application entry point for the City server.
///
/// # Errors
///
/// Returns an error if any initialization step or the engine itself
/// fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("city-engine starting");

    // 2. Load configuration.
    let config = load_config()?;
    info!(
        world_name = config.world.name,
        time_scale = config.world.time_scale,
        sim_rate = config.rates.simulation,
        position_rate = config.rates.position,
        perception_rate = config.rates.perception,
        "configuration loaded"
    );

    // 3. Load the map, keeping the raw data for the gateway.
    let map_data = bootstrap::load_map_data(&config.world.map_path)?;
    let map = bootstrap::load_map(&config.world.map_path)?;
    info!(
        width = map.width(),
        height = map.height(),
        buildings = map.buildings().count(),
        "map ready"
    );

    // 4. Connect to PostgreSQL and migrate.
    let pool = PostgresPool::connect_url(&config.persistence.postgres_url)
        .await
        .map_err(|e| EngineSetupError::Database {
            message: e.to_string(),
        })?;
    pool.run_migrations()
        .await
        .map_err(|e| EngineSetupError::Database {
            message: e.to_string(),
        })?;
    let repository = PostgresRepository::new(pool.pool().clone());

    // 5. Reconstitute residents.
    let mut world = bootstrap::build_world(map, config.train.interval)?;
    let rows = repository
        .load_residents()
        .await
        .map_err(|e| EngineSetupError::Database {
            message: e.to_string(),
        })?;
    let (live, queued) = bootstrap::restore_residents(&mut world, rows);
    info!(live, queued, "residents reconstituted from the repository");

    // 6. Spawn the persistence writer and seed the civic tables.
    let (persist, writer_handle) =
        spawn_writer(repository, config.persistence.queue_capacity);
    for job in world.jobs.jobs.values() {
        let _ = persist.enqueue(PersistRequest::Job(JobRow {
            id: job.id.into_inner(),
            title: job.title.clone(),
            building_id: job.building.map(city_types::BuildingId::into_inner),
            wage: job.wage,
            shift_hours: job.shift_hours,
            max_positions: i32::try_from(job.max_positions).unwrap_or(i32::MAX),
            police: job.police,
            description: job.description.clone(),
        }));
    }

    // 7. Assemble the engine and the gateway.
    let clock = WorldClock::new(config.world.time_scale)?;
    let gateway_config = config.gateway.clone();
    let session_config = config.session;
    let gateway_port = gateway_config.port;
    let (engine, handle, shutdown, snapshot) =
        Engine::new(world, clock, config, persist)?;

    let app_state = Arc::new(AppState::new(
        handle,
        snapshot,
        map_data,
        gateway_config,
        session_config,
    ));
    let _gateway_handle = city_gateway::spawn_server(gateway_port, app_state)
        .await
        .map_err(|e| EngineSetupError::Gateway {
            message: e.to_string(),
        })?;
    info!(port = gateway_port, "gateway started");

    // 8. Run until interrupted.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = shutdown.send(true);
        }
    });

    engine.run().await?;

    // Let the writer drain whatever the shutdown flush queued.
    let _ = writer_handle.await;
    pool.close().await;
    info!("city-engine shutdown complete");
    Ok(())
}

/// Load the main configuration from `city-config.yaml`.
///
/// Looks for the config file relative to the current working directory;
/// defaults are used when it does not exist.
fn load_config() -> Result<CityConfig, EngineSetupError> {
    let config_path = Path::new("city-config.yaml");
    if config_path.exists() {
        CityConfig::from_file(config_path).map_err(|e| EngineSetupError::Config {
            message: e.to_string(),
        })
    } else {
        info!("config file not found, using defaults");
        let mut config = CityConfig::default();
        config.apply_env_overrides();
        Ok(config)
    }
}
