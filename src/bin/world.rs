//! realm-physics-server binary
//!
//! Starts the physics core over a generated heightmap world and runs the
//! fixed-rate tick driver until Ctrl-C.
//!
//! ## Configuration
//!
//! Server options (CLI flag or env):
//!
//! | Key                     | Default   | Description                      |
//! |-------------------------|-----------|----------------------------------|
//! | `REALM_CONFIG`          | (none)    | TOML/JSON file with physics tuning |
//! | `REALM_SESSION`         | `default` | Session stamped on events        |
//! | `REALM_TICK_RATE_HZ`    | `30`      | Tick rate                        |
//! | `REALM_SEED`            | `42`      | Terrain seed                     |
//! | `REALM_BASE_HEIGHT`     | `20`      | Mean ground height               |
//! | `REALM_AMPLITUDE`       | `8`       | Terrain height deviation         |
//!
//! Physics tuning (`PhysicsConfig` fields) is read from the config file and
//! then `PHYSICS_<FIELD>` env vars, e.g. `PHYSICS_GRAVITY=-9.8`.

use anyhow::{Context, Result};
use clap::Parser;
use realm_physics::{DriverConfig, HeightmapTerrain, PhysicsConfig, World, WorldDriver, WorldService};
use std::path::PathBuf;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "realm-physics-server", about = "Realm physics server", version)]
struct Args {
    /// Physics tuning file
    #[arg(long, env = "REALM_CONFIG")]
    config: Option<PathBuf>,

    /// Session name stamped on outbound events
    #[arg(long, env = "REALM_SESSION", default_value = "default")]
    session: String,

    /// Tick rate (Hz)
    #[arg(long, env = "REALM_TICK_RATE_HZ", default_value_t = 30.0)]
    tick_rate_hz: f32,

    /// Terrain seed
    #[arg(long, env = "REALM_SEED", default_value_t = 42)]
    seed: u64,

    /// Mean ground height
    #[arg(long, env = "REALM_BASE_HEIGHT", default_value_t = 20.0)]
    base_height: f32,

    /// Terrain height deviation
    #[arg(long, env = "REALM_AMPLITUDE", default_value_t = 8.0)]
    amplitude: f32,
}

fn load_physics_config(path: Option<&PathBuf>) -> Result<PhysicsConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path.as_path()).required(true));
    }
    builder
        .add_source(config::Environment::with_prefix("PHYSICS").try_parsing(true))
        .build()
        .context("Failed to read physics configuration")?
        .try_deserialize::<PhysicsConfig>()
        .context("Invalid physics configuration")
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("realm_physics=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let physics = load_physics_config(args.config.as_ref())?;

    log::info!(
        "Starting realm-physics-server (session='{}', seed={}, tick_rate={}Hz)",
        args.session,
        args.seed,
        args.tick_rate_hz,
    );

    let terrain = Arc::new(HeightmapTerrain::new(args.seed, args.base_height, args.amplitude));
    let world = Arc::new(World::new(terrain));
    let service = Arc::new(parking_lot::Mutex::new(WorldService::new(physics, world)));

    let driver_config = DriverConfig {
        session: args.session,
        tick_rate_hz: args.tick_rate_hz,
        ..Default::default()
    };

    WorldDriver::new(driver_config, service).run().await
}
