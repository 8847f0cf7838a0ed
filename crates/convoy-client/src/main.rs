//! # convoy-client
//!
//! Headless convoy participant.
//!
//! This binary:
//! - loads its configuration from `CONVOY_*` environment variables
//! - opens the shared SQLite store
//! - restores (or creates) this device's participant identity
//! - hosts a new session or joins an existing one by code
//! - drives it from a simulated route, a replayed GPS fix file, or nothing
//! - reads commands from stdin and prints events to stdout as JSON lines

mod config;
mod console;
mod gps;
mod identity;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use convoy_core::{
    ClientCommand, ClientOptions, ConvoyClient, DeviceStream, Gazetteer, JoinRequest, Role,
    SimulationRequest, Tuning,
};
use convoy_store::{ConvoyStore, Database};

use crate::config::ClientConfig;
use crate::identity::Identity;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("convoy_client=debug,convoy_core=debug,convoy_store=info,warn")
        }))
        .init();

    info!("Starting convoy client v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the store and restore the device identity
    // -----------------------------------------------------------------------
    let db = match &config.db_path {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
            }
            Database::open_at(path)?
        }
        None => Database::new()?,
    };
    let store: Arc<dyn ConvoyStore> = Arc::new(db);

    let mut identity = Identity::load_or_create(&config.identity_dir()?)?;
    let display_name = config
        .display_name
        .clone()
        .or_else(|| identity.display_name.clone())
        .unwrap_or_default();
    if !display_name.trim().is_empty() {
        identity.display_name = Some(display_name.trim().to_string());
        identity.save()?;
    }

    // -----------------------------------------------------------------------
    // 4. Position source
    // -----------------------------------------------------------------------
    let tick = Duration::from_millis(config.tick_ms);
    let tuning = Tuning {
        sim_tick: tick,
        ..Tuning::default()
    };

    let gazetteer = match &config.gazetteer {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            Gazetteer::from_json(&json, Gazetteer::DEFAULT_STEP_KM)?
        }
        None => Gazetteer::new(Gazetteer::DEFAULT_STEP_KM),
    };

    let simulation = config.simulation().map(|(from, to)| SimulationRequest {
        from: from.to_string(),
        to: to.to_string(),
        companion: config.sim_companion,
    });

    let device = match (&config.gps_feed, &simulation) {
        (Some(path), None) => {
            let (feed, stream) = DeviceStream::channel(64);
            tokio::spawn(gps::replay_file(path.clone(), feed, tick));
            Some(stream)
        }
        _ => None,
    };

    // -----------------------------------------------------------------------
    // 5. Join
    // -----------------------------------------------------------------------
    let role = match &config.session {
        Some(code) => Role::Guest(code.clone()),
        None => Role::Host,
    };
    let options = ClientOptions {
        request: JoinRequest {
            participant_id: identity.participant_id.clone(),
            display_name,
            color: config.color.clone(),
            role,
        },
        start: config.start,
        simulation,
        device,
    };

    let (event_tx, event_rx) = mpsc::channel(256);
    let client = ConvoyClient::join(store, tuning, options, &gazetteer, event_tx).await?;
    info!(
        code = %client.code(),
        host = client.is_host(),
        participant = %client.participant_id(),
        "Joined session, type `help` for commands"
    );

    // -----------------------------------------------------------------------
    // 6. Run until we leave or the session is closed
    // -----------------------------------------------------------------------
    let printer = tokio::spawn(console::print_events(event_rx));

    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    tokio::spawn(console::read_commands(cmd_tx.clone()));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, leaving");
            let _ = cmd_tx.send(ClientCommand::Leave).await;
        }
    });

    let end = client.run(cmd_rx).await;
    printer.await?;
    info!(?end, "Session over");

    Ok(())
}
