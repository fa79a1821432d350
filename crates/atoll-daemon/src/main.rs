// crates/atoll-daemon/src/main.rs
//
// Binary entrypoint for the Atoll overlay daemon.
//
// Initializes tracing, parses CLI arguments, loads and validates
// configuration, constructs the shared directory/ledger/engine, and
// spawns the discovery, transport, fanout, and reporting workers.

mod config;
mod judge;
mod status;
mod updates;

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::sync::mpsc;

use atoll_admission::AdmissionEngine;
use atoll_core::Candidate;
use atoll_directory::PeerDirectory;
use atoll_p2p::{DiscoveryListener, Transport};
use atoll_reputation::ReputationLedger;

use config::DaemonConfig;
use judge::EngineJudge;

/// Atoll overlay daemon: peer discovery, admission, and fanout.
#[derive(Parser, Debug)]
#[command(name = "atoll-daemon", version = "0.1.0", about = "Atoll overlay node daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "~/.atoll/config.toml")]
    config: String,

    /// Identity override for this node.
    #[arg(long)]
    identity: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration from TOML file, falling back to defaults if
    // the file is not found.
    let mut daemon_config = match DaemonConfig::load(&expand_tilde(&args.config)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!(
                "Could not load config from {}: {}. Using defaults.",
                args.config, e
            );
            DaemonConfig::default()
        }
    };

    // CLI --identity flag overrides the config file value.
    if let Some(identity) = args.identity {
        daemon_config.identity = identity;
    }

    // Initialize tracing subscriber for structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(daemon_config.log_level.clone())),
        )
        .init();

    // Validate everything before any socket is opened; invalid weight
    // sums or thresholds must refuse to serve.
    daemon_config.validate()?;

    tracing::info!("Atoll Overlay Daemon v0.1.0");
    tracing::info!("Identity: {}", daemon_config.identity);
    tracing::info!(
        "Transport: tcp/{}:{}",
        daemon_config.listen_host,
        daemon_config.listen_port
    );
    tracing::info!("Discovery: udp/{}", daemon_config.discovery_port);
    tracing::info!(
        "Admission threshold: {:.2}",
        daemon_config.acceptance_threshold
    );

    // -----------------------------------------------------------------
    // Shared state: explicitly constructed, explicitly owned, passed to
    // each component at construction time.
    // -----------------------------------------------------------------
    let directory = PeerDirectory::new();
    let ledger = ReputationLedger::new(
        daemon_config.decay_lambda,
        daemon_config.history_capacity,
    );
    let engine = AdmissionEngine::new(
        daemon_config.admission_config(),
        directory.clone(),
        ledger.clone(),
    )?;

    // Admission updates flow from the judge to the fanout worker.
    let (update_tx, update_rx) = mpsc::channel(64);
    let judge = Arc::new(EngineJudge::new(engine.clone(), update_tx));

    // Spawn the fanout worker.
    tokio::spawn(updates::run_update_fanout(
        update_rx,
        daemon_config.fanout_config(),
        daemon_config.identity.clone(),
        directory.clone(),
        ledger.clone(),
    ));

    // Spawn the TCP transport.
    let transport = Arc::new(Transport::new(
        daemon_config.identity.clone(),
        daemon_config.transport_config(),
        directory.clone(),
        judge,
    ));
    tokio::spawn(async move {
        if let Err(e) = transport.listen().await {
            tracing::error!("Transport listener error: {}", e);
        }
    });

    // Spawn discovery: announcer + sweep on one timer, listener on its
    // own socket. Freshly discovered peers are pre-scored without
    // committing a record.
    let prescore_engine = engine.clone();
    let discovery = Arc::new(
        DiscoveryListener::new(
            daemon_config.identity.clone(),
            daemon_config.advertised_address(),
            daemon_config.metadata.clone(),
            daemon_config.discovery_config(),
            directory.clone(),
        )
        .with_callback(Arc::new(move |record| {
            let engine = prescore_engine.clone();
            tokio::spawn(async move {
                engine.note_discovered(&record.identity).await;
                let candidate = Candidate::from(&record);
                match engine.evaluate(candidate).await {
                    Ok(verdict) => tracing::debug!(
                        "Pre-score for {}: {:.3}",
                        record.identity,
                        verdict.aggregate
                    ),
                    Err(e) => tracing::debug!(
                        "Pre-score for {} skipped: {}",
                        record.identity,
                        e
                    ),
                }
            });
        })),
    );
    let announcer = discovery.clone();
    tokio::spawn(async move {
        if let Err(e) = announcer.run_announcer().await {
            tracing::error!("Discovery announcer error: {}", e);
        }
    });
    let listener = discovery.clone();
    tokio::spawn(async move {
        if let Err(e) = listener.run_listener().await {
            tracing::error!("Discovery listener error: {}", e);
        }
    });

    // Spawn periodic reporting and chain verification.
    let started = Instant::now();
    tokio::spawn(status::run_health_loop(
        directory.clone(),
        ledger.clone(),
        engine.clone(),
        Duration::from_secs(daemon_config.health_interval_secs),
        started,
    ));
    tokio::spawn(status::run_verify_loop(
        engine.clone(),
        Duration::from_secs(daemon_config.verify_interval_secs),
    ));

    tracing::info!("All workers started; press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Atoll daemon shut down gracefully");

    Ok(())
}

/// Expand `~` at the start of a path to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{}", home.display(), &path[1..]);
        }
    }
    path.to_string()
}
