//! Parrot capture engine binary.
//!
//! Loads the engine configuration, builds the reqwest replay transport, and
//! runs the ingestion loop until interrupted. The sink and relay handles
//! created here are what a hosting runtime would wire into its interception
//! and page-injection mechanisms.

use clap::Parser;
use parrot_capture::replay::ReqwestTransport;
use parrot_capture::{CaptureEngine, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "parrot-capture",
    author,
    version,
    about = "HTTP request capture and replay engine"
)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "PARROT_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::from_file(&args.config)?;
    info!(self_origin = %config.self_origin, "configuration loaded");

    let transport = Arc::new(ReqwestTransport::new(&config.replay_options())?);
    let engine = CaptureEngine::new(config, transport);

    // Handles for the hosting runtime's adapters. Held for the lifetime of
    // the process so the ingestion queue stays open.
    let _sink = engine.sink();
    let _relay = engine.relay_endpoint();
    let counters = engine.counters();

    tokio::select! {
        _ = engine.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!(counters = ?counters.snapshot(), "shutting down");
        }
    }

    Ok(())
}
