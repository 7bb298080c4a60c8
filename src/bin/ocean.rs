//! intel-ocean binary.
//!
//! Reads JSON-lines events from stdin (or `OCEAN_INPUT`) and runs them
//! through the default analyzer roster until the input ends or Ctrl-C.
//!
//! # Environment Variables
//!
//! - `OCEAN_CONFIG`: YAML or JSON config file (default: built-in defaults)
//! - `OCEAN_INPUT`: events file to read instead of stdin
//! - `OCEAN_FOLLOW`: `1` to keep polling `OCEAN_INPUT` after end-of-file
//! - `OCEAN_*_SECS`, `OCEAN_MAX_WORKERS`: cycle period overrides
//! - `RUST_LOG`: tracing filter (default: "info,intel_ocean=debug")
//!
//! # Usage
//!
//! ```bash
//! tail -f events.jsonl | cargo run --bin ocean
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use intel_ocean::{EventSource, JsonLinesSource, LogReporter, OceanConfig, Orchestrator};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,intel_ocean=debug".into()),
        )
        .init();

    let config = match std::env::var("OCEAN_CONFIG") {
        Ok(path) => OceanConfig::from_file(&PathBuf::from(path))?,
        Err(_) => OceanConfig::default(),
    }
    .with_env_overrides();
    config.validate()?;

    let orchestrator = Arc::new(Orchestrator::new(config, Arc::new(LogReporter))?);

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, stopping");
            stop.stop();
        }
    });

    let stats = match std::env::var("OCEAN_INPUT") {
        Ok(path) => {
            let follow = std::env::var("OCEAN_FOLLOW").as_deref() == Ok("1");
            let file = tokio::fs::File::open(&path).await?;
            tracing::info!("Reading events from {} (follow: {})", path, follow);
            run(&orchestrator, JsonLinesSource::new(BufReader::new(file)).follow(follow)).await?
        }
        Err(_) => {
            tracing::info!("Reading events from stdin");
            run(&orchestrator, JsonLinesSource::new(BufReader::new(tokio::io::stdin()))).await?
        }
    };

    tracing::info!("Session finished: {}", serde_json::to_string(&stats)?);
    Ok(())
}

async fn run<S: EventSource>(
    orchestrator: &Arc<Orchestrator>,
    source: S,
) -> anyhow::Result<intel_ocean::SessionStats> {
    Ok(orchestrator.run(source).await?)
}
