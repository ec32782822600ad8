//! configd: session-based transactional configuration daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!     RPC client                ┌──────────────────────────────────────────────┐
//!     ──────────────────────────┼─▶ rpc (axum) ──▶ store ──▶ session candidate │
//!                               │                    │                         │
//!                               │                    ▼ commit                  │
//!                               │        diff ─▶ validate ─▶ actions (sh)      │
//!                               │                    │                         │
//!                               │                    ▼                         │
//!                               │             running (ArcSwap)                │
//!                               │                    │ save / load             │
//!                               │                    ▼                         │
//!                               │             boot configuration file          │
//!                               └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use configd::config::{load_config, DaemonConfig};
use configd::lifecycle::{signals, startup, Shutdown};
use configd::observability::{logging, metrics};
use configd::rpc::{self, AppState};

#[derive(Parser)]
#[command(name = "configd")]
#[command(about = "Session-based transactional configuration daemon", long_about = None)]
struct Args {
    /// Daemon configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the schema path from the configuration file.
    #[arg(long)]
    schema: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(schema) = args.schema {
        config.store.schema_path = schema;
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "configd starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        schema = %config.store.schema_path.display(),
        boot_config = %config.store.boot_config_path.display(),
        action_timeout_secs = config.commit.action_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = startup::build_store(&config)?;

    if config.store.restore_on_start {
        match startup::restore_boot_config(&store).await {
            Ok(Some(output)) if !output.is_empty() => {
                tracing::info!(output = %output, "Boot commit output");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Failed to apply boot configuration, starting empty"),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for RPC clients");

    let shutdown = Arc::new(Shutdown::new());
    let signal_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move { signals::shutdown_on_signal(&signal_shutdown).await });

    let app = rpc::router(AppState::new(store), config.listener.max_body_bytes);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.wait())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
