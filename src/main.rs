//! # courier
//!
//! Courier relay binary: loads settings, opens the durable log, and serves
//! the HTTP + WebSocket surface until ctrl-c.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use courier_auth::TokenIssuer;
use courier_server::{CourierServer, ServerConfig};
use courier_settings::CourierSettings;
use courier_store::{ConnectionConfig, SqliteStore};

/// Courier real-time messaging relay.
#[derive(Parser, Debug)]
#[command(name = "courier", about = "Courier real-time messaging relay")]
struct Cli {
    /// Settings file (defaults to `~/.courier/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Log filter when `RUST_LOG` is unset (e.g. `info`, `courier_server=debug`).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Overlay command-line flags on loaded settings.
    fn apply(&self, settings: &mut CourierSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.db_path {
            settings.database.path = path.to_string_lossy().into_owned();
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .config
        .clone()
        .unwrap_or_else(courier_settings::settings_path);
    let mut settings = courier_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    courier_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);
    tracing::debug!(?settings, "settings loaded");

    let db_path = PathBuf::from(&settings.database.path);
    ensure_parent_dir(&db_path)?;
    let store = Arc::new(
        SqliteStore::open(
            &settings.database.path,
            &ConnectionConfig::from(&settings.database),
        )
        .context("Failed to open database")?,
    );

    let metrics = match courier_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics disabled");
            None
        }
    };

    let issuer = Arc::new(TokenIssuer::from_settings(&settings.auth));
    let server = CourierServer::new(
        ServerConfig::from(&settings.server),
        store.clone(),
        store,
        issuer,
        metrics,
    );
    let handle = server.listen().await.context("Failed to bind listener")?;
    tracing::info!("Courier listening on http://{}", handle.addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    handle.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
