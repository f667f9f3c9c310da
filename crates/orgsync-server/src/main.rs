//! OrgSync Server: runs the background validation and orphan detection
//! schedules against SurrealDB until interrupted.

mod config;

use orgsync_db::DbManager;
use orgsync_engine::OrgSyncEngine;
use orgsync_engine::memory::{
    DirectorySnapshot, InMemoryDirectory, InMemorySecretStore, SecretSnapshot,
};
use orgsync_engine::notify::TracingChannel;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{ServerConfig, ServerError, read_snapshot};

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("orgsync=info,security_audit=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    info!("Starting OrgSync server...");

    if let Err(e) = run().await {
        error!(error = %e, "OrgSync server failed");
        std::process::exit(1);
    }

    info!("OrgSync server stopped.");
}

async fn run() -> Result<(), ServerError> {
    // 1. Configuration
    let path = ServerConfig::resolve_path();
    let config = ServerConfig::load(&path)?;
    info!(path = %path.display(), "Configuration loaded");

    // 2. Database
    let manager = DbManager::connect(&config.db).await?;
    manager.migrate().await?;
    let repos = manager.repositories();

    // 3. External stores
    let directory = match &config.directory_snapshot {
        Some(path) => InMemoryDirectory::from_snapshot(read_snapshot(path, DirectorySnapshot::from_json)?),
        None => {
            warn!("No directory snapshot configured; starting with an empty directory");
            InMemoryDirectory::new()
        }
    };
    let secrets = match &config.secret_snapshot {
        Some(path) => InMemorySecretStore::from_snapshot(read_snapshot(path, SecretSnapshot::from_json)?),
        None => {
            warn!("No secret snapshot configured; starting with an empty secret store");
            InMemorySecretStore::new()
        }
    };

    // 4. Engine and schedules
    let engine = OrgSyncEngine::new(repos, directory, secrets, TracingChannel, config.engine);
    engine.start_background_validation();
    engine.start_orphan_detection();
    info!(
        sync_interval_secs = engine.config().sync_validation_interval_secs,
        orphan_interval_secs = engine.config().orphan_detection_interval_secs,
        auto_cleanup = engine.config().auto_cleanup,
        "Schedules running"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for shutdown signal");
    }
    info!("Shutdown requested");

    engine.stop_background_validation().await;
    engine.stop_orphan_detection().await;
    Ok(())
}
