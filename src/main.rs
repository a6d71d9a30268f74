// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use athenz_syncer::config::Config;
use athenz_syncer::kubernetes::{create_cluster_client, wait_for_domain_crd, KubeStore};
use athenz_syncer::logging::init_logging;
use athenz_syncer::sync::{SyncManager, SyncSettings, WorkQueue};
use athenz_syncer::zms::{CertReloader, ZmsClient};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    config.validate()?;

    // Keep the guard alive so buffered log lines reach the file
    let _log_guard = init_logging(&config.log_mode, config.log_location.as_deref())?;

    info!("Starting Athenz syncer");
    info!(
        "Configuration loaded: zms_url={}, update_cron={:?}, resync_cron={:?}, workers={}",
        config.zms_url, config.update_cron, config.resync_cron, config.workers
    );

    let client = create_cluster_client(&config)
        .await
        .context("failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    let reloader = Arc::new(
        CertReloader::new(config.reload_config())
            .await
            .context("failed to load Athenz credentials")?,
    );
    let zms = ZmsClient::new(&config.zms_url, reloader.clone(), &config.zms_options())
        .context("failed to create ZMS client")?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    info!("Waiting for AthenzDomain CRD to become available...");
    if !wait_for_domain_crd(&client, &cancel).await? {
        warn!("Shutdown requested before the CRD became available");
        return Ok(());
    }

    let manager = SyncManager::new(
        Arc::new(KubeStore::new(client)),
        Arc::new(zms),
        Arc::new(WorkQueue::new(config.backoff())),
        config.key_mapper(),
        SyncSettings::from_config(&config),
    )
    .with_reloader(reloader);

    manager.run(cancel).await?;
    info!("Athenz syncer stopped");
    Ok(())
}

/// Cancel on SIGINT or SIGTERM
async fn shutdown_on_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = ctrl_c => {
            if let Err(e) = result {
                warn!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Received SIGINT");
        }
        _ = terminate => info!("Received SIGTERM"),
    }
    cancel.cancel();
}
