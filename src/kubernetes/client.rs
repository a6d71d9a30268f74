// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster client creation

use crate::config::Config;
use crate::error::{Result, SyncerError};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config as KConfig};
use std::path::Path;
use tracing::info;

/// Create the cluster client, from the service account when running in the
/// cluster or from a kubeconfig file otherwise
pub async fn create_cluster_client(config: &Config) -> Result<Client> {
    let client_config = if config.in_cluster_config {
        info!("Using in-cluster configuration");
        KConfig::incluster().map_err(|e| {
            SyncerError::KubeconfigError(format!("Failed to load in-cluster config: {}", e))
        })?
    } else {
        let path = config.kubeconfig_path().ok_or_else(|| {
            SyncerError::KubeconfigError("No kubeconfig path and HOME is not set".to_string())
        })?;
        config_from_kubeconfig(&path).await?
    };

    Client::try_from(client_config)
        .map_err(|e| SyncerError::KubeconfigError(format!("Failed to create client: {}", e)))
}

async fn config_from_kubeconfig(path: &Path) -> Result<KConfig> {
    info!("Using kubeconfig {}", path.display());

    let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
        SyncerError::KubeconfigError(format!(
            "Failed to read kubeconfig {}: {}",
            path.display(),
            e
        ))
    })?;

    KConfig::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| SyncerError::KubeconfigError(format!("Failed to create config: {}", e)))
}
