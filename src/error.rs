// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::zms::ZmsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncerError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Watch error: {0}")]
    WatchError(String),

    #[error("Resource version conflict on AthenzDomain {0}")]
    Conflict(String),

    #[error("ZMS error: {0}")]
    ZmsError(#[from] ZmsError),

    #[error("Failed to load credentials: {0}")]
    CredentialError(String),

    #[error("Invalid domain data: {0}")]
    InvalidDomain(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Failed to build cluster client: {0}")]
    KubeconfigError(String),
}

impl SyncerError {
    /// Whether a reconcile attempt that failed with this error should be requeued
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncerError::Conflict(_) | SyncerError::WatchError(_) => true,
            SyncerError::ZmsError(e) => e.is_retryable(),
            SyncerError::KubeError(kube::Error::Api(resp)) => {
                resp.code >= 500 || resp.code == 429 || resp.code == 409
            }
            SyncerError::KubeError(_) => true,
            SyncerError::InvalidDomain(_)
            | SyncerError::CredentialError(_)
            | SyncerError::ConfigError(_)
            | SyncerError::KubeconfigError(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncerError>;
