// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Athenz ZMS client, its wire types and the hot-reloaded client certificate.

pub mod client;
pub mod reloader;
pub mod types;

use crate::error::Result;
use crate::types::DomainSnapshot;
use async_trait::async_trait;
use thiserror::Error;

pub use client::{ZmsClient, ZmsClientOptions};
pub use reloader::{CertReloader, CredentialBundle, ReloadConfig};

#[derive(Error, Debug)]
pub enum ZmsError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("ZMS returned status {0}")]
    Status(u16),

    #[error("malformed ZMS response: {0}")]
    Malformed(String),

    #[error("invalid ZMS url: {0}")]
    Url(#[from] url::ParseError),

    #[error("TLS configuration error: {0}")]
    Tls(String),
}

impl ZmsError {
    /// Network failures, timeouts, server errors and rejected credentials are worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            ZmsError::Transport(e) => !e.is_builder() && !e.is_decode(),
            ZmsError::Status(code) => *code >= 500 || matches!(code, 401 | 403 | 429),
            ZmsError::Malformed(_) | ZmsError::Url(_) | ZmsError::Tls(_) => false,
        }
    }
}

/// Result of polling ZMS for modified domains
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifiedDomains {
    /// ETag to send with the next poll
    pub etag: Option<String>,
    pub domains: Vec<String>,
}

/// Source of authoritative domain data
#[async_trait]
pub trait DomainSource: Send + Sync {
    /// Fetch the current snapshot of a domain; `None` when the domain does not exist
    async fn fetch_domain(&self, name: &str) -> Result<Option<DomainSnapshot>>;

    /// Names of domains modified since the poll that returned `etag`
    async fn list_modified_domains(&self, etag: Option<&str>) -> Result<ModifiedDomains>;
}
