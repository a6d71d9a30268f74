// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Client certificate store that reloads the key and certificate from disk.
//!
//! The active [`CredentialBundle`] is swapped as a whole, so a TLS handshake
//! never sees a key from one load paired with a certificate from another.
//! A failed reload leaves the previous bundle in place.

use crate::error::{Result, SyncerError};
use chrono::{DateTime, Utc};
use rustls::client::ResolvesClientCert;
use rustls::pki_types::CertificateDer;
use rustls::sign::CertifiedKey;
use rustls::SignatureScheme;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ReloadConfig {
    pub key_file: PathBuf,
    pub cert_file: PathBuf,
    pub interval: Duration,
}

/// The key and certificate chain in use, plus when they were loaded
#[derive(Debug)]
pub struct CredentialBundle {
    pub certified_key: Arc<CertifiedKey>,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CertReloader {
    config: ReloadConfig,
    current: RwLock<Arc<CredentialBundle>>,
}

impl CertReloader {
    /// Load the initial bundle. Failing here is fatal: there is nothing to fall back on.
    pub async fn new(config: ReloadConfig) -> Result<Self> {
        let bundle = load_bundle(&config.key_file, &config.cert_file).await?;
        info!(
            "Loaded client certificate from {}",
            config.cert_file.display()
        );
        Ok(Self {
            config,
            current: RwLock::new(Arc::new(bundle)),
        })
    }

    /// The bundle currently in use
    pub fn latest(&self) -> Arc<CredentialBundle> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-read the key and certificate; the active bundle is only replaced if both parse
    #[instrument(skip(self), fields(cert = %self.config.cert_file.display()))]
    pub async fn reload(&self) -> Result<()> {
        let bundle = Arc::new(load_bundle(&self.config.key_file, &self.config.cert_file).await?);
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = bundle;
        debug!("Client certificate reloaded");
        Ok(())
    }

    /// Reload on a fixed interval until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.config.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.reload().await {
                        warn!("Keeping previous client certificate, reload failed: {}", e);
                    }
                }
            }
        }

        debug!("Certificate reloader stopped");
    }
}

impl ResolvesClientCert for CertReloader {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        Some(self.latest().certified_key.clone())
    }

    fn has_certs(&self) -> bool {
        true
    }
}

async fn load_bundle(key_file: &Path, cert_file: &Path) -> Result<CredentialBundle> {
    let key_pem = tokio::fs::read(key_file).await.map_err(|e| {
        SyncerError::CredentialError(format!("failed to read {}: {}", key_file.display(), e))
    })?;
    let cert_pem = tokio::fs::read(cert_file).await.map_err(|e| {
        SyncerError::CredentialError(format!("failed to read {}: {}", cert_file.display(), e))
    })?;

    Ok(CredentialBundle {
        certified_key: Arc::new(parse_certified_key(&key_pem, &cert_pem)?),
        loaded_at: Utc::now(),
    })
}

/// Parse a PEM private key and PEM certificate chain into a signing identity
pub fn parse_certified_key(key_pem: &[u8], cert_pem: &[u8]) -> Result<CertifiedKey> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_pem))
        .collect::<std::io::Result<Vec<CertificateDer<'static>>>>()
        .map_err(|e| SyncerError::CredentialError(format!("invalid certificate PEM: {}", e)))?;
    if certs.is_empty() {
        return Err(SyncerError::CredentialError(
            "no certificate found in PEM".to_string(),
        ));
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(key_pem))
        .map_err(|e| SyncerError::CredentialError(format!("invalid private key PEM: {}", e)))?
        .ok_or_else(|| SyncerError::CredentialError("no private key found in PEM".to_string()))?;

    let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
        .map_err(|e| SyncerError::CredentialError(format!("unsupported private key: {}", e)))?;

    Ok(CertifiedKey::new(certs, signing_key))
}
