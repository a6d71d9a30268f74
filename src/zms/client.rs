// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Mutual TLS client for the ZMS signed domain API

use crate::constants::zms::{ETAG, IF_NONE_MATCH, MODIFIED_DOMAINS_PATH};
use crate::error::Result;
use crate::types::DomainSnapshot;
use crate::zms::reloader::CertReloader;
use crate::zms::types::SignedDomains;
use crate::zms::{DomainSource, ModifiedDomains, ZmsError};
use async_trait::async_trait;
use reqwest::StatusCode;
use rustls::{ClientConfig, RootCertStore};
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

#[derive(Debug, Clone)]
pub struct ZmsClientOptions {
    pub timeout: Duration,
    pub disable_keep_alives: bool,
    /// PEM bundle trusted for the ZMS server certificate; webpki roots when unset
    pub ca_cert_file: Option<PathBuf>,
}

impl Default for ZmsClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            disable_keep_alives: true,
            ca_cert_file: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ZmsClient {
    http: reqwest::Client,
    base: Url,
}

impl ZmsClient {
    /// Build a client that presents the reloader's current certificate on every handshake
    pub fn new(
        zms_url: &str,
        reloader: Arc<CertReloader>,
        options: &ZmsClientOptions,
    ) -> std::result::Result<Self, ZmsError> {
        let tls = tls_config(reloader, options)?;

        let mut builder = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .timeout(options.timeout);
        if options.disable_keep_alives {
            builder = builder.pool_max_idle_per_host(0);
        }

        Ok(Self {
            http: builder.build()?,
            base: base_url(zms_url)?,
        })
    }

    fn modified_domains_url(&self) -> std::result::Result<Url, ZmsError> {
        Ok(self.base.join(MODIFIED_DOMAINS_PATH)?)
    }
}

/// Make sure relative joins append to the API path instead of replacing its last segment
fn base_url(zms_url: &str) -> std::result::Result<Url, ZmsError> {
    let mut base = Url::parse(zms_url)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

fn tls_config(
    reloader: Arc<CertReloader>,
    options: &ZmsClientOptions,
) -> std::result::Result<ClientConfig, ZmsError> {
    let mut roots = RootCertStore::empty();
    match &options.ca_cert_file {
        Some(path) => {
            let pem = std::fs::read(path)
                .map_err(|e| ZmsError::Tls(format!("failed to read {}: {}", path.display(), e)))?;
            for cert in rustls_pemfile::certs(&mut BufReader::new(pem.as_slice())) {
                let cert = cert.map_err(|e| ZmsError::Tls(format!("invalid CA PEM: {}", e)))?;
                roots
                    .add(cert)
                    .map_err(|e| ZmsError::Tls(format!("invalid CA certificate: {}", e)))?;
            }
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ZmsError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_client_cert_resolver(reloader);

    Ok(config)
}

#[async_trait]
impl DomainSource for ZmsClient {
    #[instrument(skip(self))]
    async fn fetch_domain(&self, name: &str) -> Result<Option<DomainSnapshot>> {
        let mut url = self.modified_domains_url()?;
        url.query_pairs_mut()
            .append_pair("domain", name)
            .append_pair("metaonly", "false");

        let response = self.http.get(url).send().await.map_err(ZmsError::from)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("Domain {} not found in ZMS", name);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ZmsError::Status(status.as_u16()).into());
        }

        let body = response.bytes().await.map_err(ZmsError::from)?;
        let signed: SignedDomains =
            serde_json::from_slice(&body).map_err(|e| ZmsError::Malformed(e.to_string()))?;

        if signed.domains.is_empty() {
            debug!("ZMS returned no data for domain {}", name);
            return Ok(None);
        }

        let Some(signed_domain) = signed.domains.into_iter().find(|d| d.domain.name == name) else {
            return Err(ZmsError::Malformed(format!(
                "response does not contain domain {}",
                name
            ))
            .into());
        };

        signed_domain.domain.into_snapshot().map(Some)
    }

    #[instrument(skip(self))]
    async fn list_modified_domains(&self, etag: Option<&str>) -> Result<ModifiedDomains> {
        let mut url = self.modified_domains_url()?;
        url.query_pairs_mut().append_pair("metaonly", "true");

        let mut request = self.http.get(url);
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = request.send().await.map_err(ZmsError::from)?;
        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(ModifiedDomains {
                etag: etag.map(str::to_string),
                domains: Vec::new(),
            });
        }
        if !status.is_success() {
            return Err(ZmsError::Status(status.as_u16()).into());
        }

        let next_etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| etag.map(str::to_string));

        let body = response.bytes().await.map_err(ZmsError::from)?;
        let signed: SignedDomains =
            serde_json::from_slice(&body).map_err(|e| ZmsError::Malformed(e.to_string()))?;

        Ok(ModifiedDomains {
            etag: next_etag,
            domains: signed.domains.into_iter().map(|d| d.domain.name).collect(),
        })
    }
}
