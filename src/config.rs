// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::{Result, SyncerError};
use crate::sync::backoff::BackoffStrategy;
use crate::types::key::KeyMapper;
use crate::zms::{ReloadConfig, ZmsClientOptions};
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Shape of the delay applied to keys that failed to reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Syncer configuration, loaded from command line flags with environment fallbacks
#[derive(Debug, Clone, Parser)]
#[command(
    name = "athenz-syncer",
    about = "Syncs Athenz domains, roles and members into AthenzDomain resources"
)]
pub struct Config {
    /// Athenz private key file
    #[arg(long = "key", env = "ATHENZ_KEY_FILE", default_value = "/var/run/athenz/service.key.pem")]
    pub key_file: PathBuf,

    /// Athenz certificate file
    #[arg(long = "cert", env = "ATHENZ_CERT_FILE", default_value = "/var/run/athenz/service.cert.pem")]
    pub cert_file: PathBuf,

    /// CA bundle used to verify ZMS; defaults to the webpki roots
    #[arg(long = "ca-cert", env = "ATHENZ_CA_CERT_FILE")]
    pub ca_cert_file: Option<PathBuf>,

    /// Athenz ZMS API URL
    #[arg(long, env = "ZMS_URL")]
    pub zms_url: String,

    /// Interval between polls for domains modified in ZMS
    #[arg(long, env = "UPDATE_CRON", default_value = "1m0s", value_parser = parse_duration)]
    pub update_cron: Duration,

    /// Interval between full resyncs of every tracked namespace
    #[arg(long, env = "RESYNC_CRON", default_value = "1h0m0s", value_parser = parse_duration)]
    pub resync_cron: Duration,

    /// Base retry delay for the work queue
    #[arg(long, env = "QUEUE_DELAY_INTERVAL", default_value = "250ms", value_parser = parse_duration)]
    pub queue_delay_interval: Duration,

    /// Upper bound for the exponential retry delay
    #[arg(long, env = "MAX_BACKOFF", default_value = "1m0s", value_parser = parse_duration)]
    pub max_backoff: Duration,

    #[arg(long = "backoff", env = "BACKOFF_STRATEGY", value_enum, default_value_t = BackoffKind::Exponential)]
    pub backoff_kind: BackoffKind,

    /// Consecutive failed attempts after which a key is dropped until the next resync
    #[arg(long, env = "MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    #[arg(long, env = "CERT_RELOAD_INTERVAL", default_value = "5m0s", value_parser = parse_duration)]
    pub cert_reload_interval: Duration,

    /// Timeout for a single ZMS request
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub request_timeout: Duration,

    /// Number of concurrent reconcile workers
    #[arg(long, env = "WORKERS", default_value_t = 2)]
    pub workers: usize,

    /// Domain synced regardless of namespaces
    #[arg(long, env = "ADMIN_DOMAIN", default_value = "")]
    pub admin_domain: String,

    /// Comma separated list of namespaces excluded from sync
    #[arg(long, env = "SYSTEM_NAMESPACES", default_value = "")]
    pub system_namespaces: String,

    #[arg(long, env = "DISABLE_KEEP_ALIVES", default_value_t = true, action = ArgAction::Set)]
    pub disable_keep_alives: bool,

    /// Log file; logs go to stdout when unset
    #[arg(long, env = "LOG_LOCATION")]
    pub log_location: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_MODE", default_value = "info")]
    pub log_mode: String,

    /// Use the in-cluster service account instead of a kubeconfig file
    #[arg(long = "in-cluster-config", env = "IN_CLUSTER_CONFIG", default_value_t = true, action = ArgAction::Set)]
    pub in_cluster_config: bool,

    /// Kubeconfig used when running outside the cluster (defaults to ~/.kube/config)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,
}

impl Config {
    /// Check the values clap cannot validate on its own
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.zms_url)
            .map_err(|e| SyncerError::ConfigError(format!("invalid zms-url {}: {}", self.zms_url, e)))?;
        if self.workers == 0 {
            return Err(SyncerError::ConfigError("workers must be at least 1".to_string()));
        }
        if self.max_retries == 0 {
            return Err(SyncerError::ConfigError("max-retries must be at least 1".to_string()));
        }
        if self.resync_cron.is_zero() || self.update_cron.is_zero() {
            return Err(SyncerError::ConfigError(
                "update-cron and resync-cron must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn backoff(&self) -> BackoffStrategy {
        match self.backoff_kind {
            BackoffKind::Fixed => BackoffStrategy::Fixed {
                delay: self.queue_delay_interval,
            },
            BackoffKind::Exponential => BackoffStrategy::Exponential {
                base: self.queue_delay_interval,
                max: self.max_backoff,
            },
        }
    }

    pub fn key_mapper(&self) -> KeyMapper {
        let admin = Some(self.admin_domain.trim())
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        KeyMapper::new(admin, split_list(&self.system_namespaces))
    }

    pub fn reload_config(&self) -> ReloadConfig {
        ReloadConfig {
            key_file: self.key_file.clone(),
            cert_file: self.cert_file.clone(),
            interval: self.cert_reload_interval,
        }
    }

    pub fn zms_options(&self) -> ZmsClientOptions {
        ZmsClientOptions {
            timeout: self.request_timeout,
            disable_keep_alives: self.disable_keep_alives,
            ca_cert_file: self.ca_cert_file.clone(),
        }
    }

    /// Kubeconfig path for out-of-cluster runs
    pub fn kubeconfig_path(&self) -> Option<PathBuf> {
        self.kubeconfig.clone().or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".kube").join("config"))
        })
    }
}

fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a Go style duration such as `1h0m0s`, `250ms` or `1.5s`
pub fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let invalid = || format!("invalid duration {:?}", input);
    let mut nanos = 0f64;
    let mut rest = s;

    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return Err(invalid());
        }
        let (number, tail) = rest.split_at(num_len);
        let value: f64 = number.parse().map_err(|_| invalid())?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in duration {:?}", input)),
            other => return Err(format!("unknown unit {:?} in duration {:?}", other, input)),
        };

        nanos += value * scale;
        rest = tail;
    }

    Ok(Duration::from_nanos(nanos.round() as u64))
}
