// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Periodic producers: the full resync and the ZMS update poll.

use crate::error::Result;
use crate::kubernetes::ClusterStore;
use crate::sync::queue::WorkQueue;
use crate::types::{KeyMapper, ReconcileKey};
use crate::zms::DomainSource;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Wait for the next tick or cancellation. Returns false when cancelled.
async fn next_tick(ticker: &mut tokio::time::Interval, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = ticker.tick() => true,
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    // The initial watch list already enqueues everything, so skip the immediate tick
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Re-enqueues every tracked key on a fixed period to correct drift
pub struct ResyncTicker {
    store: Arc<dyn ClusterStore>,
    queue: Arc<WorkQueue<ReconcileKey>>,
    mapper: KeyMapper,
    period: Duration,
}

impl ResyncTicker {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        queue: Arc<WorkQueue<ReconcileKey>>,
        mapper: KeyMapper,
        period: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            mapper,
            period,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!("Resync every {:?}", self.period);
        let mut ticker = ticker(self.period);
        while next_tick(&mut ticker, &cancel).await {
            match self.resync_once().await {
                Ok(count) => info!("Resync enqueued {} keys", count),
                Err(e) => warn!("Resync failed, will try again next period: {}", e),
            }
        }
        debug!("Resync ticker stopped");
    }

    /// Enqueue every tracked namespace, every existing AthenzDomain and the admin
    /// domain. Returns the number of keys.
    pub async fn resync_once(&self) -> Result<usize> {
        let mut keys: BTreeSet<ReconcileKey> = self
            .store
            .list_namespaces()
            .await?
            .iter()
            .filter_map(|ns| self.mapper.key_for_namespace(ns))
            .collect();
        // Objects whose namespace is gone are removed by their reconcile
        for name in self.store.list_domains().await? {
            keys.extend(self.mapper.key_for_domain(&name));
        }
        keys.extend(self.mapper.admin_key());

        let count = keys.len();
        for key in keys {
            self.queue.add(key);
        }
        Ok(count)
    }
}

/// Asks ZMS for domains modified since the last poll and enqueues the tracked ones
pub struct UpdatePoller {
    store: Arc<dyn ClusterStore>,
    source: Arc<dyn DomainSource>,
    queue: Arc<WorkQueue<ReconcileKey>>,
    mapper: KeyMapper,
    period: Duration,
    etag: Option<String>,
}

impl UpdatePoller {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        source: Arc<dyn DomainSource>,
        queue: Arc<WorkQueue<ReconcileKey>>,
        mapper: KeyMapper,
        period: Duration,
    ) -> Self {
        Self {
            store,
            source,
            queue,
            mapper,
            period,
            etag: None,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Polling ZMS for modified domains every {:?}", self.period);
        let mut ticker = ticker(self.period);
        while next_tick(&mut ticker, &cancel).await {
            match self.poll_once().await {
                Ok(0) => {}
                Ok(count) => info!("{} modified domains enqueued", count),
                Err(e) => warn!("Polling modified domains failed: {}", e),
            }
        }
        debug!("Update poller stopped");
    }

    /// One poll. Returns the number of keys enqueued.
    ///
    /// The ETag only advances once every modified domain has been enqueued, so a
    /// failed poll asks ZMS for the same changes again.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let modified = self
            .source
            .list_modified_domains(self.etag.as_deref())
            .await?;
        if modified.domains.is_empty() {
            self.advance_etag(modified.etag);
            return Ok(0);
        }

        let namespaces: HashSet<String> = self.store.list_namespaces().await?.into_iter().collect();
        let mut count = 0;
        for domain in &modified.domains {
            let Some(key) = self.mapper.key_for_domain(domain) else {
                continue;
            };
            if self.mapper.is_admin_domain(domain) || namespaces.contains(&key.namespace) {
                debug!("Domain {} was modified", domain);
                self.queue.add(key);
                count += 1;
            }
        }
        self.advance_etag(modified.etag);
        Ok(count)
    }

    fn advance_etag(&mut self, etag: Option<String>) {
        if etag.is_some() {
            self.etag = etag;
        }
    }
}
