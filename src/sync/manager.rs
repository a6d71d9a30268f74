// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Central coordinator: starts the producers, the workers and the credential
//! reloader, and stops them together.

use crate::config::Config;
use crate::kubernetes::ClusterStore;
use crate::sync::queue::WorkQueue;
use crate::sync::reconciler::Reconciler;
use crate::sync::resync::{ResyncTicker, UpdatePoller};
use crate::types::{KeyMapper, ReconcileKey};
use crate::watchers::{DomainWatcher, NamespaceWatcher};
use crate::zms::{CertReloader, DomainSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Tunables for the sync loop
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub workers: usize,
    pub max_retries: u32,
    pub resync_interval: Duration,
    pub update_interval: Duration,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.workers,
            max_retries: config.max_retries,
            resync_interval: config.resync_cron,
            update_interval: config.update_cron,
        }
    }
}

pub struct SyncManager {
    store: Arc<dyn ClusterStore>,
    source: Arc<dyn DomainSource>,
    reloader: Option<Arc<CertReloader>>,
    queue: Arc<WorkQueue<ReconcileKey>>,
    mapper: KeyMapper,
    settings: SyncSettings,
}

impl SyncManager {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        source: Arc<dyn DomainSource>,
        queue: Arc<WorkQueue<ReconcileKey>>,
        mapper: KeyMapper,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            source,
            reloader: None,
            queue,
            mapper,
            settings,
        }
    }

    /// Reload the client certificate alongside the sync loop
    pub fn with_reloader(mut self, reloader: Arc<CertReloader>) -> Self {
        self.reloader = Some(reloader);
        self
    }

    /// Run until `cancel` fires, then shut the queue down and wait for every task.
    /// Workers finish the key they are processing before exiting.
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut tasks = JoinSet::new();

        tasks.spawn(
            NamespaceWatcher::new(self.store.clone(), self.queue.clone(), self.mapper.clone())
                .run(cancel.clone()),
        );
        tasks.spawn(
            DomainWatcher::new(self.store.clone(), self.queue.clone(), self.mapper.clone())
                .run(cancel.clone()),
        );
        tasks.spawn(
            ResyncTicker::new(
                self.store.clone(),
                self.queue.clone(),
                self.mapper.clone(),
                self.settings.resync_interval,
            )
            .run(cancel.clone()),
        );
        tasks.spawn(
            UpdatePoller::new(
                self.store.clone(),
                self.source.clone(),
                self.queue.clone(),
                self.mapper.clone(),
                self.settings.update_interval,
            )
            .run(cancel.clone()),
        );
        if let Some(reloader) = self.reloader.clone() {
            tasks.spawn(reloader.run(cancel.clone()));
        }

        // The admin domain has no namespace to be discovered through
        if let Some(key) = self.mapper.admin_key() {
            self.queue.add(key);
        }

        let reconciler = Arc::new(Reconciler::new(
            self.store.clone(),
            self.source.clone(),
            self.queue.clone(),
            self.mapper.clone(),
            self.settings.max_retries,
        ));
        for id in 0..self.settings.workers {
            let reconciler = reconciler.clone();
            tasks.spawn(async move { reconciler.run_worker(id).await });
        }
        info!("SyncManager started with {} workers", self.settings.workers);

        cancel.cancelled().await;
        info!("Shutting down, waiting for in-flight work");
        self.queue.shut_down();

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Sync task failed: {}", e);
            }
        }
        info!("SyncManager stopped");
        Ok(())
    }
}
