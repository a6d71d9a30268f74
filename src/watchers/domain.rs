// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! AthenzDomain watcher, so manual edits or deletions of the cluster copy get reverted.

use super::forward_events;
use crate::kubernetes::ClusterStore;
use crate::sync::queue::WorkQueue;
use crate::types::{KeyMapper, ReconcileKey};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct DomainWatcher {
    store: Arc<dyn ClusterStore>,
    queue: Arc<WorkQueue<ReconcileKey>>,
    mapper: KeyMapper,
}

impl DomainWatcher {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        queue: Arc<WorkQueue<ReconcileKey>>,
        mapper: KeyMapper,
    ) -> Self {
        Self {
            store,
            queue,
            mapper,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!("Watching AthenzDomains");
        let events = self.store.watch_domains();
        forward_events("AthenzDomain", events, &self.queue, &cancel, |name| {
            self.mapper.key_for_domain(name)
        })
        .await;
    }
}
