// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Namespace watcher - every namespace maps to the domain of the same name.

use super::forward_events;
use crate::kubernetes::ClusterStore;
use crate::sync::queue::WorkQueue;
use crate::types::{KeyMapper, ReconcileKey};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct NamespaceWatcher {
    store: Arc<dyn ClusterStore>,
    queue: Arc<WorkQueue<ReconcileKey>>,
    mapper: KeyMapper,
}

impl NamespaceWatcher {
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
        info!("Watching namespaces");
        let events = self.store.watch_namespaces();
        forward_events("Namespace", events, &self.queue, &cancel, |name| {
            self.mapper.key_for_namespace(name)
        })
        .await;
    }
}
