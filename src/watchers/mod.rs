// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Watchers that turn cluster change notifications into reconcile keys.

pub mod domain;
pub mod namespace;

pub use domain::DomainWatcher;
pub use namespace::NamespaceWatcher;

use crate::error::Result;
use crate::kubernetes::WatchEvent;
use crate::sync::queue::WorkQueue;
use crate::types::ReconcileKey;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Enqueue a key for every event until the stream ends or `cancel` fires.
/// Stream errors are logged; the underlying watcher recovers on its own.
async fn forward_events<F>(
    kind: &str,
    mut events: BoxStream<'static, Result<WatchEvent>>,
    queue: &WorkQueue<ReconcileKey>,
    cancel: &CancellationToken,
    to_key: F,
) where
    F: Fn(&str) -> Option<ReconcileKey>,
{
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.next() => event,
        };

        match event {
            Some(Ok(WatchEvent::Applied(name))) | Some(Ok(WatchEvent::Deleted(name))) => {
                match to_key(&name) {
                    Some(key) => {
                        debug!("{} {} changed, enqueueing {}", kind, name, key);
                        queue.add(key);
                    }
                    None => debug!("Ignoring {} {}", kind, name),
                }
            }
            Some(Err(e)) => warn!("{} watch error: {}", kind, e),
            None => {
                warn!("{} watch stream ended", kind);
                break;
            }
        }
    }
    debug!("{} watcher stopped", kind);
}
