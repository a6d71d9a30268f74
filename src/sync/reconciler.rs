// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-key reconciliation: bring the AthenzDomain object for a key in line with
//! the domain as ZMS serves it.

use crate::constants::{labels, OPERATOR_NAME};
use crate::error::{Result, SyncerError};
use crate::kubernetes::ClusterStore;
use crate::sync::queue::WorkQueue;
use crate::types::{AthenzDomain, DomainSnapshot, KeyMapper, ReconcileKey};
use crate::zms::DomainSource;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// What a single reconcile attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    Updated,
    Deleted,
    Unchanged,
    /// Failed with a retryable error and was scheduled again
    Requeued,
    /// Failed and will not be retried until the key is added again
    Dropped,
}

/// Write needed to converge the cluster object
#[derive(Debug)]
enum Plan {
    Create(AthenzDomain),
    Update(AthenzDomain),
    Noop,
}

pub struct Reconciler {
    store: Arc<dyn ClusterStore>,
    source: Arc<dyn DomainSource>,
    queue: Arc<WorkQueue<ReconcileKey>>,
    mapper: KeyMapper,
    max_retries: u32,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        source: Arc<dyn DomainSource>,
        queue: Arc<WorkQueue<ReconcileKey>>,
        mapper: KeyMapper,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            source,
            queue,
            mapper,
            max_retries,
        }
    }

    /// Process keys until the queue shuts down
    pub async fn run_worker(&self, id: usize) {
        debug!("Worker {} started", id);
        while self.process_next().await.is_some() {}
        debug!("Worker {} stopped", id);
    }

    /// Take one key off the queue and reconcile it. Returns `None` on shutdown.
    pub async fn process_next(&self) -> Option<ReconcileOutcome> {
        let key = self.queue.get().await?;
        let outcome = match self.reconcile(&key).await {
            Ok(outcome) => {
                self.queue.forget(&key);
                outcome
            }
            Err(e) => self.handle_error(&key, e),
        };
        self.queue.done(&key);
        Some(outcome)
    }

    fn handle_error(&self, key: &ReconcileKey, err: SyncerError) -> ReconcileOutcome {
        if !err.is_retryable() {
            error!("Dropping {} after non-retryable error: {}", key, err);
            self.queue.forget(key);
            return ReconcileOutcome::Dropped;
        }

        let attempts = self.queue.num_requeues(key) + 1;
        if attempts >= self.max_retries {
            error!(
                "Dropping {} after {} failed attempts, last error: {}",
                key, attempts, err
            );
            self.queue.forget(key);
            return ReconcileOutcome::Dropped;
        }

        warn!(
            "Reconcile of {} failed (attempt {}/{}), requeueing: {}",
            key, attempts, self.max_retries, err
        );
        self.queue.add_rate_limited(key.clone());
        ReconcileOutcome::Requeued
    }

    /// Run the state machine once for a key
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn reconcile(&self, key: &ReconcileKey) -> Result<ReconcileOutcome> {
        if !self.mapper.is_admin_domain(&key.domain)
            && !self.store.namespace_exists(&key.namespace).await?
        {
            debug!("Namespace {} is gone", key.namespace);
            return self.remove(key).await;
        }

        let snapshot = match self.source.fetch_domain(&key.domain).await? {
            Some(snapshot) => snapshot,
            None => {
                debug!("Domain {} no longer exists in ZMS", key.domain);
                return self.remove(key).await;
            }
        };
        if snapshot.name() != key.domain {
            return Err(SyncerError::InvalidDomain(format!(
                "requested {} but received {}",
                key.domain,
                snapshot.name()
            )));
        }

        let existing = self.store.get_domain(&key.domain).await?;
        match plan(existing, &snapshot) {
            Plan::Create(domain) => {
                self.store.create_domain(&domain).await?;
                info!("Created AthenzDomain {}", key.domain);
                Ok(ReconcileOutcome::Created)
            }
            Plan::Update(domain) => {
                self.store.update_domain(&domain).await?;
                info!("Updated AthenzDomain {}", key.domain);
                Ok(ReconcileOutcome::Updated)
            }
            Plan::Noop => {
                debug!("AthenzDomain {} is up to date", key.domain);
                Ok(ReconcileOutcome::Unchanged)
            }
        }
    }

    async fn remove(&self, key: &ReconcileKey) -> Result<ReconcileOutcome> {
        match self.store.get_domain(&key.domain).await? {
            Some(existing) if !existing.is_managed() => {
                warn!(
                    "Leaving AthenzDomain {} in place, it is not managed by {}",
                    key.domain, OPERATOR_NAME
                );
                Ok(ReconcileOutcome::Unchanged)
            }
            Some(_) => {
                if self.store.delete_domain(&key.domain).await? {
                    info!("Deleted AthenzDomain {}", key.domain);
                    Ok(ReconcileOutcome::Deleted)
                } else {
                    Ok(ReconcileOutcome::Unchanged)
                }
            }
            None => Ok(ReconcileOutcome::Unchanged),
        }
    }
}

fn plan(existing: Option<AthenzDomain>, snapshot: &DomainSnapshot) -> Plan {
    match existing {
        // A domain without roles has nothing to publish
        None if snapshot.is_empty() => Plan::Noop,
        None => {
            let mut domain = AthenzDomain::new(snapshot.name(), snapshot.to_spec());
            domain.metadata.labels = Some(managed_labels());
            Plan::Create(domain)
        }
        Some(current) if snapshot.matches(&current.spec) && current.is_managed() => Plan::Noop,
        Some(mut current) => {
            // Keep metadata so the write is checked against the version we read
            current.spec = snapshot.to_spec();
            current
                .metadata
                .labels
                .get_or_insert_with(BTreeMap::new)
                .insert(labels::MANAGED_BY.to_string(), OPERATOR_NAME.to_string());
            Plan::Update(current)
        }
    }
}

fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(labels::MANAGED_BY.to_string(), OPERATOR_NAME.to_string())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::backoff::BackoffStrategy;
    use crate::test_utils::{FakeSource, FakeStore};
    use crate::zms::ZmsError;
    use std::time::Duration;

    struct Harness {
        store: Arc<FakeStore>,
        source: Arc<FakeSource>,
        queue: Arc<WorkQueue<ReconcileKey>>,
        reconciler: Reconciler,
    }

    fn harness(max_retries: u32) -> Harness {
        let store = Arc::new(FakeStore::new(["search", "media-sports"]));
        let source = Arc::new(FakeSource::new());
        let queue = Arc::new(WorkQueue::new(BackoffStrategy::Fixed {
            delay: Duration::from_millis(100),
        }));
        let mapper = KeyMapper::new(Some("k8s.admin".to_string()), vec!["kube-system".to_string()]);
        let reconciler = Reconciler::new(
            store.clone(),
            source.clone(),
            queue.clone(),
            mapper,
            max_retries,
        );
        Harness {
            store,
            source,
            queue,
            reconciler,
        }
    }

    fn search_key() -> ReconcileKey {
        ReconcileKey::new("search", "search")
    }

    fn search(writers: Vec<&str>) -> DomainSnapshot {
        DomainSnapshot::from_members("search", [("admin", vec!["alice"]), ("writer", writers)])
    }

    fn members(domain: &AthenzDomain, role: &str) -> Vec<String> {
        domain
            .spec
            .roles
            .iter()
            .find(|r| r.name == role)
            .map(|r| r.members.iter().map(|m| m.name.clone()).collect())
            .unwrap_or_default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_creates_domain_then_is_idempotent() {
        let h = harness(5);
        h.source.set_domain(search(vec!["bob", "carol"]));

        h.queue.add(search_key());
        assert_eq!(h.reconciler.process_next().await, Some(ReconcileOutcome::Created));

        let created = h.store.domain("search").unwrap();
        assert!(created.is_managed());
        assert_eq!(members(&created, "admin"), vec!["alice"]);
        assert_eq!(members(&created, "writer"), vec!["bob", "carol"]);

        h.queue.add(search_key());
        assert_eq!(h.reconciler.process_next().await, Some(ReconcileOutcome::Unchanged));
        assert_eq!(h.store.writes(), vec!["create search"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_membership_change_survives_version_conflict() {
        let h = harness(5);
        h.source.set_domain(search(vec!["bob", "carol"]));
        h.queue.add(search_key());
        h.reconciler.process_next().await;

        h.source.set_domain(search(vec!["bob"]));
        h.store.inject_conflicts(1);
        h.queue.add(search_key());
        assert_eq!(h.reconciler.process_next().await, Some(ReconcileOutcome::Requeued));
        assert_eq!(h.queue.num_requeues(&search_key()), 1);

        assert_eq!(h.reconciler.process_next().await, Some(ReconcileOutcome::Updated));
        assert_eq!(h.queue.num_requeues(&search_key()), 0);
        assert_eq!(
            h.store.writes(),
            vec!["create search", "update search", "update search"]
        );
        // Both attempts went back to ZMS
        assert_eq!(h.source.fetches(), vec!["search", "search", "search"]);
        assert_eq!(members(&h.store.domain("search").unwrap(), "writer"), vec!["bob"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_timeouts_drop_the_key() {
        let h = harness(3);
        h.source.set_domain(search(vec!["bob"]));
        h.source.fail_next([
            ZmsError::Status(504),
            ZmsError::Status(504),
            ZmsError::Status(504),
        ]);

        h.queue.add(search_key());
        assert_eq!(h.reconciler.process_next().await, Some(ReconcileOutcome::Requeued));
        assert_eq!(h.reconciler.process_next().await, Some(ReconcileOutcome::Requeued));
        assert_eq!(h.reconciler.process_next().await, Some(ReconcileOutcome::Dropped));

        assert_eq!(h.source.fetches().len(), 3);
        assert_eq!(h.queue.num_requeues(&search_key()), 0);
        assert!(
            tokio::time::timeout(Duration::from_secs(60), h.queue.get())
                .await
                .is_err(),
            "a dropped key stays out of the queue until it is added again"
        );
        assert!(h.store.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_credentials_are_retried() {
        let h = harness(5);
        h.source.set_domain(search(vec!["bob"]));
        h.source
            .fail_next([ZmsError::Status(401), ZmsError::Status(403), ZmsError::Status(429)]);

        h.queue.add(search_key());
        for _ in 0..3 {
            assert_eq!(h.reconciler.process_next().await, Some(ReconcileOutcome::Requeued));
        }
        assert_eq!(h.reconciler.process_next().await, Some(ReconcileOutcome::Created));
        assert_eq!(h.store.writes(), vec!["create search"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_is_dropped_immediately() {
        let h = harness(5);
        h.source.fail_next([ZmsError::Malformed("truncated".to_string())]);

        h.queue.add(search_key());
        assert_eq!(h.reconciler.process_next().await, Some(ReconcileOutcome::Dropped));
        assert_eq!(h.source.fetches().len(), 1);
        assert!(h.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_namespace_removes_domain() {
        let h = harness(5);
        h.source.set_domain(search(vec!["bob"]));
        h.queue.add(search_key());
        h.reconciler.process_next().await;

        h.store.remove_namespace("search");
        h.queue.add(search_key());
        assert_eq!(h.reconciler.process_next().await, Some(ReconcileOutcome::Deleted));
        assert!(h.store.domain("search").is_none());
        // No need to ask ZMS about a namespace that is gone
        assert_eq!(h.source.fetches().len(), 1);

        h.queue.add(search_key());
        assert_eq!(h.reconciler.process_next().await, Some(ReconcileOutcome::Unchanged));
    }

    #[tokio::test(start_paused = true)]
    async fn test_domain_gone_upstream_removes_domain() {
        let h = harness(5);
        h.source.set_domain(search(vec!["bob"]));
        h.queue.add(search_key());
        h.reconciler.process_next().await;

        h.source.remove_domain("search");
        h.queue.add(search_key());
        assert_eq!(h.reconciler.process_next().await, Some(ReconcileOutcome::Deleted));
        assert_eq!(h.store.writes(), vec!["create search", "delete search"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmanaged_object_is_not_deleted() {
        let h = harness(5);
        h.store
            .insert_domain(AthenzDomain::new("search", search(vec!["bob"]).to_spec()));

        h.queue.add(search_key());
        assert_eq!(h.reconciler.process_next().await, Some(ReconcileOutcome::Unchanged));
        assert!(h.store.domain("search").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_admin_domain_skips_namespace_check() {
        let h = harness(5);
        h.source.set_domain(DomainSnapshot::from_members(
            "k8s.admin",
            [("admin", vec!["root"])],
        ));

        h.queue.add(ReconcileKey::new("k8s-admin", "k8s.admin"));
        assert_eq!(h.reconciler.process_next().await, Some(ReconcileOutcome::Created));
        assert!(h.store.domain("k8s.admin").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_next_returns_none_after_shutdown() {
        let h = harness(5);
        h.queue.shut_down();
        assert_eq!(h.reconciler.process_next().await, None);
        h.reconciler.run_worker(0).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_domain_without_roles_is_not_created() {
        let h = harness(5);
        h.source.set_domain(DomainSnapshot::new("search", None, BTreeMap::new()));

        h.queue.add(search_key());
        assert_eq!(h.reconciler.process_next().await, Some(ReconcileOutcome::Unchanged));
        assert!(h.store.domain("search").is_none());
        assert!(h.store.writes().is_empty());
    }

    #[test]
    fn test_plan_update_clears_roles_of_existing_object() {
        let current = AthenzDomain::new("search", search(vec!["bob"]).to_spec());

        match plan(Some(current), &DomainSnapshot::new("search", None, BTreeMap::new())) {
            Plan::Update(domain) => assert!(domain.spec.roles.is_empty()),
            other => panic!("expected an update, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_update_keeps_resource_version() {
        let mut current = AthenzDomain::new("search", search(vec!["bob", "carol"]).to_spec());
        current.metadata.resource_version = Some("42".to_string());

        match plan(Some(current), &search(vec!["bob"])) {
            Plan::Update(domain) => {
                assert_eq!(domain.metadata.resource_version.as_deref(), Some("42"));
                assert!(domain.is_managed());
                assert_eq!(members(&domain, "writer"), vec!["bob"]);
            }
            other => panic!("expected an update, got {:?}", other),
        }
    }
}
