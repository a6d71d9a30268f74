// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a mocked Kubernetes API, in-memory cluster store and domain
//! source, and generated credentials.

use crate::error::{Result as SyncResult, SyncerError};
use crate::kubernetes::{ClusterStore, WatchEvent};
use crate::types::{AthenzDomain, DomainSnapshot};
use crate::zms::{DomainSource, ModifiedDomains, ZmsError};
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::stream::BoxStream;
use futures::StreamExt;
use http::{Request, Response};
use kube::client::Body;
use kube::{Client, ResourceExt};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// A mock HTTP service that returns predefined responses based on request paths
/// and records every request it sees.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses.lock().unwrap().insert(
            (method.to_string(), path.to_string()),
            (status, body.to_string()),
        );
        self
    }

    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    pub fn on_post(self, path: &str, status: u16, body: &str) -> Self {
        self.on("POST", path, status, body)
    }

    pub fn on_put(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PUT", path, status, body)
    }

    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.on("DELETE", path, status, body)
    }

    /// Requests received so far as (method, path) pairs
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();

        if let Some(resp) = responses.get(&(method.to_string(), path.to_string())) {
            return Some(resp.clone());
        }

        // Longest prefix wins for paths like /api/v1/namespaces/foo
        responses
            .iter()
            .filter(|((m, p), _)| m == method && path.starts_with(p.as_str()))
            .max_by_key(|((_, p), _)| p.len())
            .map(|(_, resp)| resp.clone())
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        self.requests
            .lock()
            .unwrap()
            .push((method.clone(), path.clone()));
        let response = self.find_response(&method, &path);

        Box::pin(async move {
            let (status, body) =
                response.unwrap_or_else(|| (404, not_found_json("resource", &path)));
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a mock namespace JSON response
pub fn namespace_json(name: &str) -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "uid": "test-uid"
        }
    })
    .to_string()
}

/// Create a mock namespace list JSON response
pub fn namespace_list_json(names: &[&str]) -> String {
    let items: Vec<serde_json::Value> = names
        .iter()
        .map(|name| serde_json::json!({"metadata": {"name": name}}))
        .collect();
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "NamespaceList",
        "metadata": {"resourceVersion": "1"},
        "items": items
    })
    .to_string()
}

/// Serialize an AthenzDomain as the API server would return it
pub fn domain_json(domain: &AthenzDomain) -> String {
    serde_json::to_string(domain).unwrap()
}

/// Wrap AthenzDomains in a list response
pub fn domain_list_json(domains: &[AthenzDomain]) -> String {
    serde_json::json!({
        "apiVersion": "athenz.io/v1",
        "kind": "AthenzDomainList",
        "metadata": {"resourceVersion": "1"},
        "items": domains
    })
    .to_string()
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    status_json(404, "NotFound", &format!("{} \"{}\" not found", resource, name))
}

/// Create a 409 conflict response
pub fn conflict_json(resource: &str, name: &str) -> String {
    status_json(
        409,
        "Conflict",
        &format!(
            "Operation cannot be fulfilled on {} \"{}\": the object has been modified",
            resource, name
        ),
    )
}

fn status_json(code: u16, reason: &str, message: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
    .to_string()
}

/// Write a freshly generated self-signed key and certificate into `dir`,
/// returning (key path, cert path)
pub fn write_credentials(dir: &Path, common_name: &str) -> (PathBuf, PathBuf) {
    let key_pair = rcgen::KeyPair::generate().unwrap();
    let cert = rcgen::CertificateParams::new(vec![common_name.to_string()])
        .unwrap()
        .self_signed(&key_pair)
        .unwrap();

    let key_path = dir.join("service.key.pem");
    let cert_path = dir.join("service.cert.pem");
    std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();
    std::fs::write(&cert_path, cert.pem()).unwrap();
    (key_path, cert_path)
}

/// In-memory [`ClusterStore`] that records every write
pub struct FakeStore {
    namespaces: Mutex<BTreeSet<String>>,
    domains: Mutex<BTreeMap<String, AthenzDomain>>,
    writes: Mutex<Vec<String>>,
    conflicts: Mutex<u32>,
    list_failures: Mutex<u32>,
    next_version: Mutex<u64>,
    namespace_tx: UnboundedSender<SyncResult<WatchEvent>>,
    namespace_rx: Mutex<Option<UnboundedReceiver<SyncResult<WatchEvent>>>>,
    domain_tx: UnboundedSender<SyncResult<WatchEvent>>,
    domain_rx: Mutex<Option<UnboundedReceiver<SyncResult<WatchEvent>>>>,
}

impl FakeStore {
    pub fn new<I: IntoIterator<Item = &'static str>>(namespaces: I) -> Self {
        let (namespace_tx, namespace_rx) = unbounded();
        let (domain_tx, domain_rx) = unbounded();
        Self {
            namespaces: Mutex::new(namespaces.into_iter().map(str::to_string).collect()),
            domains: Mutex::new(BTreeMap::new()),
            writes: Mutex::new(Vec::new()),
            conflicts: Mutex::new(0),
            list_failures: Mutex::new(0),
            next_version: Mutex::new(1),
            namespace_tx,
            namespace_rx: Mutex::new(Some(namespace_rx)),
            domain_tx,
            domain_rx: Mutex::new(Some(domain_rx)),
        }
    }

    pub fn remove_namespace(&self, name: &str) {
        self.namespaces.lock().unwrap().remove(name);
    }

    /// Store an object directly, bypassing the write log
    pub fn insert_domain(&self, mut domain: AthenzDomain) {
        domain.metadata.resource_version = Some(self.bump_version());
        self.domains
            .lock()
            .unwrap()
            .insert(domain.name_any(), domain);
    }

    pub fn domain(&self, name: &str) -> Option<AthenzDomain> {
        self.domains.lock().unwrap().get(name).cloned()
    }

    /// Writes so far, as "create <name>", "update <name>" or "delete <name>"
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    /// Make the next `count` updates behave as if another writer got there first
    pub fn inject_conflicts(&self, count: u32) {
        *self.conflicts.lock().unwrap() = count;
    }

    /// Make the next `count` namespace listings fail with a server error
    pub fn fail_next_lists(&self, count: u32) {
        *self.list_failures.lock().unwrap() = count;
    }

    pub fn send_namespace_event(&self, event: SyncResult<WatchEvent>) {
        self.namespace_tx.unbounded_send(event).unwrap();
    }

    pub fn send_domain_event(&self, event: SyncResult<WatchEvent>) {
        self.domain_tx.unbounded_send(event).unwrap();
    }

    fn bump_version(&self) -> String {
        let mut version = self.next_version.lock().unwrap();
        let current = *version;
        *version += 1;
        current.to_string()
    }

    fn record(&self, write: String) {
        self.writes.lock().unwrap().push(write);
    }
}

fn take_stream(
    rx: &Mutex<Option<UnboundedReceiver<SyncResult<WatchEvent>>>>,
) -> BoxStream<'static, SyncResult<WatchEvent>> {
    match rx.lock().unwrap().take() {
        Some(rx) => rx.boxed(),
        None => futures::stream::pending().boxed(),
    }
}

#[async_trait]
impl ClusterStore for FakeStore {
    async fn namespace_exists(&self, name: &str) -> SyncResult<bool> {
        Ok(self.namespaces.lock().unwrap().contains(name))
    }

    async fn list_namespaces(&self) -> SyncResult<Vec<String>> {
        {
            let mut failures = self.list_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(SyncerError::KubeError(kube::Error::Api(
                    kube::error::ErrorResponse {
                        status: "Failure".to_string(),
                        message: "etcdserver: request timed out".to_string(),
                        reason: "InternalError".to_string(),
                        code: 500,
                    },
                )));
            }
        }
        Ok(self.namespaces.lock().unwrap().iter().cloned().collect())
    }

    async fn list_domains(&self) -> SyncResult<Vec<String>> {
        Ok(self.domains.lock().unwrap().keys().cloned().collect())
    }

    async fn get_domain(&self, name: &str) -> SyncResult<Option<AthenzDomain>> {
        Ok(self.domain(name))
    }

    async fn create_domain(&self, domain: &AthenzDomain) -> SyncResult<AthenzDomain> {
        let name = domain.name_any();
        if self.domains.lock().unwrap().contains_key(&name) {
            return Err(SyncerError::Conflict(name));
        }
        self.record(format!("create {}", name));
        self.insert_domain(domain.clone());
        Ok(self.domain(&name).unwrap())
    }

    async fn update_domain(&self, domain: &AthenzDomain) -> SyncResult<AthenzDomain> {
        let name = domain.name_any();
        self.record(format!("update {}", name));
        {
            let mut conflicts = self.conflicts.lock().unwrap();
            if *conflicts > 0 {
                *conflicts -= 1;
                // Someone else wrote in between
                let mut domains = self.domains.lock().unwrap();
                if let Some(current) = domains.get_mut(&name) {
                    current.metadata.resource_version = Some(self.bump_version());
                }
                return Err(SyncerError::Conflict(name));
            }
        }
        let current_version = self
            .domain(&name)
            .and_then(|d| d.metadata.resource_version);
        if current_version.is_none() || current_version != domain.metadata.resource_version {
            return Err(SyncerError::Conflict(name));
        }
        self.insert_domain(domain.clone());
        Ok(self.domain(&name).unwrap())
    }

    async fn delete_domain(&self, name: &str) -> SyncResult<bool> {
        let removed = self.domains.lock().unwrap().remove(name).is_some();
        if removed {
            self.record(format!("delete {}", name));
        }
        Ok(removed)
    }

    fn watch_namespaces(&self) -> BoxStream<'static, SyncResult<WatchEvent>> {
        take_stream(&self.namespace_rx)
    }

    fn watch_domains(&self) -> BoxStream<'static, SyncResult<WatchEvent>> {
        take_stream(&self.domain_rx)
    }
}

/// In-memory [`DomainSource`] with scriptable failures
#[derive(Default)]
pub struct FakeSource {
    domains: Mutex<HashMap<String, DomainSnapshot>>,
    failures: Mutex<VecDeque<ZmsError>>,
    fetches: Mutex<Vec<String>>,
    modified: Mutex<VecDeque<ModifiedDomains>>,
    polls: Mutex<Vec<Option<String>>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_domain(&self, snapshot: DomainSnapshot) {
        self.domains
            .lock()
            .unwrap()
            .insert(snapshot.name().to_string(), snapshot);
    }

    pub fn remove_domain(&self, name: &str) {
        self.domains.lock().unwrap().remove(name);
    }

    /// Fail the next fetches with the given errors, in order
    pub fn fail_next<I: IntoIterator<Item = ZmsError>>(&self, errors: I) {
        self.failures.lock().unwrap().extend(errors);
    }

    /// Names passed to `fetch_domain` so far
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    /// Queue a response for `list_modified_domains`
    pub fn push_modified(&self, modified: ModifiedDomains) {
        self.modified.lock().unwrap().push_back(modified);
    }

    /// ETags passed to `list_modified_domains` so far
    pub fn polls(&self) -> Vec<Option<String>> {
        self.polls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DomainSource for FakeSource {
    async fn fetch_domain(&self, name: &str) -> SyncResult<Option<DomainSnapshot>> {
        self.fetches.lock().unwrap().push(name.to_string());
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err.into());
        }
        Ok(self.domains.lock().unwrap().get(name).cloned())
    }

    async fn list_modified_domains(&self, etag: Option<&str>) -> SyncResult<ModifiedDomains> {
        self.polls.lock().unwrap().push(etag.map(str::to_string));
        let next = self.modified.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| ModifiedDomains {
            etag: etag.map(str::to_string),
            domains: Vec::new(),
        }))
    }
}
