// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster object store access: namespaces and AthenzDomain resources.

use crate::constants::OPERATOR_NAME;
use crate::error::{Result, SyncerError};
use crate::types::AthenzDomain;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{future, StreamExt};
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    api::{DeleteParams, ListParams, PostParams},
    Api, Client, Resource, ResourceExt,
};
use kube_runtime::watcher;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::{debug, instrument};

/// Name-level change notification from a watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Applied(String),
    Deleted(String),
}

/// Everything the syncer needs from the cluster
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn namespace_exists(&self, name: &str) -> Result<bool>;

    async fn list_namespaces(&self) -> Result<Vec<String>>;

    /// Names of every AthenzDomain in the cluster
    async fn list_domains(&self) -> Result<Vec<String>>;

    async fn get_domain(&self, name: &str) -> Result<Option<AthenzDomain>>;

    async fn create_domain(&self, domain: &AthenzDomain) -> Result<AthenzDomain>;

    /// Replace an existing domain. The object's resource version is checked by the
    /// API server; a mismatch yields [`SyncerError::Conflict`].
    async fn update_domain(&self, domain: &AthenzDomain) -> Result<AthenzDomain>;

    /// Returns false when there was nothing to delete
    async fn delete_domain(&self, name: &str) -> Result<bool>;

    fn watch_namespaces(&self) -> BoxStream<'static, Result<WatchEvent>>;

    fn watch_domains(&self) -> BoxStream<'static, Result<WatchEvent>>;
}

/// [`ClusterStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }

    fn domains(&self) -> Api<AthenzDomain> {
        Api::all(self.client.clone())
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        }
    }
}

fn conflict_or(name: &str, err: kube::Error) -> SyncerError {
    match err {
        kube::Error::Api(resp) if resp.code == 409 => SyncerError::Conflict(name.to_string()),
        other => SyncerError::KubeError(other),
    }
}

fn watch_names<K>(api: Api<K>) -> BoxStream<'static, Result<WatchEvent>>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
{
    watcher(api, watcher::Config::default())
        .filter_map(|event| {
            future::ready(match event {
                Ok(event) => to_watch_event(event).map(Ok),
                Err(e) => Some(Err(SyncerError::WatchError(e.to_string()))),
            })
        })
        .boxed()
}

fn to_watch_event<K: Resource>(event: watcher::Event<K>) -> Option<WatchEvent> {
    match event {
        watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => {
            Some(WatchEvent::Applied(obj.name_any()))
        }
        watcher::Event::Delete(obj) => Some(WatchEvent::Deleted(obj.name_any())),
        watcher::Event::Init | watcher::Event::InitDone => None,
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    #[instrument(skip(self))]
    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        Ok(self.namespaces().get_opt(name).await?.is_some())
    }

    #[instrument(skip(self))]
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let list = self.namespaces().list(&ListParams::default()).await?;
        Ok(list.items.iter().map(|ns| ns.name_any()).collect())
    }

    #[instrument(skip(self))]
    async fn list_domains(&self) -> Result<Vec<String>> {
        let list = self.domains().list(&ListParams::default()).await?;
        Ok(list.items.iter().map(|d| d.name_any()).collect())
    }

    #[instrument(skip(self))]
    async fn get_domain(&self, name: &str) -> Result<Option<AthenzDomain>> {
        Ok(self.domains().get_opt(name).await?)
    }

    #[instrument(skip(self, domain), fields(domain = %domain.name_any()))]
    async fn create_domain(&self, domain: &AthenzDomain) -> Result<AthenzDomain> {
        let name = domain.name_any();
        let created = self
            .domains()
            .create(&Self::post_params(), domain)
            .await
            .map_err(|e| conflict_or(&name, e))?;
        debug!("Created AthenzDomain {}", name);
        Ok(created)
    }

    #[instrument(skip(self, domain), fields(domain = %domain.name_any()))]
    async fn update_domain(&self, domain: &AthenzDomain) -> Result<AthenzDomain> {
        let name = domain.name_any();
        if domain.metadata.resource_version.is_none() {
            return Err(SyncerError::InvalidDomain(format!(
                "refusing to update AthenzDomain {} without a resource version",
                name
            )));
        }
        let updated = self
            .domains()
            .replace(&name, &Self::post_params(), domain)
            .await
            .map_err(|e| conflict_or(&name, e))?;
        debug!("Updated AthenzDomain {}", name);
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn delete_domain(&self, name: &str) -> Result<bool> {
        match self.domains().delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                debug!("Deleted AthenzDomain {}", name);
                Ok(true)
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn watch_namespaces(&self) -> BoxStream<'static, Result<WatchEvent>> {
        watch_names(self.namespaces())
    }

    fn watch_domains(&self) -> BoxStream<'static, Result<WatchEvent>> {
        watch_names(self.domains())
    }
}
