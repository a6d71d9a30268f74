// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery, client creation, and the cluster object store.

pub mod client;
pub mod crd;
pub mod store;

pub use client::create_cluster_client;
pub use crd::wait_for_domain_crd;
pub use store::{ClusterStore, KubeStore, WatchEvent};
