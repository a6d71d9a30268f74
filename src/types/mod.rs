// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resource, snapshot and key types.

pub mod domain;
pub mod key;
pub mod snapshot;

pub use domain::{AthenzDomain, AthenzDomainSpec};
pub use key::{KeyMapper, ReconcileKey};
pub use snapshot::{DomainSnapshot, RoleState};
