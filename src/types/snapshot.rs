// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Point-in-time view of a domain as served by ZMS.

use crate::types::domain::{AthenzDomainSpec, Role, RoleMember};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Role contents: optional delegation and members keyed by identity (value is the expiration)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleState {
    pub trust: Option<String>,
    pub members: BTreeMap<String, Option<String>>,
}

/// Immutable snapshot of one domain. Equality ignores the fetch time.
#[derive(Debug, Clone)]
pub struct DomainSnapshot {
    name: String,
    modified: Option<String>,
    roles: BTreeMap<String, RoleState>,
    fetched_at: DateTime<Utc>,
}

impl DomainSnapshot {
    pub fn new(
        name: impl Into<String>,
        modified: Option<String>,
        roles: BTreeMap<String, RoleState>,
    ) -> Self {
        Self {
            name: name.into(),
            modified,
            roles,
            fetched_at: Utc::now(),
        }
    }

    /// Snapshot with plain member lists and no delegation or expirations
    pub fn from_members<R, M, S>(name: &str, roles: R) -> Self
    where
        R: IntoIterator<Item = (S, M)>,
        M: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles = roles
            .into_iter()
            .map(|(role, members)| {
                let state = RoleState {
                    trust: None,
                    members: members.into_iter().map(|m| (m.into(), None)).collect(),
                };
                (role.into(), state)
            })
            .collect();
        Self::new(name, None, roles)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modified(&self) -> Option<&str> {
        self.modified.as_deref()
    }

    pub fn roles(&self) -> &BTreeMap<String, RoleState> {
        &self.roles
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Render as an AthenzDomain spec with roles and members in sorted order
    pub fn to_spec(&self) -> AthenzDomainSpec {
        AthenzDomainSpec {
            domain: self.name.clone(),
            modified: self.modified.clone(),
            roles: self
                .roles
                .iter()
                .map(|(name, state)| Role {
                    name: name.clone(),
                    trust: state.trust.clone(),
                    members: state
                        .members
                        .iter()
                        .map(|(member, expiration)| RoleMember {
                            name: member.clone(),
                            expiration: expiration.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// Whether an existing spec already carries this snapshot's roles and members,
    /// regardless of order. The `modified` timestamp is not compared: it moves on
    /// any domain change, including ones that never reach the spec.
    pub fn matches(&self, spec: &AthenzDomainSpec) -> bool {
        spec.domain == self.name && roles_of(spec) == self.roles
    }
}

impl PartialEq for DomainSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.modified == other.modified && self.roles == other.roles
    }
}

impl Eq for DomainSnapshot {}

fn roles_of(spec: &AthenzDomainSpec) -> BTreeMap<String, RoleState> {
    let mut roles: BTreeMap<String, RoleState> = BTreeMap::new();
    for role in &spec.roles {
        let state = roles.entry(role.name.clone()).or_default();
        state.trust = role.trust.clone();
        state.members.extend(
            role.members
                .iter()
                .map(|m| (m.name.clone(), m.expiration.clone())),
        );
    }
    roles
}
