// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Subset of the ZMS signed domain document the syncer reads.

use crate::error::{Result, SyncerError};
use crate::types::{DomainSnapshot, RoleState};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SignedDomains {
    #[serde(default)]
    pub domains: Vec<SignedDomain>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SignedDomain {
    pub domain: DomainData,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub key_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DomainData {
    pub name: String,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub roles: Option<Vec<ZmsRole>>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ZmsRole {
    pub name: String,
    #[serde(default)]
    pub trust: Option<String>,
    /// Legacy flat member list
    #[serde(default)]
    pub members: Option<Vec<String>>,
    #[serde(default)]
    pub role_members: Option<Vec<ZmsRoleMember>>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ZmsRoleMember {
    pub member_name: String,
    #[serde(default)]
    pub expiration: Option<String>,
}

impl DomainData {
    /// Validate and convert into a snapshot
    pub fn into_snapshot(self) -> Result<DomainSnapshot> {
        if self.name.trim().is_empty() {
            return Err(SyncerError::InvalidDomain("domain without a name".to_string()));
        }

        let mut roles: BTreeMap<String, RoleState> = BTreeMap::new();
        for role in self.roles.unwrap_or_default() {
            if role.name.trim().is_empty() {
                return Err(SyncerError::InvalidDomain(format!(
                    "domain {} has a role without a name",
                    self.name
                )));
            }

            let state = roles.entry(role.name.clone()).or_default();
            state.trust = role.trust.filter(|t| !t.is_empty());

            let legacy = role
                .members
                .unwrap_or_default()
                .into_iter()
                .map(|name| (name, None));
            let detailed = role
                .role_members
                .unwrap_or_default()
                .into_iter()
                .map(|m| (m.member_name, m.expiration));

            for (member, expiration) in legacy.chain(detailed) {
                if member.trim().is_empty() {
                    return Err(SyncerError::InvalidDomain(format!(
                        "role {} in domain {} has a member without a name",
                        role.name, self.name
                    )));
                }
                state.members.insert(member, expiration);
            }
        }

        Ok(DomainSnapshot::new(self.name, self.modified, roles))
    }
}
