// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{labels, OPERATOR_NAME};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Cluster copy of one Athenz domain's roles and members.
///
/// Cluster scoped; the object name is the domain name.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[kube(group = "athenz.io", version = "v1", kind = "AthenzDomain")]
#[kube(shortname = "athenzdomain")]
#[kube(printcolumn = r#"{"name":"Modified","type":"string","jsonPath":".spec.modified"}"#)]
#[serde(rename_all = "camelCase")]
pub struct AthenzDomainSpec {
    pub domain: String,
    /// Last modification time reported by ZMS
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub name: String,
    /// Domain the role is delegated to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust: Option<String>,
    #[serde(default)]
    pub members: Vec<RoleMember>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleMember {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
}

impl AthenzDomain {
    /// Whether this object was created by the syncer
    pub fn is_managed(&self) -> bool {
        self.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(labels::MANAGED_BY))
            .is_some_and(|v| v == OPERATOR_NAME)
    }
}
