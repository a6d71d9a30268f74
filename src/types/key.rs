// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reconcile keys and the namespace <-> domain name mapping.

use std::collections::HashSet;
use std::fmt;

/// Identifies one unit of reconcile work: a namespace and the Athenz domain it mirrors
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReconcileKey {
    pub namespace: String,
    pub domain: String,
}

impl ReconcileKey {
    pub fn new(namespace: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            domain: domain.into(),
        }
    }
}

impl fmt::Display for ReconcileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.domain)
    }
}

/// Convert a namespace name to its Athenz domain name.
///
/// A double dash stands for a literal dash, every other dash for a dot:
/// `foo-bar--baz` becomes `foo.bar-baz`.
pub fn namespace_to_domain(namespace: &str) -> String {
    let mut domain = String::with_capacity(namespace.len());
    let mut chars = namespace.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '-' {
            if chars.peek() == Some(&'-') {
                chars.next();
                domain.push('-');
            } else {
                domain.push('.');
            }
        } else {
            domain.push(c);
        }
    }
    domain
}

/// Inverse of [`namespace_to_domain`]
pub fn domain_to_namespace(domain: &str) -> String {
    domain.replace('-', "--").replace('.', "-")
}

/// Derives reconcile keys and knows which namespaces and domains are special
#[derive(Debug, Clone, Default)]
pub struct KeyMapper {
    admin_domain: Option<String>,
    system_namespaces: HashSet<String>,
}

impl KeyMapper {
    pub fn new(admin_domain: Option<String>, system_namespaces: Vec<String>) -> Self {
        Self {
            admin_domain,
            system_namespaces: system_namespaces.into_iter().collect(),
        }
    }

    pub fn admin_domain(&self) -> Option<&str> {
        self.admin_domain.as_deref()
    }

    pub fn is_system_namespace(&self, namespace: &str) -> bool {
        self.system_namespaces.contains(namespace)
    }

    pub fn is_admin_domain(&self, domain: &str) -> bool {
        self.admin_domain.as_deref() == Some(domain)
    }

    /// Key for a namespace, or `None` when the namespace is excluded from sync
    pub fn key_for_namespace(&self, namespace: &str) -> Option<ReconcileKey> {
        if namespace.is_empty() || self.is_system_namespace(namespace) {
            return None;
        }
        Some(ReconcileKey::new(namespace, namespace_to_domain(namespace)))
    }

    /// Key for a domain name, or `None` when its namespace is excluded from sync
    pub fn key_for_domain(&self, domain: &str) -> Option<ReconcileKey> {
        if domain.is_empty() {
            return None;
        }
        let namespace = domain_to_namespace(domain);
        if !self.is_admin_domain(domain) && self.is_system_namespace(&namespace) {
            return None;
        }
        Some(ReconcileKey::new(namespace, domain))
    }

    pub fn admin_key(&self) -> Option<ReconcileKey> {
        self.admin_domain
            .as_deref()
            .map(|d| ReconcileKey::new(domain_to_namespace(d), d))
    }
}
