// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Kubernetes labels used by the syncer
pub mod labels {
    /// Set on every AthenzDomain the syncer creates
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
}

/// The operator name, used as field manager and managed-by label value
pub const OPERATOR_NAME: &str = "athenz-syncer";

/// AthenzDomain CRD coordinates
pub mod crd {
    pub const GROUP: &str = "athenz.io";
    pub const VERSION: &str = "v1";
    pub const KIND: &str = "AthenzDomain";
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

/// ZMS REST paths and headers
pub mod zms {
    pub const MODIFIED_DOMAINS_PATH: &str = "sys/modified_domains";
    pub const IF_NONE_MATCH: &str = "If-None-Match";
    pub const ETAG: &str = "ETag";
}
