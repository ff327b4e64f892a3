use serde::{Deserialize, Serialize};

use remedy_core::TenantId;

/// The kind of state being stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// A serialized remediation job record.
    Job,
    /// Claim on a `(resource, remediation type)` slot, valued with the owning job id.
    ActiveJob,
}

impl KeyKind {
    /// Return a string representation of the key kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Job => "job",
            Self::ActiveJob => "active_job",
        }
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key used to address state entries in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub namespace: String,
    pub tenant: TenantId,
    pub kind: KeyKind,
    pub id: String,
}

impl StateKey {
    /// Create a new state key.
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        tenant: impl Into<TenantId>,
        kind: KeyKind,
        id: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            tenant: tenant.into(),
            kind,
            id: id.into(),
        }
    }

    /// Return a canonical string representation: `namespace:tenant:kind:id`
    #[must_use]
    pub fn canonical(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.namespace, self.tenant, self.kind, self.id
        )
    }

    /// Prefix shared by every key of `kind` for one tenant:
    /// `namespace:tenant:kind:`.
    #[must_use]
    pub fn scan_prefix(namespace: &str, tenant: &str, kind: &KeyKind) -> String {
        format!("{namespace}:{tenant}:{kind}:")
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_kind_as_str() {
        assert_eq!(KeyKind::Job.as_str(), "job");
        assert_eq!(KeyKind::ActiveJob.as_str(), "active_job");
    }

    #[test]
    fn state_key_canonical() {
        let key = StateKey::new("remediation", "t", KeyKind::Job, "abc");
        assert_eq!(key.canonical(), "remediation:t:job:abc");
    }

    #[test]
    fn canonical_starts_with_scan_prefix() {
        let key = StateKey::new("ns", "t", KeyKind::ActiveJob, "bucket:TYPE");
        assert!(
            key.canonical()
                .starts_with(&StateKey::scan_prefix("ns", "t", &KeyKind::ActiveJob))
        );
    }
}
