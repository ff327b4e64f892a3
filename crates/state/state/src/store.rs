use async_trait::async_trait;

use crate::error::StateError;
use crate::key::{KeyKind, StateKey};

/// Result of a compare-and-swap operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResult {
    /// The swap succeeded and the new version is stored.
    Ok,
    /// The swap failed because the current version didn't match.
    Conflict {
        current_value: Option<String>,
        current_version: u64,
    },
}

/// A stored value together with its version counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub value: String,
    /// Starts at 1 on creation and increases on every write.
    pub version: u64,
}

/// Trait for persisting engine state.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Check if a key exists; if not, set it atomically.
    /// Returns `true` if the key was newly set, `false` if it already existed.
    async fn check_and_set(&self, key: &StateKey, value: &str) -> Result<bool, StateError>;

    /// Get the value for a key. Returns `None` if not found.
    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        Ok(self.get_versioned(key).await?.map(|v| v.value))
    }

    /// Get the value and its current version.
    async fn get_versioned(&self, key: &StateKey) -> Result<Option<Versioned>, StateError>;

    /// Set a value, overwriting any previous value.
    async fn set(&self, key: &StateKey, value: &str) -> Result<(), StateError>;

    /// Delete a key. Returns `true` if the key existed.
    async fn delete(&self, key: &StateKey) -> Result<bool, StateError>;

    /// Delete a key only while it is still at `expected_version`.
    ///
    /// Returns `true` if the key was removed, `false` if it is missing or has
    /// been written since that version was read.
    async fn delete_if_version(
        &self,
        key: &StateKey,
        expected_version: u64,
    ) -> Result<bool, StateError>;

    /// Compare-and-swap: update value only if the current version matches.
    ///
    /// An `expected_version` of 0 means "create": it succeeds only when the
    /// key does not exist yet.
    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
    ) -> Result<CasResult, StateError>;

    /// Scan keys for one namespace, tenant, and kind.
    ///
    /// Returns `(canonical key, value)` pairs. `prefix` further restricts the
    /// id segment to ids starting with the given string.
    ///
    /// This operation may be expensive on some backends. Use sparingly.
    async fn scan_keys(
        &self,
        namespace: &str,
        tenant: &str,
        kind: KeyKind,
        prefix: Option<&str>,
    ) -> Result<Vec<(String, String)>, StateError>;
}
