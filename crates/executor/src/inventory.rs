use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};

use remedy_core::RemediationRequest;

use crate::error::ExecutorError;

/// Identity of one cloud resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub account_id: String,
    pub region: String,
    pub resource_type: String,
    pub resource_id: String,
}

impl ResourceRef {
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        region: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }

    /// The resource a remediation request targets.
    #[must_use]
    pub fn from_request(request: &RemediationRequest) -> Self {
        Self::new(
            request.account_id.clone(),
            request.region.clone(),
            request.resource_type.clone(),
            request.resource_id.clone(),
        )
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.account_id, self.region, self.resource_type, self.resource_id
        )
    }
}

/// Live metadata of a resource as reported by the cloud inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub resource: ResourceRef,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Configuration attributes the executors read and write.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Resources that depend on this one (fan-in).
    #[serde(default)]
    pub dependents: Vec<String>,
}

impl ResourceSnapshot {
    #[must_use]
    pub fn new(resource: ResourceRef) -> Self {
        Self {
            resource,
            tags: BTreeMap::new(),
            attributes: BTreeMap::new(),
            dependents: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_dependent(mut self, dependent: impl Into<String>) -> Self {
        self.dependents.push(dependent.into());
        self
    }

    /// Tag value looked up case-insensitively by key.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}

/// Read and write access to live cloud resource state.
///
/// Guardrails and the impact estimator only call [`describe`](Self::describe);
/// executors use the write methods.
#[async_trait]
pub trait ResourceInventory: Send + Sync {
    /// Fetch the current snapshot. `None` if the resource does not exist.
    async fn describe(&self, resource: &ResourceRef)
    -> Result<Option<ResourceSnapshot>, ExecutorError>;

    /// Set one attribute to `value`.
    async fn put_attribute(
        &self,
        resource: &ResourceRef,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), ExecutorError>;

    /// Remove one attribute, returning its previous value.
    async fn remove_attribute(
        &self,
        resource: &ResourceRef,
        name: &str,
    ) -> Result<Option<serde_json::Value>, ExecutorError>;
}

/// In-process [`ResourceInventory`] for tests and local runs.
///
/// Supports failure injection: transient connection errors for the next
/// `n` calls, permanently failing writes per attribute, and failing reads.
#[derive(Debug, Default)]
pub struct MemoryInventory {
    resources: DashMap<ResourceRef, ResourceSnapshot>,
    transient_failures: AtomicU32,
    failing_attributes: DashSet<String>,
    fail_describe: AtomicBool,
    writes: AtomicU64,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a resource.
    pub fn insert(&self, snapshot: ResourceSnapshot) {
        self.resources.insert(snapshot.resource.clone(), snapshot);
    }

    /// Current snapshot, read synchronously.
    pub fn get(&self, resource: &ResourceRef) -> Option<ResourceSnapshot> {
        self.resources.get(resource).map(|r| r.value().clone())
    }

    /// Fail the next `n` calls of any kind with a retryable connection error.
    pub fn fail_next(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    /// Make every write to `attribute` fail with a non-retryable error.
    pub fn fail_writes_to(&self, attribute: impl Into<String>) {
        self.failing_attributes.insert(attribute.into());
    }

    /// Stop failing writes to `attribute`.
    pub fn clear_write_failure(&self, attribute: &str) {
        self.failing_attributes.remove(attribute);
    }

    /// Make `describe` fail with a retryable connection error.
    pub fn set_fail_describe(&self, fail: bool) {
        self.fail_describe.store(fail, Ordering::SeqCst);
    }

    /// Number of successful attribute mutations.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn take_transient_failure(&self) -> Result<(), ExecutorError> {
        let consumed = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if consumed.is_ok() {
            return Err(ExecutorError::Connection("injected transient failure".into()));
        }
        Ok(())
    }

    fn check_write(&self, name: &str) -> Result<(), ExecutorError> {
        self.take_transient_failure()?;
        if self.failing_attributes.contains(name) {
            return Err(ExecutorError::ExecutionFailed(format!(
                "write to {name} rejected"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceInventory for MemoryInventory {
    async fn describe(
        &self,
        resource: &ResourceRef,
    ) -> Result<Option<ResourceSnapshot>, ExecutorError> {
        self.take_transient_failure()?;
        if self.fail_describe.load(Ordering::SeqCst) {
            return Err(ExecutorError::Connection("inventory unavailable".into()));
        }
        Ok(self.get(resource))
    }

    async fn put_attribute(
        &self,
        resource: &ResourceRef,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), ExecutorError> {
        self.check_write(name)?;
        let mut entry = self
            .resources
            .get_mut(resource)
            .ok_or_else(|| ExecutorError::ResourceNotFound(resource.to_string()))?;
        entry.attributes.insert(name.to_owned(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_attribute(
        &self,
        resource: &ResourceRef,
        name: &str,
    ) -> Result<Option<serde_json::Value>, ExecutorError> {
        self.check_write(name)?;
        let mut entry = self
            .resources
            .get_mut(resource)
            .ok_or_else(|| ExecutorError::ResourceNotFound(resource.to_string()))?;
        let previous = entry.attributes.remove(name);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn bucket() -> ResourceRef {
        ResourceRef::new("123", "us-east-1", "S3_BUCKET", "logs")
    }

    #[tokio::test]
    async fn describe_missing_is_none() {
        let inventory = MemoryInventory::new();
        assert!(inventory.describe(&bucket()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_and_remove_attribute() {
        let inventory = MemoryInventory::new();
        inventory.insert(ResourceSnapshot::new(bucket()));

        inventory
            .put_attribute(&bucket(), "encryption", json!({"algorithm": "AES256"}))
            .await
            .unwrap();
        let removed = inventory
            .remove_attribute(&bucket(), "encryption")
            .await
            .unwrap();
        assert_eq!(removed, Some(json!({"algorithm": "AES256"})));
        assert_eq!(inventory.write_count(), 2);
    }

    #[tokio::test]
    async fn write_to_missing_resource_fails() {
        let inventory = MemoryInventory::new();
        let err = inventory
            .put_attribute(&bucket(), "x", json!(true))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::ResourceNotFound(_)));
    }

    #[tokio::test]
    async fn transient_failures_are_consumed() {
        let inventory = MemoryInventory::new();
        inventory.insert(ResourceSnapshot::new(bucket()));
        inventory.fail_next(2);

        assert!(inventory.describe(&bucket()).await.unwrap_err().is_retryable());
        assert!(inventory.describe(&bucket()).await.unwrap_err().is_retryable());
        assert!(inventory.describe(&bucket()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn attribute_failure_is_permanent_until_cleared() {
        let inventory = MemoryInventory::new();
        inventory.insert(ResourceSnapshot::new(bucket()));
        inventory.fail_writes_to("flag");

        let err = inventory
            .put_attribute(&bucket(), "flag", json!(true))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());

        inventory.clear_write_failure("flag");
        inventory
            .put_attribute(&bucket(), "flag", json!(true))
            .await
            .unwrap();
    }

    #[test]
    fn tag_lookup_ignores_key_case() {
        let snapshot = ResourceSnapshot::new(bucket()).with_tag("Environment", "prod");
        assert_eq!(snapshot.tag("environment"), Some("prod"));
    }
}
