use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use remedy_core::{
    Change, ImpactEstimate, RemediationRequest, RemediationResult, RiskLevel, RollbackDescriptor,
    RollbackResult,
};

use super::{already_compliant, describe_required, dry_run_result};
use crate::error::ExecutorError;
use crate::executor::{FixExecutor, ensure_descriptor_kind};
use crate::inventory::{ResourceInventory, ResourceRef, ResourceSnapshot};

pub const S3_BUCKET: &str = "S3_BUCKET";

const ENCRYPTION_ATTRIBUTE: &str = "encryption";
const SSE_S3: &str = "AES256";
const SSE_KMS: &str = "aws:kms";

/// Public-access-block flags, in the order they are applied.
const PUBLIC_ACCESS_FLAGS: [&str; 4] = [
    "block_public_acls",
    "ignore_public_acls",
    "block_public_policy",
    "restrict_public_buckets",
];

/// Enables default server-side encryption on a bucket.
///
/// Parameters: `algorithm` (`AES256` or `aws:kms`, default `AES256`) and
/// `kms_key_id` (required for `aws:kms`).
pub struct BucketEncryptionExecutor {
    inventory: Arc<dyn ResourceInventory>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EncryptionBefore {
    previous: Option<Value>,
}

impl BucketEncryptionExecutor {
    pub fn new(inventory: Arc<dyn ResourceInventory>) -> Self {
        Self { inventory }
    }

    fn desired(request: &RemediationRequest) -> Result<Value, ExecutorError> {
        let algorithm = request.parameter_str("algorithm").unwrap_or(SSE_S3);
        match algorithm {
            SSE_S3 => Ok(json!({ "algorithm": SSE_S3 })),
            SSE_KMS => {
                let key = request.parameter_str("kms_key_id").ok_or_else(|| {
                    ExecutorError::InvalidParameters("kms_key_id is required for aws:kms".into())
                })?;
                Ok(json!({ "algorithm": SSE_KMS, "kms_key_id": key }))
            }
            other => Err(ExecutorError::InvalidParameters(format!(
                "unsupported encryption algorithm: {other}"
            ))),
        }
    }
}

impl FixExecutor for BucketEncryptionExecutor {
    fn kind(&self) -> &str {
        "s3.bucket_encryption"
    }

    fn resource_type(&self) -> &str {
        S3_BUCKET
    }

    fn remediation_type(&self) -> &str {
        "ENABLE_BUCKET_ENCRYPTION"
    }

    async fn estimate_impact(
        &self,
        request: &RemediationRequest,
        _snapshot: &ResourceSnapshot,
    ) -> Result<ImpactEstimate, ExecutorError> {
        let desired = Self::desired(request)?;
        let kms = desired["algorithm"] == SSE_KMS;
        Ok(ImpactEstimate {
            risk_level: RiskLevel::Low,
            affected_resources: 1,
            downtime: false,
            cost_impact: if kms { 1.0 } else { 0.0 },
            description: format!(
                "enable default {} encryption on bucket {}",
                desired["algorithm"].as_str().unwrap_or(SSE_S3),
                request.resource_id
            ),
            mitigations: vec![
                "existing objects stay unencrypted until rewritten".into(),
                "readers need kms:Decrypt when aws:kms is used".into(),
            ],
        })
    }

    async fn execute(
        &self,
        request: &RemediationRequest,
    ) -> Result<RemediationResult, ExecutorError> {
        let resource = ResourceRef::from_request(request);
        let desired = Self::desired(request)?;
        let snapshot = describe_required(self.inventory.as_ref(), &resource).await?;
        let previous = snapshot.attribute(ENCRYPTION_ATTRIBUTE).cloned();

        if previous.as_ref() == Some(&desired) {
            return Ok(already_compliant(&resource, request.dry_run));
        }

        let change = Change::new(
            "PutBucketEncryption",
            resource.resource_id.clone(),
            previous.clone().unwrap_or(Value::Null),
            desired.clone(),
        );
        if request.dry_run {
            return Ok(dry_run_result(vec![change]));
        }

        self.inventory
            .put_attribute(&resource, ENCRYPTION_ATTRIBUTE, desired)
            .await?;
        info!(resource = %resource, "bucket encryption enabled");

        let instructions = match &previous {
            Some(_) => vec!["restore the previous default encryption configuration".into()],
            None => vec!["delete the bucket's default encryption configuration".into()],
        };
        Ok(RemediationResult {
            success: true,
            message: format!("default encryption enabled on {}", resource.resource_id),
            changes: vec![change],
            rollback: Some(RollbackDescriptor {
                executor_kind: FixExecutor::kind(self).to_owned(),
                before_state: serde_json::to_value(EncryptionBefore { previous })?,
                instructions,
            }),
            dry_run: false,
        })
    }

    async fn rollback(
        &self,
        request: &RemediationRequest,
        descriptor: &RollbackDescriptor,
    ) -> Result<RollbackResult, ExecutorError> {
        ensure_descriptor_kind(FixExecutor::kind(self), descriptor)?;
        let before: EncryptionBefore = serde_json::from_value(descriptor.before_state.clone())?;
        let resource = ResourceRef::from_request(request);

        match before.previous {
            Some(previous) => {
                self.inventory
                    .put_attribute(&resource, ENCRYPTION_ATTRIBUTE, previous)
                    .await?;
            }
            None => {
                self.inventory
                    .remove_attribute(&resource, ENCRYPTION_ATTRIBUTE)
                    .await?;
            }
        }
        Ok(RollbackResult::from_parts(
            vec![ENCRYPTION_ATTRIBUTE.to_owned()],
            vec![],
        ))
    }
}

/// Turns on all four public-access-block flags of a bucket.
///
/// Each flag is recorded and restored independently, so a rollback can
/// partially succeed.
pub struct PublicAccessBlockExecutor {
    inventory: Arc<dyn ResourceInventory>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FlagBefore {
    flag: String,
    previous: Option<Value>,
}

impl PublicAccessBlockExecutor {
    pub fn new(inventory: Arc<dyn ResourceInventory>) -> Self {
        Self { inventory }
    }

    fn pending_flags(snapshot: &ResourceSnapshot) -> Vec<(&'static str, Option<Value>)> {
        PUBLIC_ACCESS_FLAGS
            .iter()
            .filter(|flag| snapshot.attribute(flag) != Some(&Value::Bool(true)))
            .map(|flag| (*flag, snapshot.attribute(flag).cloned()))
            .collect()
    }

    fn descriptor(&self, applied: Vec<FlagBefore>) -> Result<RollbackDescriptor, ExecutorError> {
        let instructions = applied
            .iter()
            .map(|f| match &f.previous {
                Some(v) => format!("set {} back to {v}", f.flag),
                None => format!("unset {}", f.flag),
            })
            .collect();
        Ok(RollbackDescriptor {
            executor_kind: FixExecutor::kind(self).to_owned(),
            before_state: serde_json::to_value(applied)?,
            instructions,
        })
    }
}

impl FixExecutor for PublicAccessBlockExecutor {
    fn kind(&self) -> &str {
        "s3.public_access_block"
    }

    fn resource_type(&self) -> &str {
        S3_BUCKET
    }

    fn remediation_type(&self) -> &str {
        "BLOCK_PUBLIC_ACCESS"
    }

    async fn estimate_impact(
        &self,
        request: &RemediationRequest,
        snapshot: &ResourceSnapshot,
    ) -> Result<ImpactEstimate, ExecutorError> {
        let serves_website = snapshot.attribute("website_enabled") == Some(&Value::Bool(true));
        let pending = Self::pending_flags(snapshot).len();
        let mut mitigations =
            vec!["grant access through CloudFront or presigned URLs instead".to_owned()];
        if serves_website {
            mitigations.push("move the static website behind a CDN first".into());
        }
        Ok(ImpactEstimate {
            risk_level: if serves_website {
                RiskLevel::Medium
            } else {
                RiskLevel::Low
            },
            affected_resources: u32::try_from(1 + snapshot.dependents.len()).unwrap_or(u32::MAX),
            downtime: serves_website,
            cost_impact: 0.0,
            description: format!(
                "enable {pending} public access block flag(s) on bucket {}",
                request.resource_id
            ),
            mitigations,
        })
    }

    async fn execute(
        &self,
        request: &RemediationRequest,
    ) -> Result<RemediationResult, ExecutorError> {
        let resource = ResourceRef::from_request(request);
        let snapshot = describe_required(self.inventory.as_ref(), &resource).await?;
        let pending = Self::pending_flags(&snapshot);

        if pending.is_empty() {
            return Ok(already_compliant(&resource, request.dry_run));
        }

        let changes: Vec<Change> = pending
            .iter()
            .map(|(flag, previous)| {
                Change::new(
                    "PutPublicAccessBlock",
                    format!("{}/{flag}", resource.resource_id),
                    previous.clone().unwrap_or(Value::Null),
                    Value::Bool(true),
                )
            })
            .collect();
        if request.dry_run {
            return Ok(dry_run_result(changes));
        }

        let mut applied = Vec::with_capacity(pending.len());
        for (flag, previous) in pending {
            if let Err(err) = self
                .inventory
                .put_attribute(&resource, flag, Value::Bool(true))
                .await
            {
                // Only a clean slate may be retried: a fresh attempt would
                // read the flags set here as already compliant and drop
                // their before-state from the descriptor.
                if err.is_retryable() && applied.is_empty() {
                    return Err(err);
                }
                let done = applied.len();
                return Ok(RemediationResult {
                    success: false,
                    message: format!("failed to set {flag} after {done} flag(s): {err}"),
                    changes: changes.into_iter().take(done).collect(),
                    rollback: Some(self.descriptor(applied)?),
                    dry_run: false,
                });
            }
            applied.push(FlagBefore {
                flag: flag.to_owned(),
                previous,
            });
        }
        info!(resource = %resource, flags = applied.len(), "public access blocked");

        Ok(RemediationResult {
            success: true,
            message: format!("public access blocked on {}", resource.resource_id),
            changes,
            rollback: Some(self.descriptor(applied)?),
            dry_run: false,
        })
    }

    async fn rollback(
        &self,
        request: &RemediationRequest,
        descriptor: &RollbackDescriptor,
    ) -> Result<RollbackResult, ExecutorError> {
        ensure_descriptor_kind(FixExecutor::kind(self), descriptor)?;
        let flags: Vec<FlagBefore> = serde_json::from_value(descriptor.before_state.clone())?;
        let resource = ResourceRef::from_request(request);

        let mut restored = Vec::new();
        let mut failed = Vec::new();
        for FlagBefore { flag, previous } in flags {
            let outcome = match previous {
                Some(value) => self.inventory.put_attribute(&resource, &flag, value).await,
                None => self
                    .inventory
                    .remove_attribute(&resource, &flag)
                    .await
                    .map(|_| ()),
            };
            match outcome {
                Ok(()) => restored.push(flag),
                Err(err) => {
                    tracing::warn!(resource = %resource, flag = %flag, error = %err, "flag not restored");
                    failed.push(flag);
                }
            }
        }

        Ok(RollbackResult::from_parts(restored, failed))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::ExecutorConfig;
    use crate::inventory::MemoryInventory;
    use crate::retry::RetryStrategy;
    use crate::retrying::RetryingExecutor;

    /// Drops the connection on the n-th write, once, before it lands.
    struct FlakyWrite {
        inner: Arc<MemoryInventory>,
        writes: AtomicU32,
        fail_on: u32,
    }

    #[async_trait]
    impl ResourceInventory for FlakyWrite {
        async fn describe(
            &self,
            resource: &ResourceRef,
        ) -> Result<Option<ResourceSnapshot>, ExecutorError> {
            self.inner.describe(resource).await
        }

        async fn put_attribute(
            &self,
            resource: &ResourceRef,
            name: &str,
            value: Value,
        ) -> Result<(), ExecutorError> {
            if self.writes.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(ExecutorError::Connection("reset by peer".into()));
            }
            self.inner.put_attribute(resource, name, value).await
        }

        async fn remove_attribute(
            &self,
            resource: &ResourceRef,
            name: &str,
        ) -> Result<Option<Value>, ExecutorError> {
            self.inner.remove_attribute(resource, name).await
        }
    }

    fn retrying(executor: impl FixExecutor + 'static) -> RetryingExecutor {
        RetryingExecutor::new(
            Arc::new(executor),
            ExecutorConfig {
                max_retries: 3,
                retry_strategy: RetryStrategy::Constant {
                    delay: Duration::from_millis(1),
                },
                execution_timeout: Duration::from_secs(1),
                max_concurrent: 1,
            },
        )
    }

    fn bucket_ref() -> ResourceRef {
        ResourceRef::new("000000000000", "us-east-1", S3_BUCKET, "logs")
    }

    fn request(remediation_type: &str) -> RemediationRequest {
        RemediationRequest::new("finding-1", remediation_type, "logs", S3_BUCKET, "acme")
    }

    fn inventory_with_bucket() -> Arc<MemoryInventory> {
        let inventory = Arc::new(MemoryInventory::new());
        inventory.insert(ResourceSnapshot::new(bucket_ref()));
        inventory
    }

    #[tokio::test]
    async fn encryption_apply_and_rollback() {
        let inventory = inventory_with_bucket();
        let executor = BucketEncryptionExecutor::new(inventory.clone());
        let req = request("ENABLE_BUCKET_ENCRYPTION");

        let result = executor.execute(&req).await.unwrap();
        assert!(result.success);
        assert_eq!(result.changes.len(), 1);
        let descriptor = result.rollback.expect("descriptor");
        assert_eq!(descriptor.executor_kind, "s3.bucket_encryption");
        assert_eq!(
            inventory.get(&bucket_ref()).unwrap().attribute("encryption"),
            Some(&json!({"algorithm": "AES256"}))
        );

        let rollback = executor.rollback(&req, &descriptor).await.unwrap();
        assert!(rollback.success);
        assert!(inventory.get(&bucket_ref()).unwrap().attribute("encryption").is_none());
    }

    #[tokio::test]
    async fn encryption_is_idempotent() {
        let inventory = inventory_with_bucket();
        let executor = BucketEncryptionExecutor::new(inventory.clone());
        let req = request("ENABLE_BUCKET_ENCRYPTION");

        executor.execute(&req).await.unwrap();
        let second = executor.execute(&req).await.unwrap();
        assert!(second.success);
        assert!(second.changes.is_empty());
        assert!(second.rollback.is_none());
        assert_eq!(inventory.write_count(), 1);
    }

    #[tokio::test]
    async fn encryption_dry_run_does_not_mutate() {
        let inventory = inventory_with_bucket();
        let executor = BucketEncryptionExecutor::new(inventory.clone());
        let req = request("ENABLE_BUCKET_ENCRYPTION").with_dry_run(true);

        let result = executor.execute(&req).await.unwrap();
        assert!(result.success);
        assert!(result.dry_run);
        assert!(result.rollback.is_none());
        assert_eq!(result.changes[0].after, json!({"algorithm": "AES256"}));
        assert_eq!(inventory.write_count(), 0);
    }

    #[tokio::test]
    async fn kms_requires_key_id() {
        let executor = BucketEncryptionExecutor::new(inventory_with_bucket());
        let req = request("ENABLE_BUCKET_ENCRYPTION")
            .with_parameters(json!({"algorithm": "aws:kms"}));
        let err = executor.execute(&req).await.unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn public_access_sets_only_missing_flags() {
        let inventory = Arc::new(MemoryInventory::new());
        inventory.insert(
            ResourceSnapshot::new(bucket_ref()).with_attribute("block_public_acls", json!(true)),
        );
        let executor = PublicAccessBlockExecutor::new(inventory.clone());

        let result = executor
            .execute(&request("BLOCK_PUBLIC_ACCESS"))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.changes.len(), 3);
        assert_eq!(inventory.write_count(), 3);
    }

    #[tokio::test]
    async fn public_access_partial_rollback() {
        let inventory = inventory_with_bucket();
        let executor = PublicAccessBlockExecutor::new(inventory.clone());
        let req = request("BLOCK_PUBLIC_ACCESS");

        let descriptor = executor.execute(&req).await.unwrap().rollback.unwrap();
        inventory.fail_writes_to("block_public_policy");

        let rollback = executor.rollback(&req, &descriptor).await.unwrap();
        assert!(!rollback.success);
        assert!(rollback.partial_rollback);
        assert_eq!(rollback.failed, vec!["block_public_policy".to_owned()]);
        assert_eq!(rollback.restored.len(), 3);
    }

    #[tokio::test]
    async fn public_access_permanent_write_failure_reports_progress() {
        let inventory = inventory_with_bucket();
        inventory.fail_writes_to("block_public_policy");
        let executor = PublicAccessBlockExecutor::new(inventory.clone());

        let result = executor
            .execute(&request("BLOCK_PUBLIC_ACCESS"))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.changes.len(), 2);
        assert!(result.rollback.is_some());
    }

    #[tokio::test]
    async fn transient_failure_after_progress_keeps_the_before_state() {
        let inventory = inventory_with_bucket();
        let flaky = Arc::new(FlakyWrite {
            inner: inventory.clone(),
            writes: AtomicU32::new(0),
            fail_on: 2,
        });
        let executor = retrying(PublicAccessBlockExecutor::new(flaky));
        let req = request("BLOCK_PUBLIC_ACCESS");

        let result = FixExecutor::execute(&executor, &req).await.unwrap();
        assert!(!result.success);
        // No second attempt: it would see the first flag as already set.
        assert_eq!(inventory.write_count(), 1);

        let descriptor = result.rollback.expect("descriptor");
        let recorded: Vec<FlagBefore> =
            serde_json::from_value(descriptor.before_state.clone()).unwrap();
        let recorded: Vec<&str> = recorded.iter().map(|f| f.flag.as_str()).collect();
        assert_eq!(recorded, vec!["block_public_acls"]);
        for change in &result.changes {
            let flag = change.resource.rsplit('/').next().unwrap();
            assert!(recorded.contains(&flag), "{flag} changed but not recorded");
        }

        let rollback = FixExecutor::rollback(&executor, &req, &descriptor)
            .await
            .unwrap();
        assert!(rollback.success);
        let bucket = inventory.get(&bucket_ref()).unwrap();
        assert!(bucket.attribute("block_public_acls").is_none());
    }

    #[tokio::test]
    async fn transient_failure_before_any_write_is_retried() {
        let inventory = inventory_with_bucket();
        let flaky = Arc::new(FlakyWrite {
            inner: inventory.clone(),
            writes: AtomicU32::new(0),
            fail_on: 0,
        });
        inventory.fail_next(1);
        let executor = retrying(PublicAccessBlockExecutor::new(flaky));

        let result = FixExecutor::execute(&executor, &request("BLOCK_PUBLIC_ACCESS"))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.changes.len(), 4);
    }

    #[tokio::test]
    async fn website_bucket_is_medium_risk() {
        let executor = PublicAccessBlockExecutor::new(inventory_with_bucket());
        let snapshot = ResourceSnapshot::new(bucket_ref())
            .with_attribute("website_enabled", json!(true))
            .with_dependent("cdn-1");
        let impact = executor
            .estimate_impact(&request("BLOCK_PUBLIC_ACCESS"), &snapshot)
            .await
            .unwrap();
        assert_eq!(impact.risk_level, RiskLevel::Medium);
        assert_eq!(impact.affected_resources, 2);
        assert!(impact.downtime);
    }
}
