use async_trait::async_trait;

use remedy_core::{
    ImpactEstimate, RemediationRequest, RemediationResult, RollbackDescriptor, RollbackResult,
};

use crate::error::ExecutorError;
use crate::inventory::ResourceSnapshot;

/// Strongly-typed fix executor with native `async fn`.
///
/// One implementation knows how to apply and undo one kind of change on one
/// kind of resource. It is **not** object-safe; every `FixExecutor` also
/// implements [`DynFixExecutor`] through a blanket implementation, which is
/// what the registry stores.
///
/// Contract:
/// - `execute` is idempotent for the same resource: a resource already in
///   the target state yields `success: true` with no changes.
/// - `execute` honours `request.dry_run` by reporting the would-be changes
///   without mutating anything, and never returns a rollback descriptor for
///   a dry run.
/// - `execute` returns a [`RollbackDescriptor`] whenever it changed something
///   reversible.
/// - `rollback` reports `partial_rollback` when only some changes were undone.
pub trait FixExecutor: Send + Sync {
    /// Stable identifier written into rollback descriptors.
    fn kind(&self) -> &str;

    /// Resource type this executor handles, e.g. `S3_BUCKET`.
    fn resource_type(&self) -> &str;

    /// Remediation type this executor applies, e.g. `ENABLE_BUCKET_ENCRYPTION`.
    fn remediation_type(&self) -> &str;

    /// Executor-specific impact of applying `request` to the resource in
    /// `snapshot`. Must not mutate anything.
    fn estimate_impact(
        &self,
        request: &RemediationRequest,
        snapshot: &ResourceSnapshot,
    ) -> impl std::future::Future<Output = Result<ImpactEstimate, ExecutorError>> + Send;

    /// Apply (or simulate) the fix.
    fn execute(
        &self,
        request: &RemediationRequest,
    ) -> impl std::future::Future<Output = Result<RemediationResult, ExecutorError>> + Send;

    /// Undo a previously applied fix.
    fn rollback(
        &self,
        request: &RemediationRequest,
        descriptor: &RollbackDescriptor,
    ) -> impl std::future::Future<Output = Result<RollbackResult, ExecutorError>> + Send;
}

/// Object-safe executor trait for use behind `Arc<dyn DynFixExecutor>`.
///
/// Implement [`FixExecutor`] instead and rely on the blanket implementation.
#[async_trait]
pub trait DynFixExecutor: Send + Sync {
    fn kind(&self) -> &str;

    fn resource_type(&self) -> &str;

    fn remediation_type(&self) -> &str;

    async fn estimate_impact(
        &self,
        request: &RemediationRequest,
        snapshot: &ResourceSnapshot,
    ) -> Result<ImpactEstimate, ExecutorError>;

    async fn execute(&self, request: &RemediationRequest)
    -> Result<RemediationResult, ExecutorError>;

    async fn rollback(
        &self,
        request: &RemediationRequest,
        descriptor: &RollbackDescriptor,
    ) -> Result<RollbackResult, ExecutorError>;
}

#[async_trait]
impl<T: FixExecutor + Sync> DynFixExecutor for T {
    fn kind(&self) -> &str {
        FixExecutor::kind(self)
    }

    fn resource_type(&self) -> &str {
        FixExecutor::resource_type(self)
    }

    fn remediation_type(&self) -> &str {
        FixExecutor::remediation_type(self)
    }

    async fn estimate_impact(
        &self,
        request: &RemediationRequest,
        snapshot: &ResourceSnapshot,
    ) -> Result<ImpactEstimate, ExecutorError> {
        FixExecutor::estimate_impact(self, request, snapshot).await
    }

    async fn execute(
        &self,
        request: &RemediationRequest,
    ) -> Result<RemediationResult, ExecutorError> {
        FixExecutor::execute(self, request).await
    }

    async fn rollback(
        &self,
        request: &RemediationRequest,
        descriptor: &RollbackDescriptor,
    ) -> Result<RollbackResult, ExecutorError> {
        FixExecutor::rollback(self, request, descriptor).await
    }
}

/// Reject a descriptor that was not produced by `executor_kind`.
pub fn ensure_descriptor_kind(
    executor_kind: &str,
    descriptor: &RollbackDescriptor,
) -> Result<(), ExecutorError> {
    if descriptor.executor_kind == executor_kind {
        Ok(())
    } else {
        Err(ExecutorError::DescriptorMismatch {
            expected: executor_kind.to_owned(),
            found: descriptor.executor_kind.clone(),
        })
    }
}
