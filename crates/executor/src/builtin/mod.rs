//! Reference executors for common storage and identity findings.
//!
//! They operate purely through a [`ResourceInventory`], so the same code runs
//! against a cloud-backed inventory or [`MemoryInventory`](crate::MemoryInventory).

mod iam;
mod s3;

use std::sync::Arc;

use remedy_core::{Change, RemediationResult};

pub use iam::DetachAdminPolicyExecutor;
pub use s3::{BucketEncryptionExecutor, PublicAccessBlockExecutor};

use crate::error::ExecutorError;
use crate::inventory::{ResourceInventory, ResourceRef, ResourceSnapshot};
use crate::registry::ExecutorRegistry;

/// Register every built-in executor against `inventory`.
pub fn register_builtin(registry: &mut ExecutorRegistry, inventory: &Arc<dyn ResourceInventory>) {
    registry.register(Arc::new(BucketEncryptionExecutor::new(Arc::clone(inventory))));
    registry.register(Arc::new(PublicAccessBlockExecutor::new(Arc::clone(inventory))));
    registry.register(Arc::new(DetachAdminPolicyExecutor::new(Arc::clone(inventory))));
}

async fn describe_required(
    inventory: &dyn ResourceInventory,
    resource: &ResourceRef,
) -> Result<ResourceSnapshot, ExecutorError> {
    inventory
        .describe(resource)
        .await?
        .ok_or_else(|| ExecutorError::ResourceNotFound(resource.to_string()))
}

fn already_compliant(resource: &ResourceRef, dry_run: bool) -> RemediationResult {
    RemediationResult {
        success: true,
        message: format!("{} is already compliant", resource.resource_id),
        dry_run,
        ..RemediationResult::default()
    }
}

fn dry_run_result(changes: Vec<Change>) -> RemediationResult {
    RemediationResult {
        success: true,
        message: format!("dry run: {} change(s) would be applied", changes.len()),
        changes,
        rollback: None,
        dry_run: true,
    }
}
