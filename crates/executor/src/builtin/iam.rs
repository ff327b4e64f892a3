use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use remedy_core::{
    Change, ImpactEstimate, RemediationRequest, RemediationResult, RiskLevel, RollbackDescriptor,
    RollbackResult,
};

use super::{already_compliant, describe_required, dry_run_result};
use crate::error::ExecutorError;
use crate::executor::{FixExecutor, ensure_descriptor_kind};
use crate::inventory::{ResourceInventory, ResourceRef, ResourceSnapshot};

const POLICIES_ATTRIBUTE: &str = "attached_policies";
const ADMIN_POLICY: &str = "AdministratorAccess";

/// Detaches an administrator policy from an IAM role.
///
/// The policy name defaults to `AdministratorAccess` and can be overridden
/// with the `policy_name` parameter. Always HIGH risk: workloads running
/// under the role may lose permissions they silently relied on.
pub struct DetachAdminPolicyExecutor {
    inventory: Arc<dyn ResourceInventory>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DetachedPolicy {
    policy: String,
}

impl DetachAdminPolicyExecutor {
    pub fn new(inventory: Arc<dyn ResourceInventory>) -> Self {
        Self { inventory }
    }

    fn policy_name(request: &RemediationRequest) -> &str {
        request.parameter_str("policy_name").unwrap_or(ADMIN_POLICY)
    }

    fn attached(snapshot: &ResourceSnapshot) -> Result<Vec<String>, ExecutorError> {
        match snapshot.attribute(POLICIES_ATTRIBUTE) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => Ok(serde_json::from_value(value.clone())?),
        }
    }
}

impl FixExecutor for DetachAdminPolicyExecutor {
    fn kind(&self) -> &str {
        "iam.detach_admin_policy"
    }

    fn resource_type(&self) -> &str {
        "IAM_ROLE"
    }

    fn remediation_type(&self) -> &str {
        "DETACH_ADMIN_POLICY"
    }

    async fn estimate_impact(
        &self,
        request: &RemediationRequest,
        snapshot: &ResourceSnapshot,
    ) -> Result<ImpactEstimate, ExecutorError> {
        Ok(ImpactEstimate {
            risk_level: RiskLevel::High,
            affected_resources: u32::try_from(1 + snapshot.dependents.len()).unwrap_or(u32::MAX),
            downtime: !snapshot.dependents.is_empty(),
            cost_impact: 0.0,
            description: format!(
                "detach {} from role {}",
                Self::policy_name(request),
                request.resource_id
            ),
            mitigations: vec![
                "attach a least-privilege policy covering the role's real usage first".into(),
                "review access-advisor data for the role".into(),
            ],
        })
    }

    async fn execute(
        &self,
        request: &RemediationRequest,
    ) -> Result<RemediationResult, ExecutorError> {
        let resource = ResourceRef::from_request(request);
        let policy = Self::policy_name(request).to_owned();
        let snapshot = describe_required(self.inventory.as_ref(), &resource).await?;
        let attached = Self::attached(&snapshot)?;

        if !attached.contains(&policy) {
            return Ok(already_compliant(&resource, request.dry_run));
        }

        let remaining: Vec<String> = attached.iter().filter(|p| **p != policy).cloned().collect();
        let change = Change::new(
            "DetachRolePolicy",
            resource.resource_id.clone(),
            serde_json::to_value(&attached)?,
            serde_json::to_value(&remaining)?,
        );
        if request.dry_run {
            return Ok(dry_run_result(vec![change]));
        }

        self.inventory
            .put_attribute(&resource, POLICIES_ATTRIBUTE, serde_json::to_value(&remaining)?)
            .await?;
        info!(resource = %resource, policy = %policy, "admin policy detached");

        Ok(RemediationResult {
            success: true,
            message: format!("{policy} detached from {}", resource.resource_id),
            changes: vec![change],
            rollback: Some(RollbackDescriptor {
                executor_kind: FixExecutor::kind(self).to_owned(),
                before_state: serde_json::to_value(DetachedPolicy {
                    policy: policy.clone(),
                })?,
                instructions: vec![format!(
                    "re-attach {policy} to role {}",
                    resource.resource_id
                )],
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
        let DetachedPolicy { policy } = serde_json::from_value(descriptor.before_state.clone())?;
        let resource = ResourceRef::from_request(request);

        // Re-attach only the detached policy so unrelated changes made since
        // are kept.
        let snapshot = describe_required(self.inventory.as_ref(), &resource).await?;
        let mut attached = Self::attached(&snapshot)?;
        if !attached.contains(&policy) {
            attached.push(policy.clone());
            self.inventory
                .put_attribute(&resource, POLICIES_ATTRIBUTE, serde_json::to_value(&attached)?)
                .await?;
        }
        Ok(RollbackResult::from_parts(vec![policy], vec![]))
    }
}
