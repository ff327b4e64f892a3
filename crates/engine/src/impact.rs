use std::sync::Arc;

use tracing::debug;

use remedy_core::{ImpactEstimate, RemediationRequest, RiskLevel};
use remedy_executor::{ExecutorRegistry, ResourceInventory, ResourceRef};

use crate::error::EngineError;
use crate::policy::Policy;

/// Assigns a risk tier to a request from live resource state and policy.
///
/// Estimation only reads; it is safe for dry runs.
#[derive(Clone)]
pub struct ImpactEstimator {
    policy: Arc<Policy>,
    inventory: Arc<dyn ResourceInventory>,
    registry: Arc<ExecutorRegistry>,
}

impl ImpactEstimator {
    pub fn new(
        policy: Arc<Policy>,
        inventory: Arc<dyn ResourceInventory>,
        registry: Arc<ExecutorRegistry>,
    ) -> Self {
        Self {
            policy,
            inventory,
            registry,
        }
    }

    /// Estimate the blast radius of applying `request` now.
    ///
    /// The tier is the highest of the policy base tier, the production tier
    /// (production-tagged resources), the fan-in tier (dependents at or above
    /// the threshold), and the executor's own tier. A missing resource is
    /// `HIGH`.
    pub async fn estimate(&self, request: &RemediationRequest) -> Result<ImpactEstimate, EngineError> {
        let resource = ResourceRef::from_request(request);
        let Some(snapshot) = self.inventory.describe(&resource).await? else {
            return Ok(ImpactEstimate {
                risk_level: RiskLevel::High,
                affected_resources: 1,
                downtime: false,
                cost_impact: 0.0,
                description: format!("resource {resource} was not found"),
                mitigations: vec!["verify the resource id, account and region".into()],
            });
        };

        let executor = self
            .registry
            .get(&request.resource_type, &request.remediation_type)
            .ok_or_else(|| {
                EngineError::ExecutionFailure(format!(
                    "no executor for {}/{}",
                    request.resource_type, request.remediation_type
                ))
            })?;
        let mut estimate = executor.estimate_impact(request, &snapshot).await?;

        let rule = self.policy.risk_rule(&request.remediation_type);
        let base = rule.map_or(self.policy.default_risk, |r| r.base);
        let mut tiers = vec![("policy", base), ("executor", estimate.risk_level)];

        if self.policy.production.matches(&snapshot) {
            let tier = rule
                .and_then(|r| r.production)
                .unwrap_or(self.policy.production.tier);
            tiers.push(("production", tier));
            estimate
                .mitigations
                .push("schedule the change inside a maintenance window".into());
        }

        if let Some((threshold, tier)) = rule.and_then(|r| r.fan_in_threshold.zip(r.fan_in)) {
            let dependents = u32::try_from(snapshot.dependents.len()).unwrap_or(u32::MAX);
            if dependents >= threshold {
                tiers.push(("fan_in", tier));
                estimate
                    .mitigations
                    .push(format!("notify owners of {dependents} dependent resources"));
            }
        }

        let (source, risk) = tiers
            .iter()
            .copied()
            .max_by_key(|(_, tier)| *tier)
            .unwrap_or(("policy", base));
        debug!(
            resource = %resource,
            risk = %risk,
            source,
            "impact estimated"
        );
        estimate.risk_level = risk;
        Ok(estimate)
    }
}

impl std::fmt::Debug for ImpactEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImpactEstimator")
            .field("policy_version", &self.policy.version)
            .finish_non_exhaustive()
    }
}
