use std::sync::Arc;

use serde::Serialize;

use remedy_core::{ImpactEstimate, RemediationRequest, RiskLevel, SafetyCheckResult, Severity};

use crate::policy::Policy;

/// What the gate decided for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateDecision {
    AutoApply,
    RequireApproval,
}

/// A decision plus the reasons recorded in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateOutcome {
    pub decision: GateDecision,
    pub reasons: Vec<String>,
}

impl GateOutcome {
    fn require(reason: impl Into<String>) -> Self {
        Self {
            decision: GateDecision::RequireApproval,
            reasons: vec![reason.into()],
        }
    }

    fn auto(reason: impl Into<String>) -> Self {
        Self {
            decision: GateDecision::AutoApply,
            reasons: vec![reason.into()],
        }
    }

    #[must_use]
    pub fn requires_approval(&self) -> bool {
        self.decision == GateDecision::RequireApproval
    }
}

/// Decides between automatic application and human approval.
///
/// Rules are checked in order and the first match wins:
///
/// 1. a failed `HIGH` guardrail requires approval
/// 2. a tenant policy listing the remediation type requires approval
///    (dry runs excepted)
/// 3. risk above `LOW` requires approval
/// 4. `auto_approve` applies, waiving failed `MEDIUM` and `LOW` guardrails
/// 5. no failed `MEDIUM` guardrail applies
/// 6. anything else requires approval
#[derive(Debug, Clone)]
pub struct ApprovalGate {
    policy: Arc<Policy>,
}

impl ApprovalGate {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn decide(
        &self,
        request: &RemediationRequest,
        checks: &SafetyCheckResult,
        impact: &ImpactEstimate,
    ) -> GateOutcome {
        if checks.has_failure_at(Severity::High) {
            let failed: Vec<_> = checks
                .failures()
                .filter(|c| c.severity == Severity::High)
                .map(|c| format!("{}: {}", c.name, c.message))
                .collect();
            let mut outcome = GateOutcome::require("high severity guardrail failed");
            outcome.reasons.extend(failed);
            return outcome;
        }

        if !request.dry_run
            && self
                .policy
                .requires_approval(request.tenant_id.as_str(), &request.remediation_type)
        {
            return GateOutcome::require(format!(
                "tenant policy requires approval for {}",
                request.remediation_type
            ));
        }

        if impact.risk_level != RiskLevel::Low {
            return GateOutcome::require(format!("estimated risk is {}", impact.risk_level));
        }

        if request.auto_approve {
            let mut outcome = GateOutcome::auto("auto-approve requested with LOW risk");
            outcome
                .reasons
                .extend(checks.failures().map(|c| format!("waived: {}: {}", c.name, c.message)));
            return outcome;
        }

        if !checks.has_failure_at(Severity::Medium) {
            let mut outcome = GateOutcome::auto("risk is LOW and guardrails allow it");
            outcome
                .reasons
                .extend(checks.failures().map(|c| format!("advisory: {}: {}", c.name, c.message)));
            return outcome;
        }

        let mut outcome = GateOutcome::require("medium severity guardrail failed without auto-approve");
        outcome.reasons.extend(
            checks
                .failures()
                .map(|c| format!("{}: {}", c.name, c.message)),
        );
        outcome
    }
}
