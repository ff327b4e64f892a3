//! Pre-execution safety checks.
//!
//! Each guardrail fetches the live data it needs itself. A guardrail that
//! cannot reach a verdict is recorded as failed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use remedy_core::{JobId, JobStatus, RemediationRequest, SafetyCheck, SafetyCheckResult, Severity};
use remedy_executor::{ResourceInventory, ResourceRef};

use crate::error::EngineError;
use crate::job_store::JobStore;
use crate::policy::{GuardrailRule, Policy, PolicyError, ProductionRules};

/// Tag that opts a resource out of automatic remediation.
pub const PROTECTED_TAG: &str = "remediation:protected";

/// What a guardrail sees while evaluating one request.
pub struct GuardrailContext<'a> {
    pub request: &'a RemediationRequest,
    /// The job being evaluated, once it exists.
    pub job_id: Option<&'a JobId>,
    pub inventory: &'a dyn ResourceInventory,
    pub jobs: &'a dyn JobStore,
}

/// Verdict of a single guardrail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub message: String,
}

impl Verdict {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}

/// A named, severity-tagged safety check.
#[async_trait]
pub trait Guardrail: Send + Sync {
    fn name(&self) -> &str;

    fn severity(&self) -> Severity;

    async fn evaluate(&self, ctx: &GuardrailContext<'_>) -> Result<Verdict, EngineError>;
}

/// Runs an ordered list of guardrails.
#[derive(Clone, Default)]
pub struct GuardrailEngine {
    guardrails: Vec<Arc<dyn Guardrail>>,
}

impl GuardrailEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the enabled guardrails of `policy`, in policy order.
    pub fn from_policy(policy: &Policy) -> Result<Self, PolicyError> {
        let mut engine = Self::new();
        for rule in policy.guardrails.iter().filter(|r| r.enabled) {
            engine.push(builtin(rule, &policy.production)?);
        }
        Ok(engine)
    }

    /// Append a guardrail to the end of the run order.
    pub fn push(&mut self, guardrail: Arc<dyn Guardrail>) {
        self.guardrails.push(guardrail);
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.guardrails.iter().map(|g| g.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.guardrails.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guardrails.is_empty()
    }

    /// Evaluate every guardrail. Never fails: errors become failed checks.
    pub async fn run(&self, ctx: &GuardrailContext<'_>) -> SafetyCheckResult {
        let mut checks = Vec::with_capacity(self.guardrails.len());
        for guardrail in &self.guardrails {
            let check = match guardrail.evaluate(ctx).await {
                Ok(v) if v.passed => SafetyCheck::pass(guardrail.name(), guardrail.severity(), v.message),
                Ok(v) => SafetyCheck::fail(guardrail.name(), guardrail.severity(), v.message),
                Err(e) => {
                    warn!(guardrail = guardrail.name(), error = %e, "guardrail evaluation failed");
                    SafetyCheck::fail(
                        guardrail.name(),
                        guardrail.severity(),
                        format!("check could not be evaluated: {e}"),
                    )
                }
            };
            debug!(guardrail = %check.name, passed = check.passed, "guardrail evaluated");
            checks.push(check);
        }
        SafetyCheckResult::new(checks)
    }
}

impl std::fmt::Debug for GuardrailEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardrailEngine")
            .field("guardrails", &self.names())
            .finish()
    }
}

fn builtin(rule: &GuardrailRule, production: &ProductionRules) -> Result<Arc<dyn Guardrail>, PolicyError> {
    let sev = |default| rule.severity.unwrap_or(default);
    let guardrail: Arc<dyn Guardrail> = match rule.name.as_str() {
        "resource_exists" => Arc::new(ResourceExists {
            severity: sev(Severity::High),
        }),
        "production_tag" => Arc::new(ProductionTag {
            severity: sev(Severity::High),
            rules: production.clone(),
        }),
        "protected_resource" => Arc::new(ProtectedResource {
            severity: sev(Severity::High),
            deny_list: rule.options.deny_list.clone(),
        }),
        "no_concurrent_remediation" => Arc::new(NoConcurrentRemediation {
            severity: sev(Severity::Medium),
        }),
        "region_allowed" => Arc::new(RegionAllowed {
            severity: sev(Severity::Medium),
            regions: rule.options.regions.clone(),
        }),
        other => return Err(PolicyError::Invalid(format!("unknown guardrail: {other}"))),
    };
    Ok(guardrail)
}

/// The target resource must exist.
pub struct ResourceExists {
    severity: Severity,
}

#[async_trait]
impl Guardrail for ResourceExists {
    fn name(&self) -> &str {
        "resource_exists"
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    async fn evaluate(&self, ctx: &GuardrailContext<'_>) -> Result<Verdict, EngineError> {
        let resource = ResourceRef::from_request(ctx.request);
        Ok(match ctx.inventory.describe(&resource).await? {
            Some(_) => Verdict::pass("resource exists"),
            None => Verdict::fail(format!("resource {resource} not found")),
        })
    }
}

/// Production-tagged resources need a human.
pub struct ProductionTag {
    severity: Severity,
    rules: ProductionRules,
}

#[async_trait]
impl Guardrail for ProductionTag {
    fn name(&self) -> &str {
        "production_tag"
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    async fn evaluate(&self, ctx: &GuardrailContext<'_>) -> Result<Verdict, EngineError> {
        let resource = ResourceRef::from_request(ctx.request);
        Ok(match ctx.inventory.describe(&resource).await? {
            Some(snapshot) if self.rules.matches(&snapshot) => {
                Verdict::fail("production tag detected")
            }
            Some(_) => Verdict::pass("no production tag"),
            None => Verdict::pass("resource not found, no tags to inspect"),
        })
    }
}

/// Resources on the deny list or tagged `remediation:protected=true`.
pub struct ProtectedResource {
    severity: Severity,
    deny_list: Vec<String>,
}

#[async_trait]
impl Guardrail for ProtectedResource {
    fn name(&self) -> &str {
        "protected_resource"
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    async fn evaluate(&self, ctx: &GuardrailContext<'_>) -> Result<Verdict, EngineError> {
        if self.deny_list.iter().any(|id| *id == ctx.request.resource_id) {
            return Ok(Verdict::fail("resource is on the protected list"));
        }
        let resource = ResourceRef::from_request(ctx.request);
        let tagged = ctx
            .inventory
            .describe(&resource)
            .await?
            .and_then(|s| s.tag(PROTECTED_TAG).map(|v| v.trim().eq_ignore_ascii_case("true")))
            .unwrap_or(false);
        Ok(if tagged {
            Verdict::fail(format!("resource is tagged {PROTECTED_TAG}=true"))
        } else {
            Verdict::pass("resource is not protected")
        })
    }
}

/// No other active job may be changing the same resource.
///
/// Jobs for the same remediation type are excluded by the active slot.
pub struct NoConcurrentRemediation {
    severity: Severity,
}

#[async_trait]
impl Guardrail for NoConcurrentRemediation {
    fn name(&self) -> &str {
        "no_concurrent_remediation"
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    async fn evaluate(&self, ctx: &GuardrailContext<'_>) -> Result<Verdict, EngineError> {
        let request = ctx.request;
        let mut others = Vec::new();
        for status in [JobStatus::Pending, JobStatus::PendingApproval, JobStatus::Approved] {
            let jobs = ctx.jobs.find_by_status(&request.tenant_id, status).await?;
            others.extend(jobs.into_iter().filter(|job| {
                Some(&job.id) != ctx.job_id
                    && job.request.resource_id == request.resource_id
                    && job.request.remediation_type != request.remediation_type
            }));
        }
        Ok(match others.first() {
            None => Verdict::pass("no other active remediation on this resource"),
            Some(job) => Verdict::fail(format!(
                "job {} ({}) is already {} on this resource",
                job.id, job.request.remediation_type, job.status
            )),
        })
    }
}

/// The resource's region must be on the allow-list. An empty list allows all.
pub struct RegionAllowed {
    severity: Severity,
    regions: Vec<String>,
}

#[async_trait]
impl Guardrail for RegionAllowed {
    fn name(&self) -> &str {
        "region_allowed"
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    async fn evaluate(&self, ctx: &GuardrailContext<'_>) -> Result<Verdict, EngineError> {
        let region = &ctx.request.region;
        Ok(
            if self.regions.is_empty() || self.regions.iter().any(|r| r == region) {
                Verdict::pass(format!("region {region} allowed"))
            } else {
                Verdict::fail(format!("region {region} is not in the allowed list"))
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use remedy_core::RemediationJob;
    use remedy_executor::{MemoryInventory, ResourceSnapshot};
    use remedy_state_memory::MemoryStateStore;

    use super::*;
    use crate::job_store::StateJobStore;
    use crate::policy::{GuardrailOptions, GuardrailRule};

    struct Fixture {
        inventory: MemoryInventory,
        jobs: StateJobStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                inventory: MemoryInventory::new(),
                jobs: StateJobStore::new(Arc::new(MemoryStateStore::new()), "test"),
            }
        }

        fn bucket(&self, snapshot: impl FnOnce(ResourceSnapshot) -> ResourceSnapshot) {
            let resource = ResourceRef::from_request(&request());
            self.inventory.insert(snapshot(ResourceSnapshot::new(resource)));
        }

        async fn run(&self, engine: &GuardrailEngine, request: &RemediationRequest) -> SafetyCheckResult {
            let ctx = GuardrailContext {
                request,
                job_id: None,
                inventory: &self.inventory,
                jobs: &self.jobs,
            };
            engine.run(&ctx).await
        }
    }

    fn request() -> RemediationRequest {
        RemediationRequest::new(
            "finding-1",
            "ENABLE_BUCKET_ENCRYPTION",
            "bucket-a",
            "S3_BUCKET",
            "acme",
        )
    }

    fn default_engine() -> GuardrailEngine {
        GuardrailEngine::from_policy(&Policy::default()).unwrap()
    }

    #[tokio::test]
    async fn all_pass_for_plain_bucket() {
        let fx = Fixture::new();
        fx.bucket(|s| s);
        let result = fx.run(&default_engine(), &request()).await;
        assert!(result.passed, "{result:?}");
        let names: Vec<_> = result.checks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, crate::policy::GUARDRAIL_NAMES);
    }

    #[tokio::test]
    async fn production_tag_fails_high() {
        let fx = Fixture::new();
        fx.bucket(|s| s.with_tag("environment", "production"));
        let result = fx.run(&default_engine(), &request()).await;
        assert!(!result.passed);
        let failed: Vec<_> = result.failures().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name, "production_tag");
        assert_eq!(failed[0].severity, Severity::High);
        assert_eq!(failed[0].message, "production tag detected");
    }

    #[tokio::test]
    async fn missing_resource_fails_exists_check() {
        let fx = Fixture::new();
        let result = fx.run(&default_engine(), &request()).await;
        let failed: Vec<_> = result.failures().map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["resource_exists"]);
    }

    #[tokio::test]
    async fn inventory_errors_fail_closed() {
        let fx = Fixture::new();
        fx.bucket(|s| s);
        fx.inventory.set_fail_describe(true);
        let result = fx.run(&default_engine(), &request()).await;
        assert!(!result.passed);
        let exists = &result.checks[0];
        assert!(!exists.passed);
        assert!(exists.message.starts_with("check could not be evaluated: "));
    }

    #[tokio::test]
    async fn protected_by_tag_or_deny_list() {
        let fx = Fixture::new();
        fx.bucket(|s| s.with_tag(PROTECTED_TAG, "TRUE"));
        let result = fx.run(&default_engine(), &request()).await;
        assert!(result.failures().any(|c| c.name == "protected_resource"));

        let mut policy = Policy::default();
        policy.guardrails = vec![GuardrailRule {
            name: "protected_resource".into(),
            severity: None,
            enabled: true,
            options: GuardrailOptions {
                deny_list: vec!["bucket-b".into()],
                ..GuardrailOptions::default()
            },
        }];
        let engine = GuardrailEngine::from_policy(&policy).unwrap();
        let mut other = request();
        other.resource_id = "bucket-b".into();
        let result = fx.run(&engine, &other).await;
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn region_allow_list_and_severity_override() {
        let fx = Fixture::new();
        fx.bucket(|s| s);
        let mut policy = Policy::default();
        policy.guardrails = vec![GuardrailRule {
            name: "region_allowed".into(),
            severity: Some(Severity::High),
            enabled: true,
            options: GuardrailOptions {
                regions: vec!["eu-west-1".into()],
                ..GuardrailOptions::default()
            },
        }];
        let engine = GuardrailEngine::from_policy(&policy).unwrap();
        let result = fx.run(&engine, &request()).await;
        assert_eq!(result.highest_failed_severity(), Some(Severity::High));

        let result = fx.run(&engine, &request().with_region("eu-west-1")).await;
        assert!(result.passed);
    }

    #[tokio::test]
    async fn concurrent_job_on_same_resource_fails_medium() {
        let fx = Fixture::new();
        fx.bucket(|s| s);
        let mut other = request();
        other.remediation_type = "BLOCK_PUBLIC_ACCESS".into();
        fx.jobs.create(RemediationJob::new(other)).await.unwrap();

        let result = fx.run(&default_engine(), &request()).await;
        let failed: Vec<_> = result.failures().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name, "no_concurrent_remediation");
        assert_eq!(failed[0].severity, Severity::Medium);
    }

    #[tokio::test]
    async fn disabled_guardrails_are_skipped() {
        let mut policy = Policy::default();
        for rule in &mut policy.guardrails {
            rule.enabled = rule.name == "region_allowed";
        }
        let engine = GuardrailEngine::from_policy(&policy).unwrap();
        assert_eq!(engine.names(), vec!["region_allowed"]);
    }
}
