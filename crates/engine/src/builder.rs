use std::sync::Arc;

use remedy_audit::AuditStore;
use remedy_executor::{
    DynFixExecutor, ExecutorConfig, ExecutorRegistry, ResourceInventory, register_builtin,
};
use remedy_state::StateStore;

use crate::approval::{ApprovalWorkflow, LogApprovalWorkflow};
use crate::error::EngineError;
use crate::gate::ApprovalGate;
use crate::guardrail::{Guardrail, GuardrailEngine};
use crate::impact::ImpactEstimator;
use crate::job_store::{JobStore, StateJobStore};
use crate::metrics::EngineMetrics;
use crate::orchestrator::RemediationOrchestrator;
use crate::policy::Policy;
use crate::rollback::RollbackManager;

/// Default namespace for job keys in the state store.
pub const DEFAULT_NAMESPACE: &str = "remedy";

/// Fluent builder for [`RemediationOrchestrator`].
///
/// A state store (or a ready-made job store), an audit store and a resource
/// inventory are required. Everything else has a default: the built-in
/// policy, the built-in executors and a logging approval workflow.
pub struct OrchestratorBuilder {
    state: Option<Arc<dyn StateStore>>,
    job_store: Option<Arc<dyn JobStore>>,
    audit: Option<Arc<dyn AuditStore>>,
    inventory: Option<Arc<dyn ResourceInventory>>,
    policy: Option<Policy>,
    approvals: Option<Arc<dyn ApprovalWorkflow>>,
    executor_config: Option<ExecutorConfig>,
    executors: Vec<Arc<dyn DynFixExecutor>>,
    guardrails: Vec<Arc<dyn Guardrail>>,
    builtin_executors: bool,
    namespace: String,
    metrics: Option<Arc<EngineMetrics>>,
}

impl OrchestratorBuilder {
    /// Create a new builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: None,
            job_store: None,
            audit: None,
            inventory: None,
            policy: None,
            approvals: None,
            executor_config: None,
            executors: Vec::new(),
            guardrails: Vec::new(),
            builtin_executors: true,
            namespace: DEFAULT_NAMESPACE.to_owned(),
            metrics: None,
        }
    }

    /// Persist jobs in this state store.
    #[must_use]
    pub fn state(mut self, state: Arc<dyn StateStore>) -> Self {
        self.state = Some(state);
        self
    }

    /// Use a custom job store instead of one built on a state store.
    #[must_use]
    pub fn job_store(mut self, jobs: Arc<dyn JobStore>) -> Self {
        self.job_store = Some(jobs);
        self
    }

    #[must_use]
    pub fn audit(mut self, audit: Arc<dyn AuditStore>) -> Self {
        self.audit = Some(audit);
        self
    }

    #[must_use]
    pub fn inventory(mut self, inventory: Arc<dyn ResourceInventory>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    #[must_use]
    pub fn approval_workflow(mut self, approvals: Arc<dyn ApprovalWorkflow>) -> Self {
        self.approvals = Some(approvals);
        self
    }

    /// Wrap every executor with retries, timeouts and a concurrency limit.
    #[must_use]
    pub fn executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor_config = Some(config);
        self
    }

    /// Register an additional executor. Replaces a built-in one with the same
    /// resource and remediation type.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn DynFixExecutor>) -> Self {
        self.executors.push(executor);
        self
    }

    /// Whether to register the built-in executors (default `true`).
    #[must_use]
    pub fn builtin_executors(mut self, enabled: bool) -> Self {
        self.builtin_executors = enabled;
        self
    }

    /// Run `guardrail` after the policy's guardrails.
    #[must_use]
    pub fn guardrail(mut self, guardrail: Arc<dyn Guardrail>) -> Self {
        self.guardrails.push(guardrail);
        self
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Share a metrics instance, e.g. with an HTTP server.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the orchestrator.
    ///
    /// Returns [`EngineError::Configuration`] when a required component is
    /// missing or no executor is registered, and [`EngineError::Policy`] when
    /// the policy is invalid.
    pub fn build(self) -> Result<RemediationOrchestrator, EngineError> {
        let jobs: Arc<dyn JobStore> = match (self.job_store, self.state) {
            (Some(jobs), _) => jobs,
            (None, Some(state)) => Arc::new(StateJobStore::new(state, self.namespace)),
            (None, None) => {
                return Err(EngineError::Configuration(
                    "a state store or job store is required".into(),
                ));
            }
        };
        let audit = self
            .audit
            .ok_or_else(|| EngineError::Configuration("an audit store is required".into()))?;
        let inventory = self.inventory.ok_or_else(|| {
            EngineError::Configuration("a resource inventory is required".into())
        })?;

        let policy = self.policy.unwrap_or_default();
        policy.validate()?;
        let policy = Arc::new(policy);

        let mut registry = match self.executor_config {
            Some(config) => ExecutorRegistry::with_config(config),
            None => ExecutorRegistry::new(),
        };
        if self.builtin_executors {
            register_builtin(&mut registry, &inventory);
        }
        for executor in self.executors {
            registry.register(executor);
        }
        if registry.is_empty() {
            return Err(EngineError::Configuration(
                "at least one executor must be registered".into(),
            ));
        }
        let registry = Arc::new(registry);

        let mut guardrails = GuardrailEngine::from_policy(&policy)?;
        for guardrail in self.guardrails {
            guardrails.push(guardrail);
        }

        Ok(RemediationOrchestrator {
            estimator: ImpactEstimator::new(
                Arc::clone(&policy),
                Arc::clone(&inventory),
                Arc::clone(&registry),
            ),
            gate: ApprovalGate::new(Arc::clone(&policy)),
            rollbacks: RollbackManager::new(Arc::clone(&registry)),
            approvals: self
                .approvals
                .unwrap_or_else(|| Arc::new(LogApprovalWorkflow)),
            metrics: self.metrics.unwrap_or_default(),
            jobs,
            audit,
            registry,
            inventory,
            guardrails,
            policy,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use remedy_audit_memory::MemoryAuditStore;
    use remedy_executor::MemoryInventory;
    use remedy_state_memory::MemoryStateStore;

    use super::*;
    use crate::policy::PolicyError;

    fn complete() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
            .state(Arc::new(MemoryStateStore::new()))
            .audit(Arc::new(MemoryAuditStore::new()))
            .inventory(Arc::new(MemoryInventory::new()))
    }

    #[test]
    fn builds_with_defaults() {
        let orchestrator = complete().build().unwrap();
        assert_eq!(orchestrator.registry().len(), 3);
        assert_eq!(orchestrator.policy().version, 1);
    }

    #[test]
    fn missing_state_is_configuration_error() {
        let result = OrchestratorBuilder::new()
            .audit(Arc::new(MemoryAuditStore::new()))
            .inventory(Arc::new(MemoryInventory::new()))
            .build();
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn missing_audit_and_inventory_are_configuration_errors() {
        let no_audit = OrchestratorBuilder::new()
            .state(Arc::new(MemoryStateStore::new()))
            .inventory(Arc::new(MemoryInventory::new()))
            .build();
        assert!(matches!(no_audit, Err(EngineError::Configuration(msg)) if msg.contains("audit")));

        let no_inventory = OrchestratorBuilder::new()
            .state(Arc::new(MemoryStateStore::new()))
            .audit(Arc::new(MemoryAuditStore::new()))
            .build();
        assert!(
            matches!(no_inventory, Err(EngineError::Configuration(msg)) if msg.contains("inventory"))
        );
    }

    #[test]
    fn no_executors_is_configuration_error() {
        let result = complete().builtin_executors(false).build();
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn invalid_policy_is_rejected() {
        let mut policy = Policy::default();
        policy.version = 0;
        let result = complete().policy(policy).build();
        assert!(matches!(
            result,
            Err(EngineError::Policy(PolicyError::Invalid(_)))
        ));
    }

    #[test]
    fn shared_metrics_instance_is_used() {
        let metrics = Arc::new(EngineMetrics::default());
        let orchestrator = complete().metrics(Arc::clone(&metrics)).build().unwrap();
        assert!(Arc::ptr_eq(orchestrator.metrics(), &metrics));
    }
}
