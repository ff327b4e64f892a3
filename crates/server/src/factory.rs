//! Builds the engine and its backends from [`RemedyConfig`].

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use remedy_audit_memory::MemoryAuditStore;
use remedy_engine::{
    ApprovalWorkflow, LogApprovalWorkflow, OrchestratorBuilder, Policy, RemediationOrchestrator,
    WebhookApprovalWorkflow,
};
use remedy_executor::{MemoryInventory, ResourceSnapshot};
use remedy_state::StateStore;
use remedy_state_memory::MemoryStateStore;

use crate::config::{ApprovalBackend, ApprovalConfig, RemedyConfig, StateBackend, StateConfig};
use crate::error::ServerError;

/// Create the state store selected by `[state]`.
pub fn create_state(config: &StateConfig) -> Result<Arc<dyn StateStore>, ServerError> {
    match config.backend {
        StateBackend::Memory => Ok(Arc::new(MemoryStateStore::new())),
        #[cfg(feature = "redis")]
        StateBackend::Redis => {
            let mut redis = remedy_state_redis::RedisConfig::default();
            if let Some(url) = &config.url {
                redis.url.clone_from(url);
            }
            if let Some(prefix) = &config.prefix {
                redis.prefix.clone_from(prefix);
            }
            let store = remedy_state_redis::RedisStateStore::new(&redis)
                .map_err(|e| ServerError::Config(format!("redis state store: {e}")))?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        StateBackend::Redis => Err(ServerError::Config(
            "redis backend requires the `redis` feature".into(),
        )),
    }
}

/// Create the approval workflow selected by `[approval]`.
pub fn create_approval_workflow(
    config: &ApprovalConfig,
) -> Result<Arc<dyn ApprovalWorkflow>, ServerError> {
    match config.workflow {
        ApprovalBackend::Log => Ok(Arc::new(LogApprovalWorkflow)),
        ApprovalBackend::Webhook => {
            let url = config.webhook_url.as_deref().ok_or_else(|| {
                ServerError::Config("approval.webhook_url is required for the webhook workflow".into())
            })?;
            let workflow = WebhookApprovalWorkflow::new(url)
                .map_err(|e| ServerError::Config(format!("approval webhook: {e}")))?
                .with_headers(config.headers.clone());
            Ok(Arc::new(workflow))
        }
    }
}

/// Load `[policy].path`, or the built-in policy when unset.
pub fn load_policy(path: Option<&Path>) -> Result<Policy, ServerError> {
    match path {
        Some(path) => Policy::load(path).map_err(|e| ServerError::Config(e.to_string())),
        None => Ok(Policy::default()),
    }
}

/// Create the in-process inventory, seeded from `[inventory].seed` if set.
pub fn create_inventory(seed: Option<&Path>) -> Result<Arc<MemoryInventory>, ServerError> {
    let inventory = Arc::new(MemoryInventory::new());
    if let Some(path) = seed {
        let source = std::fs::read_to_string(path)?;
        let snapshots: Vec<ResourceSnapshot> = serde_json::from_str(&source).map_err(|e| {
            ServerError::Config(format!("inventory seed {}: {e}", path.display()))
        })?;
        let count = snapshots.len();
        for snapshot in snapshots {
            inventory.insert(snapshot);
        }
        info!(path = %path.display(), resources = count, "inventory seeded");
    }
    Ok(inventory)
}

/// Assemble the orchestrator described by `config`.
pub fn build_engine(config: &RemedyConfig) -> Result<RemediationOrchestrator, ServerError> {
    let state = create_state(&config.state)?;
    let policy = load_policy(config.policy.path.as_deref())?;
    let inventory = create_inventory(config.inventory.seed.as_deref())?;
    let approvals = create_approval_workflow(&config.approval)?;

    info!(
        state = ?config.state.backend,
        policy_version = policy.version,
        approval = ?config.approval.workflow,
        "building remediation engine"
    );

    let mut builder = OrchestratorBuilder::new()
        .state(state)
        .audit(Arc::new(MemoryAuditStore::new()))
        .inventory(inventory)
        .policy(policy)
        .approval_workflow(approvals)
        .executor_config(config.executor.to_retry_config());
    if let Some(namespace) = &config.state.namespace {
        builder = builder.namespace(namespace.clone());
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use remedy_executor::ResourceRef;

    use super::*;

    #[test]
    fn default_config_builds() {
        let engine = build_engine(&RemedyConfig::default()).unwrap();
        assert_eq!(engine.registry().len(), 3);
        assert_eq!(engine.policy().version, 1);
    }

    #[test]
    fn shipped_sample_configuration_is_valid() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config");
        let config = RemedyConfig::load(root.join("remedy.toml")).unwrap();
        assert!(config.policy.path.is_some());

        let policy = load_policy(Some(&root.join("policy.toml"))).unwrap();
        assert!(policy.requires_approval("acme", "BLOCK_PUBLIC_ACCESS"));
        assert!(!policy.requires_approval("globex", "BLOCK_PUBLIC_ACCESS"));

        let inventory = create_inventory(Some(&root.join("inventory.json"))).unwrap();
        assert!(
            inventory
                .get(&ResourceRef::new("000000000000", "us-east-1", "IAM_ROLE", "ci-deployer"))
                .is_some()
        );
    }

    #[test]
    fn webhook_without_url_is_rejected() {
        let config = ApprovalConfig {
            workflow: ApprovalBackend::Webhook,
            ..ApprovalConfig::default()
        };
        assert!(matches!(
            create_approval_workflow(&config),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn missing_policy_file_is_configuration_error() {
        let err = load_policy(Some(Path::new("/no/such/policy.toml"))).unwrap_err();
        assert!(matches!(err, ServerError::Config(msg) if msg.contains("policy.toml")));
    }

    #[test]
    fn inventory_is_seeded_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{
                "resource": {{
                    "account_id": "000000000000",
                    "region": "us-east-1",
                    "resource_type": "S3_BUCKET",
                    "resource_id": "logs"
                }},
                "tags": {{ "environment": "production" }}
            }}]"#
        )
        .unwrap();

        let inventory = create_inventory(Some(file.path())).unwrap();
        let snapshot = inventory
            .get(&ResourceRef::new("000000000000", "us-east-1", "S3_BUCKET", "logs"))
            .unwrap();
        assert_eq!(snapshot.tag("environment"), Some("production"));
    }

    #[test]
    fn malformed_seed_is_configuration_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            create_inventory(Some(file.path())),
            Err(ServerError::Config(_))
        ));
    }
}
