use serde::{Deserialize, Serialize};

/// One concrete mutation an executor performed, or would perform in a dry run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Change {
    /// What was done, e.g. `PutBucketEncryption`.
    pub action: String,
    /// Resource (or sub-resource) the change was made on.
    pub resource: String,
    /// Value before the change. `null` when the attribute did not exist.
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub before: serde_json::Value,
    /// Value after the change. `null` when the attribute was removed.
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub after: serde_json::Value,
}

impl Change {
    #[must_use]
    pub fn new(
        action: impl Into<String>,
        resource: impl Into<String>,
        before: serde_json::Value,
        after: serde_json::Value,
    ) -> Self {
        Self {
            action: action.into(),
            resource: resource.into(),
            before,
            after,
        }
    }
}

/// Everything needed to undo an applied remediation.
///
/// Only the executor named by `executor_kind` knows how to interpret
/// `before_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RollbackDescriptor {
    pub executor_kind: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub before_state: serde_json::Value,
    /// Operator guidance for manual recovery, one step per entry.
    #[serde(default)]
    pub instructions: Vec<String>,
}

/// Result of executing (or simulating) a remediation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RemediationResult {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub changes: Vec<Change>,
    /// Present only when a real mutation happened and can be reversed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackDescriptor>,
    /// Set when the result describes a simulated run.
    #[serde(default)]
    pub dry_run: bool,
}

impl RemediationResult {
    /// A failed result with no changes.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Whether this result carries a usable rollback descriptor.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.success && !self.dry_run && self.rollback.is_some()
    }
}

/// Result of attempting to reverse an applied remediation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RollbackResult {
    pub success: bool,
    /// Some, but not all, of the recorded changes were restored.
    #[serde(default)]
    pub partial_rollback: bool,
    pub message: String,
    /// Identifiers of the settings that were restored.
    #[serde(default)]
    pub restored: Vec<String>,
    /// Identifiers of the settings that could not be restored.
    #[serde(default)]
    pub failed: Vec<String>,
}

impl RollbackResult {
    /// Summarise per-setting outcomes. All restored is success, none restored
    /// is failure, anything in between is a partial rollback.
    #[must_use]
    pub fn from_parts(restored: Vec<String>, failed: Vec<String>) -> Self {
        let (success, partial_rollback, message) = match (restored.is_empty(), failed.is_empty()) {
            (_, true) => (true, false, format!("restored {} setting(s)", restored.len())),
            (true, false) => (false, false, format!("failed to restore {} setting(s)", failed.len())),
            (false, false) => (
                false,
                true,
                format!(
                    "restored {} setting(s), failed to restore: {}",
                    restored.len(),
                    failed.join(", ")
                ),
            ),
        };
        Self {
            success,
            partial_rollback,
            message,
            restored,
            failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_result_is_not_reversible() {
        let result = RemediationResult {
            success: true,
            dry_run: true,
            rollback: Some(RollbackDescriptor {
                executor_kind: "x".into(),
                before_state: serde_json::Value::Null,
                instructions: vec![],
            }),
            ..RemediationResult::default()
        };
        assert!(!result.is_reversible());
    }

    #[test]
    fn rollback_summary_all_restored() {
        let result = RollbackResult::from_parts(vec!["a".into(), "b".into()], vec![]);
        assert!(result.success);
        assert!(!result.partial_rollback);
    }

    #[test]
    fn rollback_summary_partial() {
        let result = RollbackResult::from_parts(vec!["a".into()], vec!["b".into()]);
        assert!(!result.success);
        assert!(result.partial_rollback);
        assert!(result.message.contains('b'));
    }

    #[test]
    fn rollback_summary_nothing_restored() {
        let result = RollbackResult::from_parts(vec![], vec!["a".into()]);
        assert!(!result.success);
        assert!(!result.partial_rollback);
    }

    #[test]
    fn descriptor_omitted_when_absent() {
        let json = serde_json::to_value(RemediationResult::failure("boom")).unwrap();
        assert!(json.get("rollback").is_none());
    }
}
