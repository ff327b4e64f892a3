use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::TenantId;

/// A caller's request to remediate one compliance finding on one resource.
///
/// Requests are immutable once submitted; the job keeps its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RemediationRequest {
    /// The compliance finding this remediation addresses.
    pub finding_id: String,
    /// What kind of fix to apply (e.g. `ENABLE_BUCKET_ENCRYPTION`).
    pub remediation_type: String,
    /// Identifier of the target resource.
    pub resource_id: String,
    /// Kind of the target resource (e.g. `S3_BUCKET`).
    pub resource_type: String,
    /// Cloud region the resource lives in.
    pub region: String,
    /// Cloud account owning the resource.
    pub account_id: String,
    /// Tenant that owns the finding.
    pub tenant_id: TenantId,
    /// Who asked for the remediation.
    pub requested_by: String,
    /// Caller opt-in to automatic application when guardrails allow it.
    #[serde(default)]
    pub auto_approve: bool,
    /// Report the would-be change without mutating the resource.
    #[serde(default)]
    pub dry_run: bool,
    /// Executor-specific parameters.
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub parameters: serde_json::Value,
}

impl RemediationRequest {
    /// Create a request with the required identifying fields. Flags default
    /// to `false` and parameters to `null`.
    #[must_use]
    pub fn new(
        finding_id: impl Into<String>,
        remediation_type: impl Into<String>,
        resource_id: impl Into<String>,
        resource_type: impl Into<String>,
        tenant_id: impl Into<TenantId>,
    ) -> Self {
        Self {
            finding_id: finding_id.into(),
            remediation_type: remediation_type.into(),
            resource_id: resource_id.into(),
            resource_type: resource_type.into(),
            region: "us-east-1".to_owned(),
            account_id: "000000000000".to_owned(),
            tenant_id: tenant_id.into(),
            requested_by: "system".to_owned(),
            auto_approve: false,
            dry_run: false,
            parameters: serde_json::Value::Null,
        }
    }

    /// Set the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set the account.
    #[must_use]
    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self
    }

    /// Set the requester.
    #[must_use]
    pub fn with_requested_by(mut self, requested_by: impl Into<String>) -> Self {
        self.requested_by = requested_by.into();
        self
    }

    /// Set the auto-approve flag.
    #[must_use]
    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    /// Set the dry-run flag.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set executor parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Key of the active-job slot this request competes for:
    /// `(tenant_id, resource_id, remediation_type)`.
    #[must_use]
    pub fn resource_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.tenant_id, self.resource_id, self.remediation_type
        )
    }

    /// Look up a string parameter by name.
    #[must_use]
    pub fn parameter_str(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(serde_json::Value::as_str)
    }

    /// Check that the request is well-formed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("finding_id", self.finding_id.as_str()),
            ("remediation_type", self.remediation_type.as_str()),
            ("resource_id", self.resource_id.as_str()),
            ("resource_type", self.resource_type.as_str()),
            ("region", self.region.as_str()),
            ("account_id", self.account_id.as_str()),
            ("tenant_id", self.tenant_id.as_str()),
            ("requested_by", self.requested_by.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField(field));
            }
        }
        if !(self.parameters.is_null() || self.parameters.is_object()) {
            return Err(ValidationError::InvalidField {
                field: "parameters",
                reason: "must be a JSON object".into(),
            });
        }
        Ok(())
    }
}
