use serde::{Deserialize, Serialize};

use crate::types::{CorrelationId, TenantId};

/// Who is calling and on whose behalf. Every engine operation takes one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub tenant_id: TenantId,
    pub correlation_id: CorrelationId,
    /// Principal recorded in audit entries.
    pub actor: String,
}

impl RequestContext {
    /// Create a context with a freshly generated correlation id.
    #[must_use]
    pub fn new(tenant_id: impl Into<TenantId>, actor: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            correlation_id: CorrelationId::generate(),
            actor: actor.into(),
        }
    }

    /// Use a caller-supplied correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<CorrelationId>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Same tenant and correlation, different actor.
    #[must_use]
    pub fn as_actor(&self, actor: impl Into<String>) -> Self {
        Self {
            tenant_id: self.tenant_id.clone(),
            correlation_id: self.correlation_id.clone(),
            actor: actor.into(),
        }
    }
}
