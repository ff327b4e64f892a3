pub mod audit;
pub mod context;
pub mod error;
pub mod impact;
pub mod job;
pub mod outcome;
pub mod request;
pub mod safety;
pub mod types;

pub use audit::AuditLogEntry;
pub use context::RequestContext;
pub use error::ValidationError;
pub use impact::{ImpactEstimate, RiskLevel};
pub use job::{JobStatus, RemediationJob};
pub use outcome::{Change, RemediationResult, RollbackDescriptor, RollbackResult};
pub use request::RemediationRequest;
pub use safety::{SafetyCheck, SafetyCheckResult, Severity};
pub use types::{CorrelationId, JobId, TenantId};
