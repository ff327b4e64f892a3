//! Remediation workflow engine.
//!
//! A request flows through the [`RemediationOrchestrator`]: guardrails and
//! the impact estimator inspect live resource state, the approval gate
//! decides between automatic application and human approval, and the
//! registered fix executor applies the change. Every status transition is
//! persisted in a [`JobStore`] and mirrored to an audit store.
//!
//! ```no_run
//! # async fn demo() -> Result<(), remedy_engine::EngineError> {
//! use std::sync::Arc;
//!
//! use remedy_audit_memory::MemoryAuditStore;
//! use remedy_core::{RemediationRequest, RequestContext};
//! use remedy_engine::OrchestratorBuilder;
//! use remedy_executor::MemoryInventory;
//! use remedy_state_memory::MemoryStateStore;
//!
//! let engine = OrchestratorBuilder::new()
//!     .state(Arc::new(MemoryStateStore::new()))
//!     .audit(Arc::new(MemoryAuditStore::new()))
//!     .inventory(Arc::new(MemoryInventory::new()))
//!     .build()?;
//!
//! let ctx = RequestContext::new("acme", "alice");
//! let request = RemediationRequest::new(
//!     "finding-42",
//!     "ENABLE_BUCKET_ENCRYPTION",
//!     "logs-bucket",
//!     "S3_BUCKET",
//!     "acme",
//! );
//! let job = engine.apply_remediation(&ctx, request).await?;
//! println!("{} is {}", job.id, job.status);
//! # Ok(())
//! # }
//! ```

pub mod approval;
pub mod builder;
pub mod error;
pub mod gate;
pub mod guardrail;
pub mod impact;
pub mod job_store;
pub mod metrics;
pub mod orchestrator;
pub mod policy;
pub mod rollback;

pub use approval::{ApprovalError, ApprovalSummary, ApprovalWorkflow, LogApprovalWorkflow, WebhookApprovalWorkflow};
pub use builder::{DEFAULT_NAMESPACE, OrchestratorBuilder};
pub use error::EngineError;
pub use gate::{ApprovalGate, GateDecision, GateOutcome};
pub use guardrail::{Guardrail, GuardrailContext, GuardrailEngine, Verdict};
pub use impact::ImpactEstimator;
pub use job_store::{JobPatch, JobStore, StateJobStore};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use orchestrator::{GATE_ACTOR, RemediationOrchestrator};
pub use policy::{Policy, PolicyError};
pub use rollback::RollbackManager;
