//! Notifying humans that a job waits for approval.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use remedy_core::{JobId, RemediationJob, RiskLevel, TenantId};

/// Errors from an approval workflow. The orchestrator logs them and moves on.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("approval request could not be delivered: {0}")]
    Transport(String),

    #[error("approval endpoint rejected the request with status {0}")]
    Rejected(u16),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Hands a `PENDING_APPROVAL` job to whatever collects human decisions.
///
/// Delivery is fire-and-forget: the job is already persisted when this runs.
#[async_trait]
pub trait ApprovalWorkflow: Send + Sync {
    async fn request_approval(&self, job: &RemediationJob) -> Result<(), ApprovalError>;
}

/// The payload sent to approvers.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalSummary<'a> {
    pub job_id: &'a JobId,
    pub tenant_id: &'a TenantId,
    pub finding_id: &'a str,
    pub remediation_type: &'a str,
    pub resource_type: &'a str,
    pub resource_id: &'a str,
    pub region: &'a str,
    pub requested_by: &'a str,
    pub risk_level: Option<RiskLevel>,
    pub failed_checks: Vec<&'a str>,
}

impl<'a> ApprovalSummary<'a> {
    #[must_use]
    pub fn from_job(job: &'a RemediationJob) -> Self {
        let request = &job.request;
        Self {
            job_id: &job.id,
            tenant_id: &request.tenant_id,
            finding_id: &request.finding_id,
            remediation_type: &request.remediation_type,
            resource_type: &request.resource_type,
            resource_id: &request.resource_id,
            region: &request.region,
            requested_by: &request.requested_by,
            risk_level: job.estimated_impact.as_ref().map(|i| i.risk_level),
            failed_checks: job
                .safety_checks
                .iter()
                .flat_map(|r| r.failures().map(|c| c.name.as_str()))
                .collect(),
        }
    }
}

/// Records approval requests as structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogApprovalWorkflow;

#[async_trait]
impl ApprovalWorkflow for LogApprovalWorkflow {
    async fn request_approval(&self, job: &RemediationJob) -> Result<(), ApprovalError> {
        let summary = ApprovalSummary::from_job(job);
        info!(
            job.id = %summary.job_id,
            tenant = %summary.tenant_id,
            remediation_type = summary.remediation_type,
            resource_id = summary.resource_id,
            risk = ?summary.risk_level,
            failed_checks = ?summary.failed_checks,
            "remediation awaiting approval"
        );
        Ok(())
    }
}

/// POSTs an [`ApprovalSummary`] as JSON to a fixed URL.
pub struct WebhookApprovalWorkflow {
    url: String,
    client: Client,
    headers: HashMap<String, String>,
}

impl WebhookApprovalWorkflow {
    /// Uses a client with a 10 second timeout and no extra headers.
    pub fn new(url: impl Into<String>) -> Result<Self, ApprovalError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApprovalError::Transport(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
            headers: HashMap::new(),
        })
    }

    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ApprovalWorkflow for WebhookApprovalWorkflow {
    async fn request_approval(&self, job: &RemediationJob) -> Result<(), ApprovalError> {
        let body = serde_json::to_value(ApprovalSummary::from_job(job))
            .map_err(|e| ApprovalError::Serialization(e.to_string()))?;

        let mut request = self.client.post(&self.url).json(&body);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApprovalError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ApprovalError::Rejected(status.as_u16()))
        }
    }
}
