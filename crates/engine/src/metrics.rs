use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters tracking remediation outcomes.
///
/// All counters use relaxed ordering. For a consistent point-in-time view,
/// call [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Requests accepted for validation.
    pub requested: AtomicU64,
    /// Jobs the gate approved without a human.
    pub auto_applied: AtomicU64,
    /// Jobs routed to human approval.
    pub pending_approval: AtomicU64,
    /// Jobs approved by a human.
    pub approved: AtomicU64,
    /// Jobs that reached `APPLIED`.
    pub applied: AtomicU64,
    /// Jobs that reached `FAILED`.
    pub failed: AtomicU64,
    /// Jobs that reached `ROLLED_BACK`.
    pub rolled_back: AtomicU64,
    /// Rollbacks that restored only part of the changes.
    pub partial_rollbacks: AtomicU64,
    /// Requests rejected because the active slot was taken.
    pub conflicts: AtomicU64,
    /// Audit entries that could not be written.
    pub audit_failures: AtomicU64,
}

impl EngineMetrics {
    pub fn increment_requested(&self) {
        self.requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_auto_applied(&self) {
        self.auto_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_pending_approval(&self) {
        self.pending_approval.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_approved(&self) {
        self.approved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_applied(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rolled_back(&self) {
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_partial_rollbacks(&self) {
        self.partial_rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_conflicts(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_audit_failures(&self) {
        self.audit_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requested: self.requested.load(Ordering::Relaxed),
            auto_applied: self.auto_applied.load(Ordering::Relaxed),
            pending_approval: self.pending_approval.load(Ordering::Relaxed),
            approved: self.approved.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            partial_rollbacks: self.partial_rollbacks.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            audit_failures: self.audit_failures.load(Ordering::Relaxed),
        }
    }
}

/// A plain data snapshot of [`EngineMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requested: u64,
    pub auto_applied: u64,
    pub pending_approval: u64,
    pub approved: u64,
    pub applied: u64,
    pub failed: u64,
    pub rolled_back: u64,
    pub partial_rollbacks: u64,
    pub conflicts: u64,
    pub audit_failures: u64,
}
