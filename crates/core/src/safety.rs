use serde::{Deserialize, Serialize};

/// Severity a guardrail declares for its own failure.
///
/// Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Return the wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single guardrail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SafetyCheck {
    /// Guardrail name.
    pub name: String,
    /// Whether the pre-condition held.
    pub passed: bool,
    /// Human-readable explanation.
    pub message: String,
    /// Severity declared by the guardrail.
    pub severity: Severity,
}

impl SafetyCheck {
    /// A passing check.
    #[must_use]
    pub fn pass(name: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            severity,
        }
    }

    /// A failing check.
    #[must_use]
    pub fn fail(name: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            severity,
        }
    }
}

/// Ordered results of the guardrail battery.
///
/// `passed` is the conjunction of every check; per-check severity is kept
/// so the approval gate can tell an advisory failure from a blocking one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SafetyCheckResult {
    pub checks: Vec<SafetyCheck>,
    pub passed: bool,
}

impl SafetyCheckResult {
    /// Build a result from checks in evaluation order.
    #[must_use]
    pub fn new(checks: Vec<SafetyCheck>) -> Self {
        let passed = checks.iter().all(|c| c.passed);
        Self { checks, passed }
    }

    /// Iterate over failed checks.
    pub fn failures(&self) -> impl Iterator<Item = &SafetyCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// Highest severity among failed checks, if any failed.
    #[must_use]
    pub fn highest_failed_severity(&self) -> Option<Severity> {
        self.failures().map(|c| c.severity).max()
    }

    /// Whether any check of exactly `severity` failed.
    #[must_use]
    pub fn has_failure_at(&self, severity: Severity) -> bool {
        self.failures().any(|c| c.severity == severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_passes() {
        let result = SafetyCheckResult::new(vec![]);
        assert!(result.passed);
        assert_eq!(result.highest_failed_severity(), None);
    }

    #[test]
    fn passed_is_conjunction() {
        let result = SafetyCheckResult::new(vec![
            SafetyCheck::pass("a", Severity::High, "ok"),
            SafetyCheck::fail("b", Severity::Low, "advisory"),
        ]);
        assert!(!result.passed);
        assert_eq!(result.highest_failed_severity(), Some(Severity::Low));
        assert!(!result.has_failure_at(Severity::High));
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
    }

    #[test]
    fn severity_wire_format() {
        let json = serde_json::to_string(&Severity::High).unwrap();
        assert_eq!(json, "\"HIGH\"");
    }
}
