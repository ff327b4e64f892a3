use serde::{Deserialize, Serialize};

/// Predicted blast-radius tier of a fix.
///
/// Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
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

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicted impact of applying a remediation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ImpactEstimate {
    pub risk_level: RiskLevel,
    /// Number of resources touched, including the target.
    pub affected_resources: u32,
    /// Whether the change is expected to cause downtime.
    pub downtime: bool,
    /// Monthly cost delta in account currency. Negative means savings.
    pub cost_impact: f64,
    pub description: String,
    pub mitigations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_ordering_and_max() {
        let tiers = [RiskLevel::Medium, RiskLevel::Low, RiskLevel::High];
        assert_eq!(tiers.iter().copied().max(), Some(RiskLevel::High));
    }

    #[test]
    fn risk_parses_uppercase() {
        let tier: RiskLevel = serde_json::from_str("\"MEDIUM\"").unwrap();
        assert_eq!(tier, RiskLevel::Medium);
    }
}
