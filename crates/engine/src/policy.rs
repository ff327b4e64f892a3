//! The versioned policy artifact that drives guardrails, risk tiers and
//! approval requirements.
//!
//! Policies are TOML documents:
//!
//! ```toml
//! version = 3
//! default_risk = "MEDIUM"
//!
//! [[guardrails]]
//! name = "resource_exists"
//!
//! [[guardrails]]
//! name = "region_allowed"
//! severity = "HIGH"
//! options = { regions = ["eu-west-1"] }
//!
//! [[risk]]
//! remediation_type = "ENABLE_BUCKET_ENCRYPTION"
//! base = "LOW"
//! production = "MEDIUM"
//! fan_in_threshold = 10
//! fan_in = "MEDIUM"
//!
//! [approval]
//! always = ["DETACH_ADMIN_POLICY"]
//! tenants = { acme = ["BLOCK_PUBLIC_ACCESS"] }
//!
//! [production]
//! tag_keys = ["environment"]
//! tag_values = ["prod", "production"]
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use remedy_core::{RiskLevel, Severity};
use remedy_executor::ResourceSnapshot;

/// Names of the guardrails the engine knows how to build.
pub const GUARDRAIL_NAMES: [&str; 5] = [
    "resource_exists",
    "production_tag",
    "protected_resource",
    "no_concurrent_remediation",
    "region_allowed",
];

/// Errors raised while loading or validating a policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to read policy file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("failed to parse policy: {0}")]
    Parse(String),

    #[error("invalid policy: {0}")]
    Invalid(String),
}

/// A complete remediation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Monotonic artifact version, recorded in audit details.
    pub version: u32,
    /// Tier for remediation types with no `[[risk]]` row.
    #[serde(default = "default_risk")]
    pub default_risk: RiskLevel,
    /// Guardrails to run, in order.
    #[serde(default = "default_guardrails")]
    pub guardrails: Vec<GuardrailRule>,
    #[serde(default)]
    pub risk: Vec<RiskRule>,
    #[serde(default)]
    pub approval: ApprovalRules,
    #[serde(default)]
    pub production: ProductionRules,
}

/// One guardrail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailRule {
    pub name: String,
    /// Overrides the guardrail's built-in severity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub options: GuardrailOptions,
}

impl GuardrailRule {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            severity: None,
            enabled: true,
            options: GuardrailOptions::default(),
        }
    }
}

/// Guardrail-specific settings. Each guardrail reads only its own fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardrailOptions {
    /// `region_allowed`: permitted regions. Empty allows any region.
    #[serde(default)]
    pub regions: Vec<String>,
    /// `protected_resource`: resource ids that must never be auto-remediated.
    #[serde(default)]
    pub deny_list: Vec<String>,
}

/// Risk tiers for one remediation type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskRule {
    pub remediation_type: String,
    pub base: RiskLevel,
    /// Tier when the resource is production-tagged. Falls back to
    /// `[production].tier`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production: Option<RiskLevel>,
    /// Dependents count at or above which `fan_in` applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_in_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_in: Option<RiskLevel>,
}

/// Remediation types that always require a human, regardless of risk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRules {
    /// Applies to every tenant.
    #[serde(default)]
    pub always: Vec<String>,
    /// Extra types per tenant id, added to `always`.
    #[serde(default)]
    pub tenants: BTreeMap<String, Vec<String>>,
}

/// How production resources are recognised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRules {
    /// Tag keys to inspect (case-insensitive).
    #[serde(default = "default_tag_keys")]
    pub tag_keys: Vec<String>,
    /// Tag values that mark production (case-insensitive).
    #[serde(default = "default_tag_values")]
    pub tag_values: Vec<String>,
    /// Tier for production resources when the risk row has none.
    #[serde(default = "default_production_tier")]
    pub tier: RiskLevel,
}

impl Default for ProductionRules {
    fn default() -> Self {
        Self {
            tag_keys: default_tag_keys(),
            tag_values: default_tag_values(),
            tier: default_production_tier(),
        }
    }
}

impl ProductionRules {
    /// Whether the snapshot carries a production tag.
    #[must_use]
    pub fn matches(&self, snapshot: &ResourceSnapshot) -> bool {
        self.tag_keys.iter().any(|key| {
            snapshot.tag(key).is_some_and(|value| {
                self.tag_values
                    .iter()
                    .any(|prod| prod.eq_ignore_ascii_case(value.trim()))
            })
        })
    }
}

fn enabled() -> bool {
    true
}

fn default_risk() -> RiskLevel {
    RiskLevel::Medium
}

fn default_production_tier() -> RiskLevel {
    RiskLevel::Medium
}

fn default_tag_keys() -> Vec<String> {
    vec!["environment".into(), "env".into(), "stage".into()]
}

fn default_tag_values() -> Vec<String> {
    vec!["prod".into(), "production".into()]
}

fn default_guardrails() -> Vec<GuardrailRule> {
    GUARDRAIL_NAMES.iter().map(|n| GuardrailRule::named(n)).collect()
}

impl Default for Policy {
    /// The built-in policy used when no artifact is configured.
    fn default() -> Self {
        Self {
            version: 1,
            default_risk: default_risk(),
            guardrails: default_guardrails(),
            risk: vec![
                RiskRule {
                    remediation_type: "ENABLE_BUCKET_ENCRYPTION".into(),
                    base: RiskLevel::Low,
                    production: Some(RiskLevel::Medium),
                    fan_in_threshold: Some(10),
                    fan_in: Some(RiskLevel::Medium),
                },
                RiskRule {
                    remediation_type: "BLOCK_PUBLIC_ACCESS".into(),
                    base: RiskLevel::Low,
                    production: Some(RiskLevel::High),
                    fan_in_threshold: Some(5),
                    fan_in: Some(RiskLevel::Medium),
                },
                RiskRule {
                    remediation_type: "DETACH_ADMIN_POLICY".into(),
                    base: RiskLevel::High,
                    production: None,
                    fan_in_threshold: None,
                    fan_in: None,
                },
            ],
            approval: ApprovalRules::default(),
            production: ProductionRules::default(),
        }
    }
}

impl Policy {
    /// Parse and validate a policy document.
    pub fn from_toml_str(source: &str) -> Result<Self, PolicyError> {
        let policy: Self = toml::from_str(source).map_err(|e| PolicyError::Parse(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Read, parse and validate a policy file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| PolicyError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.version == 0 {
            return Err(PolicyError::Invalid("version must be at least 1".into()));
        }

        let mut seen = HashSet::new();
        for rule in &self.guardrails {
            if !GUARDRAIL_NAMES.contains(&rule.name.as_str()) {
                return Err(PolicyError::Invalid(format!(
                    "unknown guardrail: {}",
                    rule.name
                )));
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(PolicyError::Invalid(format!(
                    "guardrail listed twice: {}",
                    rule.name
                )));
            }
        }

        let mut types = HashSet::new();
        for row in &self.risk {
            if row.remediation_type.trim().is_empty() {
                return Err(PolicyError::Invalid(
                    "risk row with empty remediation_type".into(),
                ));
            }
            if !types.insert(row.remediation_type.as_str()) {
                return Err(PolicyError::Invalid(format!(
                    "duplicate risk row for {}",
                    row.remediation_type
                )));
            }
            if row.fan_in.is_some() != row.fan_in_threshold.is_some() {
                return Err(PolicyError::Invalid(format!(
                    "risk row {} must set both fan_in and fan_in_threshold",
                    row.remediation_type
                )));
            }
        }

        if self.production.tag_keys.is_empty() {
            return Err(PolicyError::Invalid(
                "production.tag_keys must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// The risk row for a remediation type, if configured.
    #[must_use]
    pub fn risk_rule(&self, remediation_type: &str) -> Option<&RiskRule> {
        self.risk
            .iter()
            .find(|row| row.remediation_type == remediation_type)
    }

    /// Whether `tenant` must always approve `remediation_type` by hand.
    #[must_use]
    pub fn requires_approval(&self, tenant: &str, remediation_type: &str) -> bool {
        let listed = |types: &Vec<String>| types.iter().any(|t| t == remediation_type);
        listed(&self.approval.always) || self.approval.tenants.get(tenant).is_some_and(listed)
    }
}

#[cfg(test)]
mod tests {
    use remedy_executor::ResourceRef;

    use super::*;

    #[test]
    fn default_policy_is_valid() {
        let policy = Policy::default();
        policy.validate().unwrap();
        assert_eq!(policy.guardrails.len(), GUARDRAIL_NAMES.len());
        assert_eq!(
            policy.risk_rule("DETACH_ADMIN_POLICY").map(|r| r.base),
            Some(RiskLevel::High)
        );
    }

    #[test]
    fn parses_full_document() {
        let policy = Policy::from_toml_str(
            r#"
            version = 3
            default_risk = "HIGH"

            [[guardrails]]
            name = "region_allowed"
            severity = "HIGH"
            options = { regions = ["eu-west-1"] }

            [[guardrails]]
            name = "resource_exists"
            enabled = false

            [[risk]]
            remediation_type = "ENABLE_BUCKET_ENCRYPTION"
            base = "LOW"
            fan_in_threshold = 2
            fan_in = "HIGH"

            [approval]
            always = ["DETACH_ADMIN_POLICY"]
            tenants = { acme = ["BLOCK_PUBLIC_ACCESS"] }

            [production]
            tag_keys = ["tier"]
            tag_values = ["gold"]
            "#,
        )
        .unwrap();

        assert_eq!(policy.version, 3);
        assert_eq!(policy.default_risk, RiskLevel::High);
        assert_eq!(policy.guardrails[0].name, "region_allowed");
        assert_eq!(policy.guardrails[0].options.regions, vec!["eu-west-1"]);
        assert!(!policy.guardrails[1].enabled);
        assert_eq!(policy.production.tier, RiskLevel::Medium);
        assert!(policy.requires_approval("acme", "BLOCK_PUBLIC_ACCESS"));
        assert!(policy.requires_approval("globex", "DETACH_ADMIN_POLICY"));
        assert!(!policy.requires_approval("globex", "BLOCK_PUBLIC_ACCESS"));
    }

    #[test]
    fn missing_guardrails_key_uses_builtin_set() {
        let policy = Policy::from_toml_str("version = 1").unwrap();
        let names: Vec<_> = policy.guardrails.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, GUARDRAIL_NAMES);
    }

    #[test]
    fn rejects_unknown_guardrail() {
        let err = Policy::from_toml_str(
            r#"
            version = 1
            [[guardrails]]
            name = "moon_phase"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::Invalid(msg) if msg.contains("moon_phase")));
    }

    #[test]
    fn rejects_duplicate_guardrail_and_half_fan_in() {
        let dup = Policy::from_toml_str(
            r#"
            version = 1
            [[guardrails]]
            name = "region_allowed"
            [[guardrails]]
            name = "region_allowed"
            "#,
        );
        assert!(matches!(dup, Err(PolicyError::Invalid(_))));

        let half = Policy::from_toml_str(
            r#"
            version = 1
            [[risk]]
            remediation_type = "X"
            base = "LOW"
            fan_in = "HIGH"
            "#,
        );
        assert!(matches!(half, Err(PolicyError::Invalid(_))));
    }

    #[test]
    fn rejects_version_zero_and_bad_toml() {
        assert!(matches!(
            Policy::from_toml_str("version = 0"),
            Err(PolicyError::Invalid(_))
        ));
        assert!(matches!(
            Policy::from_toml_str("version = "),
            Err(PolicyError::Parse(_))
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Policy::load("/nonexistent/remedy-policy.toml").unwrap_err();
        assert!(matches!(err, PolicyError::Io { .. }));
    }

    #[test]
    fn production_tag_matching_ignores_case() {
        let rules = ProductionRules::default();
        let resource = ResourceRef::new("1", "us-east-1", "S3_BUCKET", "b");
        let prod = ResourceSnapshot::new(resource.clone()).with_tag("Environment", "PROD");
        let dev = ResourceSnapshot::new(resource.clone()).with_tag("environment", "dev");
        assert!(rules.matches(&prod));
        assert!(!rules.matches(&dev));
        assert!(!rules.matches(&ResourceSnapshot::new(resource)));
    }
}
