use serde::{Deserialize, Serialize};

use crate::calc::CalcError;
use crate::subjects::CANONICAL_CODES;

pub const POLICY_SETTINGS_KEY: &str = "grading.policy";

/// Subject-selection policy applied by the aggregator.
///
/// Stored as JSON in the workspace settings table; any field missing from the
/// stored document falls back to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradingPolicy {
    pub main_codes: Vec<String>,
    /// Codes that are always optional even when listed in `main_codes`.
    pub forced_optional_codes: Vec<String>,
    pub main_full_marks: f64,
    pub optional_slots: usize,
    pub optional_full_marks: f64,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            main_codes: ["bn", "en", "ma", "sc", "bwp", "ism", "hin"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            forced_optional_codes: vec!["phy".to_string()],
            main_full_marks: 100.0,
            optional_slots: 3,
            optional_full_marks: 50.0,
        }
    }
}

impl GradingPolicy {
    pub fn is_main(&self, code: &str) -> bool {
        if self.forced_optional_codes.iter().any(|c| c == code) {
            return false;
        }
        self.main_codes.iter().any(|c| c == code)
    }

    pub fn optional_subject_total(&self) -> f64 {
        self.optional_slots as f64 * self.optional_full_marks
    }

    /// Full marks of a single subject under this policy.
    pub fn subject_full_marks(&self, code: &str) -> f64 {
        if self.is_main(code) {
            self.main_full_marks
        } else {
            self.optional_full_marks
        }
    }

    pub fn validate(&self) -> Result<(), CalcError> {
        if self.main_full_marks <= 0.0 || self.optional_full_marks <= 0.0 {
            return Err(CalcError::new(
                "bad_params",
                "policy full marks must be positive",
            ));
        }
        if self.optional_slots > CANONICAL_CODES.len() {
            return Err(CalcError::new(
                "bad_params",
                format!(
                    "policy.optionalSlots must be at most {}",
                    CANONICAL_CODES.len()
                ),
            )
            .with_details(serde_json::json!({ "optionalSlots": self.optional_slots })));
        }
        if self.main_codes.is_empty() {
            return Err(CalcError::new(
                "bad_params",
                "policy.mainCodes must not be empty",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_education_is_never_main() {
        let mut policy = GradingPolicy::default();
        policy.main_codes.push("phy".to_string());
        assert!(!policy.is_main("phy"));
        assert!(policy.is_main("bwp"));
        assert_eq!(policy.subject_full_marks("phy"), 50.0);
    }

    #[test]
    fn partial_policy_json_fills_defaults() {
        let raw = serde_json::json!({ "optionalSlots": 2 });
        let policy: GradingPolicy = serde_json::from_value(raw).expect("parse policy");
        assert_eq!(policy.optional_slots, 2);
        assert_eq!(policy.main_codes.len(), 7);
        assert_eq!(policy.optional_subject_total(), 100.0);
    }

    #[test]
    fn optional_slots_are_bounded_by_the_subject_catalogue() {
        let mut policy = GradingPolicy::default();
        policy.optional_slots = CANONICAL_CODES.len();
        assert!(policy.validate().is_ok());
        policy.optional_slots = 1_000_000_000_000_000;
        let e = policy.validate().expect_err("oversized");
        assert_eq!(e.code, "bad_params");
    }
}
