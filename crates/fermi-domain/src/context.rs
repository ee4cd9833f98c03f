//! Request context and identifiers

use std::collections::BTreeMap;
use std::fmt;

/// Identifier for one top-level estimation call
///
/// Backed by UUIDv7 so identifiers sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u128);

impl RequestId {
    /// Generate a new time-ordered identifier
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7().as_u128())
    }

    /// Raw 128-bit value
    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", uuid::Uuid::from_u128(self.0))
    }
}

/// Immutable per-request scope
///
/// Created once per top-level call and passed unchanged into every
/// recursive sub-call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    /// Domain tag, e.g. `B2B_SaaS`
    pub domain: Option<String>,
    /// Geographic scope
    pub region: Option<String>,
    /// Time scope, e.g. `2024`
    pub time_period: Option<String>,
    /// Caller-supplied literal facts
    pub project_data: BTreeMap<String, f64>,
    /// Fixed domain constants such as population figures
    pub constants: BTreeMap<String, f64>,
}

impl Context {
    /// Empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the domain tag
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set the region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the time period
    pub fn with_time_period(mut self, time_period: impl Into<String>) -> Self {
        self.time_period = Some(time_period.into());
        self
    }

    /// Add one project data fact
    pub fn with_project_value(mut self, key: impl Into<String>, value: f64) -> Self {
        self.project_data.insert(key.into(), value);
        self
    }

    /// Add one domain constant
    pub fn with_constant(mut self, key: impl Into<String>, value: f64) -> Self {
        self.constants.insert(key.into(), value);
        self
    }

    /// Reject non-finite project data or constants
    pub fn validate(&self) -> Result<(), String> {
        for (key, value) in self.project_data.iter().chain(self.constants.iter()) {
            if !value.is_finite() {
                return Err(format!("context value for {key:?} is not finite"));
            }
        }
        Ok(())
    }

    /// Case-insensitive constant lookup
    pub fn constant(&self, key: &str) -> Option<f64> {
        self.constants
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| *v)
    }

    /// Human-readable scope prefix, e.g. `["B2B SaaS", "Korea", "2024"]`
    pub fn scope_labels(&self) -> Vec<String> {
        let mut labels = Vec::new();
        if let Some(domain) = self.domain.as_deref() {
            let domain = domain.trim();
            if !domain.is_empty() && !domain.eq_ignore_ascii_case("general") {
                labels.push(domain.replace('_', " "));
            }
        }
        for part in [self.region.as_deref(), self.time_period.as_deref()]
            .into_iter()
            .flatten()
        {
            let part = part.trim();
            if !part.is_empty() {
                labels.push(part.to_string());
            }
        }
        labels
    }

    /// Sub-question for a variable: `"B2B SaaS adoption_rate?"`
    pub fn sub_question(&self, variable: &str) -> String {
        let mut parts = self.scope_labels();
        parts.push(variable.trim().to_string());
        format!("{}?", parts.join(" "))
    }
}

/// Normalize a question for exact-match comparison
///
/// Lowercases and collapses whitespace. Paraphrases are not unified.
pub fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_question_uses_domain_with_spaces() {
        let ctx = Context::new().with_domain("B2B_SaaS");
        assert_eq!(ctx.sub_question("adoption_rate"), "B2B SaaS adoption_rate?");
    }

    #[test]
    fn test_sub_question_includes_region_and_time() {
        let ctx = Context::new()
            .with_domain("Food_Service")
            .with_region("Seoul")
            .with_time_period("2024");
        assert_eq!(
            ctx.sub_question("restaurant_density"),
            "Food Service Seoul 2024 restaurant_density?"
        );
    }

    #[test]
    fn test_general_domain_is_omitted() {
        let ctx = Context::new().with_domain("General");
        assert_eq!(ctx.sub_question("x"), "x?");
    }

    #[test]
    fn test_normalize_question() {
        assert_eq!(
            normalize_question("  Seoul   Restaurant\tCount "),
            "seoul restaurant count"
        );
    }

    #[test]
    fn test_validate_rejects_nan() {
        let ctx = Context::new().with_project_value("employees", f64::NAN);
        assert!(ctx.validate().is_err());
        assert!(Context::new().with_constant("population", 1.0).validate().is_ok());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 36);
    }
}
