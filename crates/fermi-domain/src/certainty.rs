//! Certainty tiers
//!
//! Stages report a coarse tier rather than a free-form probability. The
//! numeric confidence used by fusion and scoring is derived from the tier
//! by a [`CertaintyClassifier`], never elicited directly from a model.

use std::fmt;
use std::str::FromStr;

/// Coarse confidence classification
///
/// Ordered so that `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Certainty {
    /// Weak evidence or a last-resort guess
    Low,
    /// Plausible but not corroborated
    Medium,
    /// Direct evidence or strong agreement
    High,
}

impl Certainty {
    /// Lowercase tag used in prompts and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Certainty::High => "high",
            Certainty::Medium => "medium",
            Certainty::Low => "low",
        }
    }
}

impl fmt::Display for Certainty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Certainty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Certainty::High),
            "medium" => Ok(Certainty::Medium),
            "low" => Ok(Certainty::Low),
            other => Err(format!("unknown certainty tier: {other:?}")),
        }
    }
}

/// Default numeric weight of the `high` tier
pub const HIGH_WEIGHT: f64 = 0.90;
/// Default numeric weight of the `medium` tier
pub const MEDIUM_WEIGHT: f64 = 0.70;
/// Default numeric weight of the `low` tier
pub const LOW_WEIGHT: f64 = 0.45;

/// Maps tiers to numeric weights and numeric confidences back to tiers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CertaintyClassifier {
    /// Weight for `high`
    pub high: f64,
    /// Weight for `medium`
    pub medium: f64,
    /// Weight for `low`
    pub low: f64,
    /// Minimum confidence classified as `high`
    pub high_threshold: f64,
    /// Minimum confidence classified as `medium`
    pub medium_threshold: f64,
}

impl Default for CertaintyClassifier {
    fn default() -> Self {
        Self {
            high: HIGH_WEIGHT,
            medium: MEDIUM_WEIGHT,
            low: LOW_WEIGHT,
            high_threshold: 0.80,
            medium_threshold: 0.55,
        }
    }
}

impl CertaintyClassifier {
    /// Numeric weight for a tier
    pub fn weight(&self, certainty: Certainty) -> f64 {
        match certainty {
            Certainty::High => self.high,
            Certainty::Medium => self.medium,
            Certainty::Low => self.low,
        }
    }

    /// Tier for a numeric confidence
    pub fn classify(&self, confidence: f64) -> Certainty {
        if confidence >= self.high_threshold {
            Certainty::High
        } else if confidence >= self.medium_threshold {
            Certainty::Medium
        } else {
            Certainty::Low
        }
    }

    /// Check that weights and thresholds are ordered and within [0, 1]
    pub fn validate(&self) -> Result<(), String> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if ![self.high, self.medium, self.low, self.high_threshold, self.medium_threshold]
            .into_iter()
            .all(in_unit)
        {
            return Err("certainty weights and thresholds must lie in [0, 1]".to_string());
        }
        if !(self.high >= self.medium && self.medium >= self.low) {
            return Err("certainty weights must satisfy high >= medium >= low".to_string());
        }
        if self.medium_threshold > self.high_threshold {
            return Err("medium_threshold cannot exceed high_threshold".to_string());
        }
        Ok(())
    }
}
