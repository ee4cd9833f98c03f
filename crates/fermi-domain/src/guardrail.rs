//! Guardrails: bounds on an answer discovered from evidence

use std::fmt;

/// Confidence assigned to guardrails derived from logical necessity
pub const HARD_CONFIDENCE: f64 = 0.95;

/// Confidence assigned to guardrails derived from empirical patterns
pub const SOFT_CONFIDENCE: f64 = 0.75;

/// Kind of bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardrailType {
    /// Answer can never exceed the value
    HardUpper,
    /// Answer can never fall below the value
    HardLower,
    /// Answer usually stays below the value
    SoftUpper,
    /// Answer usually stays above the value
    SoftLower,
    /// Answer usually falls inside a range
    ExpectedRange,
}

impl GuardrailType {
    /// Whether this kind follows from logical necessity
    pub fn is_hard(&self) -> bool {
        matches!(self, GuardrailType::HardUpper | GuardrailType::HardLower)
    }

    /// Kind for a bound direction and strictness
    pub fn from_direction(upper: bool, hard: bool) -> Self {
        match (upper, hard) {
            (true, true) => GuardrailType::HardUpper,
            (true, false) => GuardrailType::SoftUpper,
            (false, true) => GuardrailType::HardLower,
            (false, false) => GuardrailType::SoftLower,
        }
    }
}

impl fmt::Display for GuardrailType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GuardrailType::HardUpper => "HARD_UPPER",
            GuardrailType::HardLower => "HARD_LOWER",
            GuardrailType::SoftUpper => "SOFT_UPPER",
            GuardrailType::SoftLower => "SOFT_LOWER",
            GuardrailType::ExpectedRange => "EXPECTED_RANGE",
        };
        f.write_str(s)
    }
}

/// A single constraint on the answer
#[derive(Debug, Clone, PartialEq)]
pub struct Guardrail {
    /// Kind of bound
    pub kind: GuardrailType,
    /// Bound value (lower end for `ExpectedRange`)
    pub value: f64,
    /// Upper end for `ExpectedRange`
    pub upper: Option<f64>,
    /// Confidence in the bound
    pub confidence: f64,
    /// Why the bound holds
    pub reasoning: String,
    /// Where the bound came from
    pub source: String,
}

impl Guardrail {
    /// Single-sided bound with the default confidence for its kind
    pub fn new(
        kind: GuardrailType,
        value: f64,
        reasoning: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            value,
            upper: None,
            confidence: if kind.is_hard() {
                HARD_CONFIDENCE
            } else {
                SOFT_CONFIDENCE
            },
            reasoning: reasoning.into(),
            source: source.into(),
        }
    }

    /// Hard upper bound
    pub fn hard_upper(value: f64, reasoning: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(GuardrailType::HardUpper, value, reasoning, source)
    }

    /// Hard lower bound
    pub fn hard_lower(value: f64, reasoning: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(GuardrailType::HardLower, value, reasoning, source)
    }

    /// Soft expected range `[low, high]`
    pub fn expected_range(
        low: f64,
        high: f64,
        reasoning: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            upper: Some(high),
            ..Self::new(GuardrailType::ExpectedRange, low, reasoning, source)
        }
    }

    /// Whether the bound is logically inviolable; follows from the kind
    pub fn is_hard(&self) -> bool {
        self.kind.is_hard()
    }

    /// Whether the bound values are usable
    pub fn is_well_formed(&self) -> bool {
        self.value.is_finite()
            && match (self.kind, self.upper) {
                (GuardrailType::ExpectedRange, Some(high)) => {
                    high.is_finite() && high >= self.value
                }
                (GuardrailType::ExpectedRange, None) => false,
                _ => true,
            }
    }

    /// Whether a value satisfies this bound
    pub fn admits(&self, value: f64) -> bool {
        match self.kind {
            GuardrailType::HardUpper | GuardrailType::SoftUpper => value <= self.value,
            GuardrailType::HardLower | GuardrailType::SoftLower => value >= self.value,
            GuardrailType::ExpectedRange => {
                value >= self.value && self.upper.map_or(true, |high| value <= high)
            }
        }
    }
}

/// Tightest hard interval known so far
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HardBounds {
    /// Greatest hard lower bound
    pub lower: Option<f64>,
    /// Smallest hard upper bound
    pub upper: Option<f64>,
}

impl HardBounds {
    /// Whether no bound is known
    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    /// Whether the lower bound does not exceed the upper bound
    pub fn is_consistent(&self) -> bool {
        match (self.lower, self.upper) {
            (Some(lower), Some(upper)) => lower <= upper,
            _ => true,
        }
    }

    /// Clip a value into the interval
    ///
    /// Returns the clipped value and whether clipping changed it. When the
    /// bounds conflict the upper bound is applied last and wins.
    pub fn clamp(&self, value: f64) -> (f64, bool) {
        let mut clipped = value;
        if let Some(lower) = self.lower {
            if clipped < lower {
                clipped = lower;
            }
        }
        if let Some(upper) = self.upper {
            if clipped > upper {
                clipped = upper;
            }
        }
        (clipped, clipped != value)
    }

    /// Whether a value lies inside the interval
    pub fn contains(&self, value: f64) -> bool {
        self.lower.map_or(true, |l| value >= l) && self.upper.map_or(true, |u| value <= u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_by_kind() {
        let hard = Guardrail::hard_upper(100.0, "part <= whole", "test");
        assert!(hard.is_hard());
        assert_eq!(hard.confidence, HARD_CONFIDENCE);

        let soft = Guardrail::new(GuardrailType::SoftLower, 1.0, "usually", "test");
        assert!(!soft.is_hard());
        assert_eq!(soft.confidence, SOFT_CONFIDENCE);
    }

    #[test]
    fn test_hardness_follows_kind() {
        let mut guardrail = Guardrail::new(GuardrailType::SoftUpper, 10.0, "usually", "test");
        guardrail.kind = GuardrailType::HardUpper;
        assert!(guardrail.is_hard());
    }

    #[test]
    fn test_admits() {
        let upper = Guardrail::hard_upper(100.0, "", "");
        assert!(upper.admits(100.0));
        assert!(!upper.admits(100.1));

        let range = Guardrail::expected_range(0.02, 0.08, "", "");
        assert!(range.admits(0.05));
        assert!(!range.admits(0.2));
    }

    #[test]
    fn test_clamp() {
        let bounds = HardBounds {
            lower: Some(0.0),
            upper: Some(100_000.0),
        };
        assert_eq!(bounds.clamp(150_000.0), (100_000.0, true));
        assert_eq!(bounds.clamp(-5.0), (0.0, true));
        assert_eq!(bounds.clamp(50.0), (50.0, false));
    }

    #[test]
    fn test_conflicting_bounds_prefer_upper() {
        let bounds = HardBounds {
            lower: Some(10.0),
            upper: Some(5.0),
        };
        assert!(!bounds.is_consistent());
        assert_eq!(bounds.clamp(7.0).0, 5.0);
    }

    #[test]
    fn test_from_direction() {
        assert_eq!(GuardrailType::from_direction(true, true), GuardrailType::HardUpper);
        assert_eq!(GuardrailType::from_direction(false, false), GuardrailType::SoftLower);
    }
}
