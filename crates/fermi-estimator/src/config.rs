//! Configuration for the Estimator

use fermi_domain::CertaintyClassifier;
use fermi_guardrail::BoundaryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Decomposition limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FermiConfig {
    /// Maximum recursion depth; depth 0 is the top-level question
    pub max_depth: usize,

    /// Maximum sub-variable estimations for one `estimate` call
    pub max_variable_estimates: usize,

    /// Models above this variable count are flagged
    pub recommended_max_variables: usize,

    /// Models above this variable count are discarded
    pub absolute_max_variables: usize,

    /// Fewest candidate models to ask the generator for
    pub min_models: usize,

    /// Most candidate models kept from one generation round
    pub max_models: usize,

    /// Retrieval-only passes over unknown variables before recursing
    pub refine_iterations: usize,

    /// Ask the model for a plausibility review of each executed candidate
    pub llm_boundary_review: bool,
}

impl Default for FermiConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            max_variable_estimates: 20,
            recommended_max_variables: 6,
            absolute_max_variables: 10,
            min_models: 3,
            max_models: 5,
            refine_iterations: 2,
            llm_boundary_review: true,
        }
    }
}

/// Weights of the model ranking score
///
/// The score is the weighted sum divided by the sum of the weights, so
/// weights need not add up to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Share of variables already resolved
    pub filled: f64,
    /// Geometric mean of resolved variables' confidences
    pub confidence: f64,
    /// Fewer variables score higher
    pub simplicity: f64,
    /// Shallower recursion scores higher
    pub shallowness: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            filled: 0.5,
            confidence: 0.3,
            simplicity: 0.2,
            shallowness: 0.1,
        }
    }
}

impl ScoringWeights {
    /// Sum of all weights
    pub fn total(&self) -> f64 {
        self.filled + self.confidence + self.simplicity + self.shallowness
    }
}

/// Certainty tier weights and classification thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertaintyConfig {
    /// Weight of a `high` result
    pub high: f64,
    /// Weight of a `medium` result
    pub medium: f64,
    /// Weight of a `low` result
    pub low: f64,
    /// Confidence at or above which a result is `high`
    pub high_threshold: f64,
    /// Confidence at or above which a result is `medium`
    pub medium_threshold: f64,
}

impl Default for CertaintyConfig {
    fn default() -> Self {
        let classifier = CertaintyClassifier::default();
        Self {
            high: classifier.high,
            medium: classifier.medium,
            low: classifier.low,
            high_threshold: classifier.high_threshold,
            medium_threshold: classifier.medium_threshold,
        }
    }
}

impl CertaintyConfig {
    /// Classifier with these weights
    pub fn classifier(&self) -> CertaintyClassifier {
        CertaintyClassifier {
            high: self.high,
            medium: self.medium,
            low: self.low,
            high_threshold: self.high_threshold,
            medium_threshold: self.medium_threshold,
        }
    }
}

/// Retrieval thresholds and collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Documents requested per search
    pub top_k: usize,
    /// Collection holding curated, answer-bearing facts
    pub definite_collection: String,
    /// Collection holding industry benchmarks and statistics
    pub benchmark_collection: String,
    /// Minimum similarity for a definite fact to answer directly
    pub definite_threshold: f64,
    /// Minimum similarity for a benchmark to count as a partial answer
    pub benchmark_threshold: f64,
    /// Minimum similarity for a document to be analysed for guardrails
    pub related_threshold: f64,
    /// Most related facts analysed per question
    pub max_related_facts: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            definite_collection: "definite_facts".to_string(),
            benchmark_collection: "benchmarks".to_string(),
            definite_threshold: 0.85,
            benchmark_threshold: 0.70,
            related_threshold: 0.55,
            max_related_facts: 5,
        }
    }
}

/// Fusion of stage outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Relative difference under which two estimates agree
    pub agreement_tolerance: f64,
    /// Share of the remaining headroom granted when estimates agree
    pub agreement_bonus: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            agreement_tolerance: 0.30,
            agreement_bonus: 0.5,
        }
    }
}

/// Per-call time budgets, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Relationship and hardness classification calls
    pub classification_ms: u64,
    /// Direct prior and quick-number calls
    pub prior_ms: u64,
    /// Model generation and plausibility review calls
    pub decomposition_ms: u64,
    /// Retrieval and learned-rule store calls
    pub search_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            classification_ms: 15_000,
            prior_ms: 30_000,
            decomposition_ms: 60_000,
            search_ms: 5_000,
        }
    }
}

impl TimeoutConfig {
    /// Classification timeout as a Duration
    pub fn classification(&self) -> Duration {
        Duration::from_millis(self.classification_ms)
    }

    /// Prior timeout as a Duration
    pub fn prior(&self) -> Duration {
        Duration::from_millis(self.prior_ms)
    }

    /// Decomposition timeout as a Duration
    pub fn decomposition(&self) -> Duration {
        Duration::from_millis(self.decomposition_ms)
    }

    /// Search timeout as a Duration
    pub fn search(&self) -> Duration {
        Duration::from_millis(self.search_ms)
    }
}

/// Write-back of confident answers to the learned-rule store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Persist qualifying results
    pub enabled: bool,
    /// Confidence that qualifies with corroboration from two stages
    pub min_confidence: f64,
    /// Confidence that qualifies with a single stage
    pub high_confidence: f64,
    /// Contributing stages required at `min_confidence`
    pub min_evidence: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confidence: 0.80,
            high_confidence: 0.90,
            min_evidence: 2,
        }
    }
}

/// Configuration for the Estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Decomposition limits
    pub fermi: FermiConfig,
    /// Model ranking weights
    pub scoring: ScoringWeights,
    /// Certainty tiers
    pub certainty: CertaintyConfig,
    /// Retrieval thresholds
    pub retrieval: RetrievalConfig,
    /// Fusion parameters
    pub fusion: FusionConfig,
    /// Boundary rules
    pub boundary: BoundaryConfig,
    /// Confidence thresholds of successive attempts
    pub attempts: AttemptConfig,
    /// Call time budgets
    pub timeouts: TimeoutConfig,
    /// Learned-rule write-back
    pub learning: LearningConfig,
}

/// Progressive relaxation of the acceptance threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttemptConfig {
    /// Non-increasing confidence thresholds, one per attempt
    pub thresholds: Vec<f64>,
}

impl Default for AttemptConfig {
    fn default() -> Self {
        Self {
            thresholds: vec![0.80, 0.60, 0.40],
        }
    }
}

impl EstimatorConfig {
    /// Fast preset: shallow decomposition, short timeouts, no review calls
    pub fn fast() -> Self {
        Self {
            fermi: FermiConfig {
                max_depth: 2,
                max_variable_estimates: 8,
                max_models: 3,
                refine_iterations: 1,
                llm_boundary_review: false,
                ..FermiConfig::default()
            },
            attempts: AttemptConfig {
                thresholds: vec![0.70, 0.40],
            },
            timeouts: TimeoutConfig {
                classification_ms: 5_000,
                prior_ms: 10_000,
                decomposition_ms: 20_000,
                search_ms: 2_000,
            },
            ..Self::default()
        }
    }

    /// Thorough preset: larger budget and longer timeouts
    pub fn thorough() -> Self {
        Self {
            fermi: FermiConfig {
                max_variable_estimates: 40,
                refine_iterations: 3,
                ..FermiConfig::default()
            },
            retrieval: RetrievalConfig {
                top_k: 10,
                max_related_facts: 8,
                ..RetrievalConfig::default()
            },
            timeouts: TimeoutConfig {
                classification_ms: 30_000,
                prior_ms: 60_000,
                decomposition_ms: 120_000,
                search_ms: 10_000,
            },
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        let fermi = &self.fermi;
        if fermi.recommended_max_variables == 0 {
            return Err("recommended_max_variables must be greater than 0".to_string());
        }
        if fermi.absolute_max_variables < fermi.recommended_max_variables {
            return Err(
                "absolute_max_variables cannot be below recommended_max_variables".to_string(),
            );
        }
        if fermi.max_models == 0 || fermi.min_models > fermi.max_models {
            return Err("model counts must satisfy 0 < min_models <= max_models".to_string());
        }

        let weights = [
            self.scoring.filled,
            self.scoring.confidence,
            self.scoring.simplicity,
            self.scoring.shallowness,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || self.scoring.total() <= 0.0 {
            return Err("scoring weights must be non-negative with a positive sum".to_string());
        }

        self.certainty.classifier().validate()?;

        let retrieval = &self.retrieval;
        if retrieval.top_k == 0 {
            return Err("top_k must be greater than 0".to_string());
        }
        if !(retrieval.related_threshold <= retrieval.benchmark_threshold
            && retrieval.benchmark_threshold <= retrieval.definite_threshold)
        {
            return Err(
                "retrieval thresholds must satisfy related <= benchmark <= definite".to_string(),
            );
        }

        if !(self.fusion.agreement_tolerance > 0.0) {
            return Err("agreement_tolerance must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.fusion.agreement_bonus) {
            return Err("agreement_bonus must lie in [0, 1]".to_string());
        }

        self.boundary.validate()?;

        let thresholds = &self.attempts.thresholds;
        if thresholds.is_empty() {
            return Err("at least one attempt threshold is required".to_string());
        }
        if thresholds.iter().any(|t| !(0.0..=1.0).contains(t)) {
            return Err("attempt thresholds must lie in [0, 1]".to_string());
        }
        if thresholds.windows(2).any(|w| w[1] > w[0]) {
            return Err("attempt thresholds must be non-increasing".to_string());
        }

        let timeouts = &self.timeouts;
        if [
            timeouts.classification_ms,
            timeouts.prior_ms,
            timeouts.decomposition_ms,
            timeouts.search_ms,
        ]
        .contains(&0)
        {
            return Err("timeouts must be greater than 0".to_string());
        }

        if self.learning.min_confidence > self.learning.high_confidence {
            return Err("learning min_confidence cannot exceed high_confidence".to_string());
        }
        Ok(())
    }

    /// Load configuration from TOML string
    ///
    /// Missing sections and fields take their defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert!(EstimatorConfig::default().validate().is_ok());
        assert!(EstimatorConfig::fast().validate().is_ok());
        assert!(EstimatorConfig::thorough().validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = EstimatorConfig::default();
        assert_eq!(config.fermi.max_depth, 4);
        assert_eq!(config.fermi.max_variable_estimates, 20);
        assert_eq!(config.attempts.thresholds, vec![0.80, 0.60, 0.40]);
        assert_eq!(config.timeouts.decomposition(), Duration::from_secs(60));
    }

    #[test]
    fn test_increasing_thresholds_rejected() {
        let mut config = EstimatorConfig::default();
        config.attempts.thresholds = vec![0.4, 0.8];
        assert!(config.validate().is_err());

        config.attempts.thresholds.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_variable_caps_ordered() {
        let mut config = EstimatorConfig::default();
        config.fermi.absolute_max_variables = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_weights_rejected() {
        let mut config = EstimatorConfig::default();
        config.scoring = ScoringWeights {
            filled: 0.0,
            confidence: 0.0,
            simplicity: 0.0,
            shallowness: 0.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = EstimatorConfig::default();
        config.timeouts.search_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = EstimatorConfig::from_toml(
            r#"
            [fermi]
            max_depth = 2

            [attempts]
            thresholds = [0.9, 0.5]
            "#,
        )
        .unwrap();
        assert_eq!(config.fermi.max_depth, 2);
        assert_eq!(config.fermi.max_models, 5);
        assert_eq!(config.attempts.thresholds, vec![0.9, 0.5]);
        assert_eq!(config.retrieval, RetrievalConfig::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EstimatorConfig::thorough();
        let text = config.to_toml().unwrap();
        assert_eq!(EstimatorConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(EstimatorConfig::from_toml("fermi = 3").is_err());
    }
}
