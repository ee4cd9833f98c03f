//! Boundary validation of candidate answers

use crate::{BoundaryConfig, GuardrailCollector};
use fermi_domain::concept::counts_people;
use fermi_domain::{ConceptKind, Context};
use tracing::debug;

/// Outcome of boundary validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryStatus {
    /// No hard bound violated
    Valid,
    /// A hard bound was violated; the answer is impossible
    Rejected,
}

/// One violated bound
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryViolation {
    /// Rule that fired, e.g. `rate_upper`, `population_density`
    pub rule: String,
    /// Bound that was crossed, if numeric
    pub limit: Option<f64>,
    /// Human-readable explanation
    pub message: String,
}

impl BoundaryViolation {
    fn new(rule: &str, limit: Option<f64>, message: String) -> Self {
        Self {
            rule: rule.to_string(),
            limit,
            message,
        }
    }
}

/// Result of checking one candidate value
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryCheck {
    /// Overall status
    pub status: BoundaryStatus,
    /// Concept inferred from the question
    pub concept: ConceptKind,
    /// Hard violations (any one rejects)
    pub hard_violations: Vec<BoundaryViolation>,
    /// Soft violations (lower confidence)
    pub soft_warnings: Vec<BoundaryViolation>,
    /// Logical lower bound applied
    pub hard_min: Option<f64>,
    /// Logical upper bound applied
    pub hard_max: Option<f64>,
    /// Multiplier to apply to the candidate's confidence
    pub confidence_factor: f64,
}

impl BoundaryCheck {
    /// Whether the candidate survived
    pub fn is_valid(&self) -> bool {
        self.status == BoundaryStatus::Valid
    }

    /// Fold in an external plausibility review
    ///
    /// Review violations are treated like rule violations: any hard one
    /// rejects, soft ones apply the penalty if it was not applied yet.
    pub fn merge_review(&mut self, hard: Vec<String>, soft: Vec<String>, soft_penalty: f64) {
        for message in hard {
            self.hard_violations
                .push(BoundaryViolation::new("review", None, message));
        }
        let had_warnings = !self.soft_warnings.is_empty();
        for message in soft {
            self.soft_warnings
                .push(BoundaryViolation::new("review", None, message));
        }
        self.finish(soft_penalty, had_warnings);
    }

    fn finish(&mut self, soft_penalty: f64, penalty_applied: bool) {
        if !self.hard_violations.is_empty() {
            self.status = BoundaryStatus::Rejected;
            self.confidence_factor = 0.0;
        } else if !self.soft_warnings.is_empty() && !penalty_applied {
            self.confidence_factor *= soft_penalty;
        }
    }

    /// All messages, hard first
    pub fn messages(&self) -> Vec<String> {
        self.hard_violations
            .iter()
            .chain(self.soft_warnings.iter())
            .map(|v| v.message.clone())
            .collect()
    }
}

/// Checks candidate answers against logical and empirical bounds
pub struct BoundaryValidator {
    config: BoundaryConfig,
}

impl BoundaryValidator {
    /// Create a validator with the given configuration
    pub fn new(config: BoundaryConfig) -> Self {
        Self { config }
    }

    /// Create a validator with default configuration
    pub fn default_config() -> Self {
        Self::new(BoundaryConfig::default())
    }

    /// Configuration in use
    pub fn config(&self) -> &BoundaryConfig {
        &self.config
    }

    /// Check a candidate value for `question`
    ///
    /// Hard guardrails in the collector are not checked here; fusion
    /// clamps to them. Soft guardrails produce warnings.
    pub fn validate(
        &self,
        question: &str,
        value: f64,
        context: &Context,
        collector: &GuardrailCollector,
    ) -> BoundaryCheck {
        let concept = ConceptKind::infer(question);
        let mut check = BoundaryCheck {
            status: BoundaryStatus::Valid,
            concept,
            hard_violations: Vec::new(),
            soft_warnings: Vec::new(),
            hard_min: None,
            hard_max: None,
            confidence_factor: 1.0,
        };

        // 1. Numeric sanity
        if !value.is_finite() {
            check.hard_violations.push(BoundaryViolation::new(
                "finite",
                None,
                format!("value {value} is not a finite number"),
            ));
            check.finish(self.config.soft_penalty, false);
            return check;
        }

        // 2. Definitional bounds from the concept
        if self.config.enforce_non_negative && concept.is_non_negative() {
            check.hard_min = Some(0.0);
            if value < 0.0 {
                check.hard_violations.push(BoundaryViolation::new(
                    "non_negative",
                    Some(0.0),
                    format!("a {} cannot be negative (got {value})", concept.as_str()),
                ));
            }
        }
        if self.config.enforce_rate_bounds && concept == ConceptKind::Rate {
            check.hard_max = Some(1.0);
            if value > 1.0 {
                check.hard_violations.push(BoundaryViolation::new(
                    "rate_upper",
                    Some(1.0),
                    format!("a rate must lie in [0, 1] (got {value})"),
                ));
            }
        }

        // 3. Hierarchy bounds: population and economy size
        match concept {
            ConceptKind::Count => {
                if let Some((region, population)) = self.population_for(question, context) {
                    let unit_size = if counts_people(question) {
                        1.0
                    } else {
                        self.config.min_unit_size
                    };
                    let limit = population / unit_size;
                    check.hard_max = Some(limit);
                    if value > limit {
                        check.hard_violations.push(BoundaryViolation::new(
                            "population_density",
                            Some(limit),
                            format!(
                                "count {value} exceeds {region} population {population} / {unit_size}"
                            ),
                        ));
                    }
                }
            }
            ConceptKind::MarketSize => {
                if let Some(gdp) = context.constant("gdp") {
                    check.hard_max = Some(gdp);
                    if value > gdp {
                        check.hard_violations.push(BoundaryViolation::new(
                            "gdp",
                            Some(gdp),
                            format!("market size {value} exceeds GDP {gdp}"),
                        ));
                    }
                }
            }
            _ => {}
        }

        // 4. Empirical bounds from soft guardrails
        for guardrail in collector.soft() {
            if !guardrail.admits(value) {
                check.soft_warnings.push(BoundaryViolation::new(
                    "soft_guardrail",
                    Some(guardrail.value),
                    format!(
                        "{value} outside {} {} ({})",
                        guardrail.kind, guardrail.value, guardrail.reasoning
                    ),
                ));
            }
        }

        check.finish(self.config.soft_penalty, false);
        if !check.is_valid() {
            debug!(
                "Boundary check rejected {} for '{}': {:?}",
                value,
                question,
                check.messages()
            );
        }
        check
    }

    /// Population for the most specific region in scope
    ///
    /// Order: a `population` constant in the context, a region named in the
    /// question, the context region. Regions without a known population fall
    /// back to their nearest ancestor's.
    pub fn population_for(&self, question: &str, context: &Context) -> Option<(String, f64)> {
        if let Some(population) = context.constant("population") {
            let region = context.region.clone().unwrap_or_else(|| "context".to_string());
            return Some((region, population));
        }

        let q = question.to_lowercase();
        let mentioned = self
            .config
            .region_populations
            .keys()
            .chain(self.config.region_parents.keys())
            .filter(|name| q.contains(name.as_str()))
            .max_by_key(|name| name.len())
            .cloned();

        let start = mentioned.or_else(|| context.region.as_ref().map(|r| r.to_lowercase()))?;
        let mut current = start;
        // Hierarchies are shallow; the bound guards against parent cycles
        for _ in 0..8 {
            if let Some(population) = self.config.region_populations.get(&current) {
                return Some((current, *population));
            }
            current = self.config.region_parents.get(&current)?.clone();
        }
        None
    }
}
