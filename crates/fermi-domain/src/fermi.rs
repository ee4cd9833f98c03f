//! Decomposition models and traces

use crate::result::EstimationResult;
use std::collections::BTreeMap;

/// One slot in a decomposition formula
#[derive(Debug, Clone, PartialEq)]
pub struct FermiVariable {
    /// Name as it appears in the formula
    pub name: String,
    /// What the variable measures
    pub description: String,
    /// Whether a value is known
    pub available: bool,
    /// Resolved value
    pub value: Option<f64>,
    /// Provenance tag (`project_data`, `inherited`, `retrieval`, ...)
    pub source: Option<String>,
    /// Confidence of the value
    pub confidence: f64,
    /// Whether the value still has to be estimated
    pub need_estimate: bool,
    /// Semantic tag used for plausibility checks
    pub concept: Option<String>,
    /// Sub-estimation that filled this variable
    pub estimation_result: Option<Box<EstimationResult>>,
}

impl FermiVariable {
    /// Unknown variable awaiting estimation
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            available: false,
            value: None,
            source: None,
            confidence: 0.0,
            need_estimate: true,
            concept: None,
            estimation_result: None,
        }
    }

    /// Variable with a known value
    pub fn known(
        name: impl Into<String>,
        value: f64,
        source: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let mut variable = Self::unknown(name);
        variable.fill(value, source, confidence);
        variable
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the concept tag
    pub fn with_concept(mut self, concept: impl Into<String>) -> Self {
        self.concept = Some(concept.into());
        self
    }

    /// Mark the variable resolved
    pub fn fill(&mut self, value: f64, source: impl Into<String>, confidence: f64) {
        self.value = Some(value);
        self.source = Some(source.into());
        self.confidence = confidence.clamp(0.0, 1.0);
        self.available = true;
        self.need_estimate = false;
    }

    /// Mark the variable resolved by a sub-estimation
    ///
    /// Failed results leave the variable untouched.
    pub fn fill_from(&mut self, result: EstimationResult) {
        if let Some(value) = result.value() {
            self.fill(value, result.source().as_str(), result.confidence);
            self.estimation_result = Some(Box::new(result));
        }
    }
}

/// One candidate decomposition of a question
#[derive(Debug, Clone, PartialEq)]
pub struct FermiModel {
    /// Identifier within one generation round
    pub id: String,
    /// Arithmetic expression over variable names
    pub formula: String,
    /// What the decomposition expresses
    pub description: String,
    /// Variables keyed by name
    pub variables: BTreeMap<String, FermiVariable>,
    /// Ranking score in [0, 1]
    pub feasibility_score: f64,
}

impl FermiModel {
    /// Model with no variables yet
    pub fn new(id: impl Into<String>, formula: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            formula: formula.into(),
            description: String::new(),
            variables: BTreeMap::new(),
            feasibility_score: 0.0,
        }
    }

    /// Add a variable
    pub fn with_variable(mut self, variable: FermiVariable) -> Self {
        self.variables.insert(variable.name.clone(), variable);
        self
    }

    /// Number of variables
    pub fn total_variables(&self) -> usize {
        self.variables.len()
    }

    /// Variables still lacking a value
    pub fn unknown_count(&self) -> usize {
        self.variables.values().filter(|v| !v.available).count()
    }

    /// Variables with a value
    pub fn filled_count(&self) -> usize {
        self.total_variables() - self.unknown_count()
    }

    /// Whether every variable is resolved
    pub fn is_fully_resolved(&self) -> bool {
        !self.variables.is_empty() && self.unknown_count() == 0
    }

    /// Confidences of resolved variables
    pub fn filled_confidences(&self) -> Vec<f64> {
        self.variables
            .values()
            .filter(|v| v.available)
            .map(|v| v.confidence)
            .collect()
    }

    /// Resolved values keyed by name
    pub fn bindings(&self) -> BTreeMap<String, f64> {
        self.variables
            .values()
            .filter_map(|v| v.value.map(|value| (v.name.clone(), value)))
            .collect()
    }
}

/// Record of an executed decomposition
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionTrace {
    /// Winning model identifier
    pub model_id: String,
    /// Executed formula
    pub formula: String,
    /// Values substituted into the formula
    pub variables: BTreeMap<String, f64>,
    /// Recursion depth of the computation
    pub depth: usize,
    /// Score of the winning model
    pub score: f64,
    /// Why this model was selected
    pub selection_reasoning: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Certainty, Source};

    #[test]
    fn test_counts() {
        let model = FermiModel::new("m1", "population / density")
            .with_variable(FermiVariable::known("population", 9_500_000.0, "constant", 0.95))
            .with_variable(FermiVariable::unknown("density"));
        assert_eq!(model.total_variables(), 2);
        assert_eq!(model.unknown_count(), 1);
        assert_eq!(model.filled_count(), 1);
        assert!(!model.is_fully_resolved());
        assert_eq!(model.bindings().len(), 1);
    }

    #[test]
    fn test_fill_from_failure_is_noop() {
        let mut variable = FermiVariable::unknown("x");
        variable.fill_from(EstimationResult::failure("x?", "none"));
        assert!(!variable.available);
        assert!(variable.need_estimate);
    }

    #[test]
    fn test_fill_from_success() {
        let mut variable = FermiVariable::unknown("x");
        variable.fill_from(EstimationResult::success(
            "x?",
            3.0,
            Source::Prior,
            Certainty::Medium,
            0.7,
        ));
        assert!(variable.available);
        assert_eq!(variable.value, Some(3.0));
        assert_eq!(variable.source.as_deref(), Some("Prior"));
        assert!(variable.estimation_result.is_some());
    }
}
