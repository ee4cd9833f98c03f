//! The universal estimation output record

use crate::certainty::Certainty;
use crate::context::RequestId;
use crate::fermi::DecompositionTrace;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Which stage produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    /// Caller-supplied project data or a learned rule
    Literal,
    /// General document retrieval
    Rag,
    /// Curated definite-facts retrieval
    Validator,
    /// Generative prior
    Prior,
    /// Structural decomposition
    Fermi,
    /// Combination of several stages
    Fusion,
    /// No stage produced a value
    Failure,
}

impl Source {
    /// Tag used in reports and persisted rules
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Literal => "Literal",
            Source::Rag => "RAG",
            Source::Validator => "Validator",
            Source::Prior => "Prior",
            Source::Fermi => "Fermi",
            Source::Fusion => "Fusion",
            Source::Failure => "Failure",
        }
    }

    /// Parse a tag produced by [`Source::as_str`]
    pub fn parse(tag: &str) -> Option<Self> {
        let source = match tag {
            "Literal" => Source::Literal,
            "RAG" => Source::Rag,
            "Validator" => Source::Validator,
            "Prior" => Source::Prior,
            "Fermi" => Source::Fermi,
            "Fusion" => Source::Fusion,
            "Failure" => Source::Failure,
            _ => return None,
        };
        Some(source)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resources spent producing a result
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Cost {
    /// Generative model calls issued
    pub llm_calls: usize,
    /// Retrieval queries issued
    pub search_calls: usize,
    /// Recursive variable estimations started
    pub variable_estimates: usize,
    /// Wall-clock time
    pub elapsed: Duration,
}

impl Cost {
    /// Sum of two costs
    pub fn combine(&self, other: &Cost) -> Cost {
        Cost {
            llm_calls: self.llm_calls + other.llm_calls,
            search_calls: self.search_calls + other.search_calls,
            variable_estimates: self.variable_estimates + other.variable_estimates,
            elapsed: self.elapsed + other.elapsed,
        }
    }
}

/// Provenance of one variable used in a computation
#[derive(Debug, Clone, PartialEq)]
pub struct VariableProvenance {
    /// Variable name
    pub name: String,
    /// Resolved value, if any
    pub value: Option<f64>,
    /// Where the value came from
    pub source: String,
    /// Confidence of the value
    pub confidence: f64,
}

/// Structured breakdown of how a result was produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReasoningDetail {
    /// Method label, e.g. `project_data`, `fermi_decomposition`, `fusion`
    pub method: String,
    /// Per-variable provenance
    pub variables: Vec<VariableProvenance>,
    /// Named quality scores (model score, fusion weights, ...)
    pub scores: BTreeMap<String, f64>,
    /// Free-form notes (warnings, clamping, fallbacks)
    pub notes: Vec<String>,
}

impl ReasoningDetail {
    /// Detail with only a method label
    pub fn method(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Self::default()
        }
    }
}

/// Output of every estimation
///
/// Exactly one of these holds: the result carries a finite value and a
/// non-`Failure` source, or the source is `Failure` with an error and no
/// value. The constructors are the only way to set those three fields.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimationResult {
    /// The question that was estimated
    pub question: String,
    value: Option<f64>,
    /// Plausible interval around the value
    pub value_range: Option<(f64, f64)>,
    /// Unit of the value, when known
    pub unit: Option<String>,
    /// Coarse tier
    pub certainty: Certainty,
    /// Numeric confidence in [0, 1]
    pub confidence: f64,
    source: Source,
    /// Human-readable trace
    pub reasoning: String,
    /// Structured trace
    pub reasoning_detail: ReasoningDetail,
    /// Executed decomposition, when Stage 3 contributed
    pub decomposition: Option<DecompositionTrace>,
    /// Resources spent
    pub cost: Cost,
    error: Option<String>,
    /// Top-level request this result belongs to
    pub request_id: Option<RequestId>,
}

impl EstimationResult {
    /// Successful result
    ///
    /// A non-finite value, or `Source::Failure`, produces a failure result
    /// instead so the output invariant cannot be broken.
    pub fn success(
        question: impl Into<String>,
        value: f64,
        source: Source,
        certainty: Certainty,
        confidence: f64,
    ) -> Self {
        let question = question.into();
        if !value.is_finite() {
            return Self::failure(question, format!("non-finite value from {source}"));
        }
        if source == Source::Failure {
            return Self::failure(question, "success requested with Failure source");
        }
        Self {
            question,
            value: Some(value),
            value_range: None,
            unit: None,
            certainty,
            confidence: confidence.clamp(0.0, 1.0),
            source,
            reasoning: String::new(),
            reasoning_detail: ReasoningDetail::default(),
            decomposition: None,
            cost: Cost::default(),
            error: None,
            request_id: None,
        }
    }

    /// Failed result carrying a diagnostic
    pub fn failure(question: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            question: question.into(),
            value: None,
            value_range: None,
            unit: None,
            certainty: Certainty::Low,
            confidence: 0.0,
            source: Source::Failure,
            reasoning: error.clone(),
            reasoning_detail: ReasoningDetail::method("failure"),
            decomposition: None,
            cost: Cost::default(),
            error: Some(error),
            request_id: None,
        }
    }

    /// The estimated value, `None` for failures
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// The producing stage
    pub fn source(&self) -> Source {
        self.source
    }

    /// Diagnostic, `Some` only for failures
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether a value was produced
    pub fn is_success(&self) -> bool {
        self.source != Source::Failure
    }

    /// Whether this is a `Failure`
    pub fn is_failure(&self) -> bool {
        self.source == Source::Failure
    }

    /// Set the plausible range, ignoring inverted or non-finite bounds
    pub fn with_range(mut self, low: f64, high: f64) -> Self {
        if low.is_finite() && high.is_finite() && low <= high {
            self.value_range = Some((low, high));
        }
        self
    }

    /// Set the unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the human-readable reasoning
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// Set the structured reasoning
    pub fn with_detail(mut self, detail: ReasoningDetail) -> Self {
        self.reasoning_detail = detail;
        self
    }

    /// Attach the executed decomposition
    pub fn with_decomposition(mut self, trace: DecompositionTrace) -> Self {
        self.decomposition = Some(trace);
        self
    }

    /// Set the cost
    pub fn with_cost(mut self, cost: Cost) -> Self {
        self.cost = cost;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_invariant() {
        let result =
            EstimationResult::success("employees", 150.0, Source::Literal, Certainty::High, 1.0);
        assert_eq!(result.value(), Some(150.0));
        assert_eq!(result.source(), Source::Literal);
        assert!(result.error().is_none());
        assert!(result.is_success());
    }

    #[test]
    fn test_failure_invariant() {
        let result = EstimationResult::failure("q", "nothing found");
        assert_eq!(result.value(), None);
        assert_eq!(result.source(), Source::Failure);
        assert_eq!(result.error(), Some("nothing found"));
    }

    #[test]
    fn test_non_finite_success_becomes_failure() {
        let result =
            EstimationResult::success("q", f64::INFINITY, Source::Prior, Certainty::Low, 0.4);
        assert!(result.is_failure());
        assert!(result.error().is_some());

        let result = EstimationResult::success("q", 1.0, Source::Failure, Certainty::Low, 0.4);
        assert!(result.is_failure());
    }

    #[test]
    fn test_inverted_range_is_ignored() {
        let result = EstimationResult::success("q", 5.0, Source::Prior, Certainty::Medium, 0.7)
            .with_range(10.0, 1.0);
        assert!(result.value_range.is_none());
    }

    #[test]
    fn test_source_tags_round_trip() {
        for source in [
            Source::Literal,
            Source::Rag,
            Source::Validator,
            Source::Prior,
            Source::Fermi,
            Source::Fusion,
            Source::Failure,
        ] {
            assert_eq!(Source::parse(source.as_str()), Some(source));
        }
    }
}
