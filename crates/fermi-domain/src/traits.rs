//! Trait definitions for external interactions
//!
//! These traits define the boundaries between the estimation pipeline and
//! infrastructure. Implementations live in other crates and are injected
//! once at construction time.

use crate::certainty::Certainty;
use crate::result::Source;
use std::collections::BTreeMap;

/// Trait for generative model operations
///
/// Implemented by the infrastructure layer (fermi-llm)
pub trait LlmProvider {
    /// Error type for LLM operations
    type Error;

    /// Generate text completion
    fn generate(&self, prompt: &str) -> Result<String, Self::Error>;

    /// Generate with structured output (if supported)
    fn generate_structured(&self, prompt: &str, schema: &str) -> Result<String, Self::Error>;
}

/// A retrievable document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Stable identifier
    pub id: String,
    /// Text that is embedded and shown to the model
    pub content: String,
    /// Collection the document belongs to (`definite_facts`, `benchmarks`, ...)
    pub collection: String,
    /// The question this document answers, when it carries a value
    pub question: Option<String>,
    /// Variable name this document provides, for decomposition scans
    pub variable: Option<String>,
    /// Point value
    pub value: Option<f64>,
    /// Known range
    pub value_range: Option<(f64, f64)>,
    /// Unit of the value
    pub unit: Option<String>,
    /// Confidence of the value, when the source states one
    pub confidence: Option<f64>,
    /// Free-form metadata usable in filters
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    /// Document with only text
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Set the collection
    pub fn in_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Attach the answered question and its value
    pub fn answering(mut self, question: impl Into<String>, value: f64) -> Self {
        self.question = Some(question.into());
        self.value = Some(value);
        self
    }

    /// Attach the variable this document provides
    pub fn for_variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = Some(variable.into());
        self
    }

    /// Attach a known range
    pub fn with_range(mut self, low: f64, high: f64) -> Self {
        self.value_range = Some((low, high));
        self
    }

    /// Attach a unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Best point value: the value itself, else the midpoint of the range
    pub fn representative_value(&self) -> Option<f64> {
        self.value
            .or_else(|| self.value_range.map(|(low, high)| (low + high) / 2.0))
    }
}

/// A document with its relevance score (higher is more relevant)
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    /// The document
    pub document: Document,
    /// Similarity score
    pub score: f64,
}

/// Filters for retrieval queries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    /// Restrict to one collection
    pub collection: Option<String>,
    /// Require exact metadata matches
    pub metadata: BTreeMap<String, String>,
}

impl SearchFilters {
    /// Filter on a single collection
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: Some(name.into()),
            ..Self::default()
        }
    }

    /// Whether a document passes the filters
    pub fn matches(&self, document: &Document) -> bool {
        if let Some(collection) = &self.collection {
            if &document.collection != collection {
                return false;
            }
        }
        self.metadata
            .iter()
            .all(|(k, v)| document.metadata.get(k) == Some(v))
    }
}

/// Trait for retrieval backends
///
/// Implemented by the infrastructure layer (fermi-store). Results are
/// ordered most relevant first.
pub trait SearchBackend {
    /// Error type for search operations
    type Error;

    /// Search for documents relevant to a query
    fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<ScoredDocument>, Self::Error>;
}

/// A persisted high-confidence result reusable as a literal
#[derive(Debug, Clone, PartialEq)]
pub struct LearnedRule {
    /// Deterministic key over question and scope
    pub key: String,
    /// Original question
    pub question: String,
    /// Learned value
    pub value: f64,
    /// Learned range
    pub value_range: Option<(f64, f64)>,
    /// Unit of the value
    pub unit: Option<String>,
    /// Confidence when learned
    pub confidence: f64,
    /// Tier when learned
    pub certainty: Certainty,
    /// Stage that produced the value
    pub source: Source,
    /// Number of stages that contributed evidence
    pub evidence_count: usize,
    /// Domain scope
    pub domain: Option<String>,
    /// Region scope
    pub region: Option<String>,
    /// Time scope
    pub time_period: Option<String>,
}

/// Trait for persisted learned rules
///
/// Implemented by the infrastructure layer (fermi-store). Absence of a
/// store only affects cost on repeat queries.
pub trait LearnedRuleStore {
    /// Error type for store operations
    type Error;

    /// Look up a rule by key
    fn lookup(&self, key: &str) -> Result<Option<LearnedRule>, Self::Error>;

    /// Insert or replace a rule
    fn save(&self, rule: &LearnedRule) -> Result<(), Self::Error>;
}
