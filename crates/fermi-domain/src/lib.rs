//! Fermi Domain Layer
//!
//! Value objects and trait seams for the estimation pipeline. This crate has
//! no infrastructure dependencies; every external interaction (generative
//! model, retrieval backend, learned-rule store) is expressed as a trait that
//! other crates implement.
//!
//! ## Key Concepts
//!
//! - **Context**: Immutable per-request scope (domain, region, time period, project data)
//! - **EstimationResult**: The universal output record, success or `Failure`
//! - **Certainty**: Coarse `high`/`medium`/`low` tier used instead of raw probabilities
//! - **Guardrail**: A hard or soft bound on the answer discovered from evidence
//! - **FermiModel**: One candidate decomposition formula over named variables
//!
//! ## Architecture
//!
//! - Pure data and deterministic helpers only
//! - Infrastructure implementations live in other crates
//! - Trait definitions for all external interactions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod certainty;
pub mod concept;
pub mod confidence_computation;
pub mod context;
pub mod fermi;
pub mod guardrail;
pub mod result;
pub mod traits;

// Re-exports for convenience
pub use certainty::{Certainty, CertaintyClassifier};
pub use concept::ConceptKind;
pub use context::{normalize_question, Context, RequestId};
pub use fermi::{DecompositionTrace, FermiModel, FermiVariable};
pub use guardrail::{Guardrail, GuardrailType, HardBounds};
pub use result::{Cost, EstimationResult, ReasoningDetail, Source, VariableProvenance};
