//! Fermi Estimator
//!
//! Answers quantitative questions that have no direct data by climbing a
//! four-stage ladder, stopping as soon as a stage is confident enough.
//!
//! # Overview
//!
//! 1. **Evidence**: caller project data, learned rules, curated facts and
//!    benchmark documents. Related facts become guardrails, never answers.
//! 2. **Prior**: the model's own estimate with a coarse certainty tier.
//! 3. **Decomposition**: candidate formulas over sub-quantities, each
//!    sub-quantity estimated through the same ladder one level deeper.
//! 4. **Fusion**: certainty-weighted combination, clamped to hard bounds.
//!
//! # Architecture
//!
//! ```text
//! question → Evidence → Prior → Decomposition ─┐
//!               │          │         ↑  (sub-variables)
//!               └──────────┴─────────┴──▶ Fusion → EstimationResult
//! ```
//!
//! Depth, cycle, and variable-budget limits bound every call tree. Model
//! and search calls carry per-call timeouts; a timeout is just a missing
//! result.
//!
//! # Example Usage
//!
//! ```no_run
//! use fermi_domain::Context;
//! use fermi_estimator::{Estimator, EstimatorConfig};
//! use fermi_llm::OllamaProvider;
//! use fermi_store::{InMemorySearchIndex, SqliteRuleStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let llm = OllamaProvider::default_endpoint("llama3");
//! let index = InMemorySearchIndex::new();
//! let rules = SqliteRuleStore::new("fermi-rules.db")?;
//!
//! let estimator = Estimator::new(llm, index, EstimatorConfig::default())?
//!     .with_rule_store(rules);
//!
//! let context = Context::new().with_domain("B2B_SaaS").with_region("Korea");
//! let result = estimator.estimate("How many B2B SaaS companies are in Korea?", &context).await?;
//!
//! match result.value() {
//!     Some(value) => println!("{} ({}, {:.2})", value, result.source(), result.confidence),
//!     None => println!("No estimate: {}", result.error().unwrap_or_default()),
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod analyzer;
mod budget;
mod client;
mod config;
mod decomposer;
mod error;
mod estimator;
mod evidence;
mod fusion;
mod learning;
mod metrics;
mod parser;
mod prior;
mod prompt;
mod telemetry;

pub mod formula;
pub mod scoring;

#[cfg(test)]
mod tests;

pub use config::{
    AttemptConfig, CertaintyConfig, EstimatorConfig, FermiConfig, FusionConfig, LearningConfig,
    RetrievalConfig, ScoringWeights, TimeoutConfig,
};
pub use error::EstimatorError;
pub use estimator::Estimator;
pub use metrics::EstimatorMetrics;
pub use prompt::{
    DECOMPOSITION_TASK, HARDNESS_TASK, PLAUSIBILITY_TASK, PRIOR_TASK, QUICK_NUMBER_TASK,
    RELATIONSHIP_TASK,
};
pub use telemetry::{init_tracing, try_init_tracing};
