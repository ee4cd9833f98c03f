//! Fermi Guardrails
//!
//! Deterministic constraint logic shared by every pipeline stage.
//!
//! This crate provides:
//! - `GuardrailCollector`: append-only accumulator of hard and soft bounds
//! - `BoundaryValidator`: logical and empirical plausibility checks for a
//!   candidate answer, derived from the question's concept and region
//!
//! # Examples
//!
//! ```
//! use fermi_domain::{Context, Guardrail};
//! use fermi_guardrail::{BoundaryConfig, BoundaryValidator, GuardrailCollector};
//!
//! let mut collector = GuardrailCollector::new();
//! collector.add(Guardrail::hard_upper(100_000.0, "part <= whole", "test")).unwrap();
//! assert_eq!(collector.clamp(150_000.0), (100_000.0, true));
//!
//! let validator = BoundaryValidator::new(BoundaryConfig::default());
//! let question = "What fraction of visitors convert?";
//! let check = validator.validate(question, 1.4, &Context::new(), &collector);
//! assert!(!check.is_valid());
//! ```

#![warn(missing_docs)]

mod boundary;
mod collector;
mod config;
mod error;

pub use boundary::{BoundaryCheck, BoundaryStatus, BoundaryValidator, BoundaryViolation};
pub use collector::GuardrailCollector;
pub use config::BoundaryConfig;
pub use error::GuardrailError;
