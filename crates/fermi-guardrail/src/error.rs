//! Error types for guardrail handling

use thiserror::Error;

/// Errors that can occur while collecting guardrails
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardrailError {
    /// Guardrail has a non-finite or inverted bound
    #[error("Invalid guardrail: {0}")]
    InvalidGuardrail(String),
}
