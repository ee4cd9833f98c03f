//! Fermi LLM Provider Layer
//!
//! Implementations of the `LlmProvider` trait from `fermi-domain`. The
//! estimator receives exactly one provider at construction time; switching
//! between a scripted, disabled, or API-backed model means constructing a
//! new estimator, never flipping a mode flag.
//!
//! # Providers
//!
//! - `MockProvider`: Scripted responses keyed by prompt substrings, for tests
//! - `NoopProvider`: Manual mode; every call fails so stages fall through
//! - `OllamaProvider`: Ollama HTTP API
//!
//! # Examples
//!
//! ```
//! use fermi_llm::MockProvider;
//! use fermi_domain::traits::LlmProvider;
//!
//! let mut provider = MockProvider::new("not json");
//! provider.add_response("churn", r#"{"value": 0.05, "certainty": "medium"}"#);
//! assert!(provider.generate("estimate churn rate").unwrap().contains("0.05"));
//! assert_eq!(provider.generate("anything else").unwrap(), "not json");
//! ```

#![warn(missing_docs)]

pub mod ollama;

use fermi_domain::traits::LlmProvider as LlmProviderTrait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

pub use ollama::OllamaProvider;

/// Errors that can occur during LLM operations
#[derive(Error, Debug)]
pub enum LlmError {
    /// Network or API communication error
    #[error("Communication error: {0}")]
    Communication(String),

    /// Invalid response from LLM
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// No model is configured
    #[error("No generative model configured")]
    Disabled,

    /// Generic error
    #[error("LLM error: {0}")]
    Other(String),
}

#[derive(Debug, Clone)]
enum Scripted {
    Reply(String),
    Fail,
}

#[derive(Debug, Default)]
struct MockState {
    rules: Vec<(Vec<String>, Scripted)>,
    prompts: Vec<String>,
    call_count: usize,
}

/// Mock LLM provider for deterministic testing
///
/// Responses are matched by substring: a rule fires when every one of its
/// patterns occurs in the prompt. Rules are tried in insertion order and the
/// default response is returned when none match. Clones share state, so a
/// test can keep a handle to inspect calls after moving the provider.
///
/// # Examples
///
/// ```
/// use fermi_llm::MockProvider;
/// use fermi_domain::traits::LlmProvider;
///
/// let mut provider = MockProvider::default();
/// provider.add_response_matching(&["relationship", "population"], r#"{"relationship": "UPPER_BOUND"}"#);
/// provider.add_error("hardness");
///
/// assert!(provider.generate("relationship of population").is_ok());
/// assert!(provider.generate("hardness check").is_err());
/// assert_eq!(provider.call_count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    default_response: String,
    delay: Option<Duration>,
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    /// Create a new MockProvider with a fixed fallback response
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            default_response: response.into(),
            delay: None,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Respond with `response` to any prompt containing `pattern`
    pub fn add_response(&mut self, pattern: impl Into<String>, response: impl Into<String>) {
        self.state()
            .rules
            .push((vec![pattern.into()], Scripted::Reply(response.into())));
    }

    /// Respond with `response` to prompts containing all `patterns`
    pub fn add_response_matching(&mut self, patterns: &[&str], response: impl Into<String>) {
        let patterns = patterns.iter().map(|p| p.to_string()).collect();
        self.state()
            .rules
            .push((patterns, Scripted::Reply(response.into())));
    }

    /// Fail any prompt containing `pattern`
    pub fn add_error(&mut self, pattern: impl Into<String>) {
        self.state().rules.push((vec![pattern.into()], Scripted::Fail));
    }

    /// Sleep before every response, to exercise caller timeouts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the number of times generate was called
    pub fn call_count(&self) -> usize {
        self.state().call_count
    }

    /// Reset the call count and captured prompts
    pub fn reset_call_count(&self) {
        let mut state = self.state();
        state.call_count = 0;
        state.prompts.clear();
    }

    /// Prompts received so far, oldest first
    pub fn prompts(&self) -> Vec<String> {
        self.state().prompts.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("Default mock response")
    }
}

impl LlmProviderTrait for MockProvider {
    type Error = LlmError;

    fn generate(&self, prompt: &str) -> Result<String, Self::Error> {
        let scripted = {
            let mut state = self.state();
            state.call_count += 1;
            state.prompts.push(prompt.to_string());
            state
                .rules
                .iter()
                .find(|(patterns, _)| patterns.iter().all(|p| prompt.contains(p.as_str())))
                .map(|(_, scripted)| scripted.clone())
        };

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        match scripted {
            Some(Scripted::Reply(response)) => Ok(response),
            Some(Scripted::Fail) => Err(LlmError::Other("Mock error".to_string())),
            None => Ok(self.default_response.clone()),
        }
    }

    fn generate_structured(&self, prompt: &str, _schema: &str) -> Result<String, Self::Error> {
        self.generate(prompt)
    }
}

/// Provider for running without any generative model
///
/// Every call returns [`LlmError::Disabled`], which the estimator treats as
/// "no result". Estimation then relies on project data and retrieval only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProvider;

impl LlmProviderTrait for NoopProvider {
    type Error = LlmError;

    fn generate(&self, _prompt: &str) -> Result<String, Self::Error> {
        Err(LlmError::Disabled)
    }

    fn generate_structured(&self, _prompt: &str, _schema: &str) -> Result<String, Self::Error> {
        Err(LlmError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_provider_default() {
        let provider = MockProvider::new("Test response");
        let result = provider.generate("any prompt");
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "Test response");
    }

    #[test]
    fn test_mock_provider_substring_responses() {
        let mut provider = MockProvider::default();
        provider.add_response("hello", "world");
        provider.add_response("foo", "bar");

        assert_eq!(provider.generate("say hello there").unwrap(), "world");
        assert_eq!(provider.generate("foo?").unwrap(), "bar");
        assert_eq!(provider.generate("unknown").unwrap(), "Default mock response");
    }

    #[test]
    fn test_mock_provider_first_rule_wins() {
        let mut provider = MockProvider::default();
        provider.add_response_matching(&["a", "b"], "both");
        provider.add_response("a", "only a");

        assert_eq!(provider.generate("a b").unwrap(), "both");
        assert_eq!(provider.generate("a").unwrap(), "only a");
    }

    #[test]
    fn test_mock_provider_call_count() {
        let provider = MockProvider::new("test");

        assert_eq!(provider.call_count(), 0);

        provider.generate("prompt1").unwrap();
        assert_eq!(provider.call_count(), 1);

        provider.generate("prompt2").unwrap();
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.prompts(), vec!["prompt1", "prompt2"]);

        provider.reset_call_count();
        assert_eq!(provider.call_count(), 0);
        assert!(provider.prompts().is_empty());
    }

    #[test]
    fn test_mock_provider_error() {
        let mut provider = MockProvider::default();
        provider.add_error("bad prompt");

        let result = provider.generate("a bad prompt");
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), LlmError::Other(_)));
    }

    #[test]
    fn test_mock_provider_clone_shares_state() {
        let provider1 = MockProvider::new("test");
        let provider2 = provider1.clone();

        provider1.generate("test").unwrap();

        assert_eq!(provider1.call_count(), 1);
        assert_eq!(provider2.call_count(), 1);
    }

    #[test]
    fn test_noop_provider_always_disabled() {
        let provider = NoopProvider;
        assert!(matches!(provider.generate("x"), Err(LlmError::Disabled)));
        assert!(matches!(
            provider.generate_structured("x", "{}"),
            Err(LlmError::Disabled)
        ));
    }
}
