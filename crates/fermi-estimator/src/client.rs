//! Time-boxed access to the blocking provider traits
//!
//! Provider, search and store traits are synchronous. Every call runs on
//! the blocking pool under a `tokio::time::timeout`, and every call is
//! counted in the caller's `CallLedger`.

use crate::budget::CallLedger;
use crate::config::TimeoutConfig;
use crate::EstimatorError;
use fermi_domain::traits::{
    LearnedRule, LearnedRuleStore, LlmProvider, ScoredDocument, SearchBackend, SearchFilters,
};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Which budget a model call draws on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallKind {
    Classification,
    Prior,
    Decomposition,
}

async fn run_blocking<T, F>(limit: Duration, f: F) -> Result<T, EstimatorError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, EstimatorError> + Send + 'static,
{
    match timeout(limit, tokio::task::spawn_blocking(f)).await {
        Err(_) => Err(EstimatorError::Timeout(limit)),
        Ok(Err(e)) => Err(EstimatorError::Llm(format!("Task join error: {}", e))),
        Ok(Ok(result)) => result,
    }
}

/// Generative model behind per-kind timeouts
pub(crate) struct ModelClient<L> {
    provider: Arc<L>,
    timeouts: TimeoutConfig,
}

impl<L> ModelClient<L>
where
    L: LlmProvider + Send + Sync + 'static,
    L::Error: Display,
{
    pub fn new(provider: Arc<L>, timeouts: TimeoutConfig) -> Self {
        Self { provider, timeouts }
    }

    fn limit(&self, kind: CallKind) -> Duration {
        match kind {
            CallKind::Classification => self.timeouts.classification(),
            CallKind::Prior => self.timeouts.prior(),
            CallKind::Decomposition => self.timeouts.decomposition(),
        }
    }

    /// Send a prompt, optionally asking for JSON matching `schema`
    pub async fn complete(
        &self,
        kind: CallKind,
        prompt: String,
        schema: Option<&'static str>,
        ledger: &mut CallLedger,
    ) -> Result<String, EstimatorError> {
        ledger.llm_calls += 1;
        let provider = Arc::clone(&self.provider);
        let result = run_blocking(self.limit(kind), move || {
            let response = match schema {
                Some(schema) => provider.generate_structured(&prompt, schema),
                None => provider.generate(&prompt),
            };
            response.map_err(|e| EstimatorError::Llm(e.to_string()))
        })
        .await;

        match &result {
            Err(EstimatorError::Timeout(limit)) => {
                ledger.timeouts += 1;
                warn!("{:?} call timed out after {:?}", kind, limit);
            }
            Err(e) => {
                ledger.provider_errors += 1;
                debug!("{:?} call failed: {}", kind, e);
            }
            Ok(_) => {}
        }
        result
    }
}

/// Retrieval backend and learned-rule store behind the search timeout
pub(crate) struct SearchClient<S, R> {
    backend: Arc<S>,
    rules: Arc<R>,
    limit: Duration,
}

impl<S, R> SearchClient<S, R>
where
    S: SearchBackend + Send + Sync + 'static,
    S::Error: Display,
    R: LearnedRuleStore + Send + Sync + 'static,
    R::Error: Display,
{
    pub fn new(backend: Arc<S>, rules: Arc<R>, limit: Duration) -> Self {
        Self {
            backend,
            rules,
            limit,
        }
    }

    /// Ranked documents for `query`; errors are logged and yield nothing
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<SearchFilters>,
        ledger: &mut CallLedger,
    ) -> Vec<ScoredDocument> {
        ledger.search_calls += 1;
        let backend = Arc::clone(&self.backend);
        let query_owned = query.to_string();
        let result = run_blocking(self.limit, move || {
            backend
                .search(&query_owned, top_k, filters.as_ref())
                .map_err(|e| EstimatorError::Search(e.to_string()))
        })
        .await;

        match result {
            Ok(hits) => hits,
            Err(e) => {
                if matches!(e, EstimatorError::Timeout(_)) {
                    ledger.timeouts += 1;
                }
                warn!("Search for '{}' failed: {}", query, e);
                Vec::new()
            }
        }
    }

    /// Learned rule stored under `key`
    pub async fn lookup_rule(&self, key: &str) -> Option<LearnedRule> {
        let rules = Arc::clone(&self.rules);
        let key_owned = key.to_string();
        let result = run_blocking(self.limit, move || {
            rules
                .lookup(&key_owned)
                .map_err(|e| EstimatorError::Store(e.to_string()))
        })
        .await;

        match result {
            Ok(rule) => rule,
            Err(e) => {
                warn!("Learned-rule lookup for {} failed: {}", key, e);
                None
            }
        }
    }

    /// Persist a learned rule
    pub async fn save_rule(&self, rule: LearnedRule) -> Result<(), EstimatorError> {
        let rules = Arc::clone(&self.rules);
        run_blocking(self.limit, move || {
            rules
                .save(&rule)
                .map_err(|e| EstimatorError::Store(e.to_string()))
        })
        .await
    }
}
