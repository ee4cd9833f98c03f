//! Guardrail analysis of related facts
//!
//! Each fact is classified in two separate model calls: first the
//! direction of its relationship to the target, then whether that bound is
//! a logical necessity. Splitting the questions keeps each answer simple
//! enough to parse reliably.

use crate::budget::CallLedger;
use crate::client::{CallKind, ModelClient};
use crate::parser::{parse_hardness, parse_relationship, Relationship};
use crate::prompt::{hardness_prompt, relationship_prompt, HARDNESS_SCHEMA, RELATIONSHIP_SCHEMA};
use fermi_domain::traits::{LlmProvider, ScoredDocument};
use fermi_domain::{Guardrail, GuardrailType};
use std::fmt::Display;
use std::sync::Arc;
use tracing::debug;

/// Two-step guardrail classifier
pub(crate) struct GuardrailAnalyzer<L> {
    client: Arc<ModelClient<L>>,
    max_facts: usize,
}

impl<L> GuardrailAnalyzer<L>
where
    L: LlmProvider + Send + Sync + 'static,
    L::Error: Display,
{
    pub fn new(client: Arc<ModelClient<L>>, max_facts: usize) -> Self {
        Self { client, max_facts }
    }

    /// Guardrail implied by one fact, if any
    pub async fn analyze(
        &self,
        target: &str,
        fact: &ScoredDocument,
        ledger: &mut CallLedger,
    ) -> Option<Guardrail> {
        let value = fact.document.representative_value()?;
        let fact_text = fact
            .document
            .question
            .as_deref()
            .unwrap_or(&fact.document.content);

        // 1. Direction
        let response = self
            .client
            .complete(
                CallKind::Classification,
                relationship_prompt(target, fact_text, value),
                Some(RELATIONSHIP_SCHEMA),
                ledger,
            )
            .await
            .ok()?;
        let (relationship, reasoning) = parse_relationship(&response);
        let upper = match relationship {
            Relationship::UpperBound => true,
            Relationship::LowerBound => false,
            Relationship::Unrelated => {
                debug!("Fact {} is unrelated to '{}'", fact.document.id, target);
                return None;
            }
        };

        // 2. Hardness; a failed call leaves the bound soft
        let is_hard = match self
            .client
            .complete(
                CallKind::Classification,
                hardness_prompt(target, fact_text, value, upper),
                Some(HARDNESS_SCHEMA),
                ledger,
            )
            .await
        {
            Ok(response) => parse_hardness(&response).0,
            Err(_) => false,
        };

        let reasoning = if reasoning.is_empty() {
            fact_text.to_string()
        } else {
            reasoning
        };
        let guardrail = Guardrail::new(
            GuardrailType::from_direction(upper, is_hard),
            value,
            reasoning,
            format!("retrieval:{}", fact.document.id),
        );
        debug!("Fact {} implies {} {}", fact.document.id, guardrail.kind, value);
        Some(guardrail)
    }

    /// Analyse up to the configured number of facts, in order
    pub async fn analyze_batch(
        &self,
        target: &str,
        facts: &[ScoredDocument],
        ledger: &mut CallLedger,
    ) -> Vec<Guardrail> {
        let mut guardrails = Vec::new();
        for fact in facts.iter().take(self.max_facts) {
            if let Some(guardrail) = self.analyze(target, fact, ledger).await {
                guardrails.push(guardrail);
            }
        }
        guardrails
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeoutConfig;
    use crate::prompt::{HARDNESS_TASK, RELATIONSHIP_TASK};
    use fermi_domain::traits::Document;
    use fermi_llm::MockProvider;

    fn fact(id: &str, question: &str, value: f64) -> ScoredDocument {
        ScoredDocument {
            document: Document::new(id, question).answering(question, value),
            score: 0.6,
        }
    }

    fn analyzer(provider: MockProvider) -> GuardrailAnalyzer<MockProvider> {
        let client = ModelClient::new(Arc::new(provider), TimeoutConfig::default());
        GuardrailAnalyzer::new(Arc::new(client), 5)
    }

    #[tokio::test]
    async fn test_hard_upper_bound() {
        let mut provider = MockProvider::default();
        provider.add_response(
            RELATIONSHIP_TASK,
            r#"{"relationship": "UPPER_BOUND", "reasoning": "subset of all businesses"}"#,
        );
        provider.add_response(HARDNESS_TASK, r#"{"is_hard": true}"#);

        let mut ledger = CallLedger::default();
        let guardrail = analyzer(provider)
            .analyze(
                "Seoul cafe count",
                &fact("biz", "Seoul business count", 100_000.0),
                &mut ledger,
            )
            .await
            .unwrap();
        assert_eq!(guardrail.kind, GuardrailType::HardUpper);
        assert!(guardrail.is_hard());
        assert_eq!(guardrail.value, 100_000.0);
        assert_eq!(guardrail.source, "retrieval:biz");
        assert_eq!(ledger.llm_calls, 2);
    }

    #[tokio::test]
    async fn test_unparseable_hardness_is_soft() {
        let mut provider = MockProvider::new("hmm");
        provider.add_response(RELATIONSHIP_TASK, r#"{"relationship": "LOWER_BOUND"}"#);

        let guardrail = analyzer(provider)
            .analyze("q", &fact("f", "fact", 10.0), &mut CallLedger::default())
            .await
            .unwrap();
        assert_eq!(guardrail.kind, GuardrailType::SoftLower);
    }

    #[tokio::test]
    async fn test_unrelated_fact_makes_one_call() {
        let provider = MockProvider::new("not json");
        let handle = provider.clone();
        let mut ledger = CallLedger::default();
        assert!(analyzer(provider)
            .analyze("q", &fact("f", "fact", 10.0), &mut ledger)
            .await
            .is_none());
        assert_eq!(handle.call_count(), 1);
    }

    #[tokio::test]
    async fn test_batch_is_capped() {
        let mut provider = MockProvider::default();
        provider.add_response(RELATIONSHIP_TASK, r#"{"relationship": "UPPER_BOUND"}"#);
        provider.add_response(HARDNESS_TASK, r#"{"is_hard": false}"#);
        let client = ModelClient::new(Arc::new(provider), TimeoutConfig::default());
        let analyzer = GuardrailAnalyzer::new(Arc::new(client), 2);

        let facts: Vec<_> = (0..4).map(|i| fact(&format!("f{}", i), "fact", 1.0)).collect();
        let guardrails = analyzer
            .analyze_batch("q", &facts, &mut CallLedger::default())
            .await;
        assert_eq!(guardrails.len(), 2);
        assert!(guardrails.iter().all(|g| g.kind == GuardrailType::SoftUpper));
    }
}
