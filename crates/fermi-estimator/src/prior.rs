//! Stage 2: direct estimates from the model's background knowledge

use crate::budget::CallLedger;
use crate::client::{CallKind, ModelClient};
use crate::parser::{parse_number, parse_prior};
use crate::prompt::{PromptBuilder, PRIOR_SCHEMA};
use fermi_domain::traits::LlmProvider;
use fermi_domain::{
    Certainty, CertaintyClassifier, Context, EstimationResult, ReasoningDetail, Source,
};
use fermi_guardrail::GuardrailCollector;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, warn};

/// Direct estimator
pub(crate) struct PriorEstimator<L> {
    client: Arc<ModelClient<L>>,
    classifier: CertaintyClassifier,
}

impl<L> PriorEstimator<L>
where
    L: LlmProvider + Send + Sync + 'static,
    L::Error: Display,
{
    pub fn new(client: Arc<ModelClient<L>>, classifier: CertaintyClassifier) -> Self {
        Self { client, classifier }
    }

    /// Ask for a value with a certainty tier
    ///
    /// The result's confidence is the tier's weight, never a number the
    /// model made up.
    pub async fn estimate(
        &self,
        question: &str,
        context: &Context,
        collector: &GuardrailCollector,
        ledger: &mut CallLedger,
    ) -> Option<EstimationResult> {
        let prompt = PromptBuilder::new(question, context)
            .with_constraints(collector.describe())
            .prior();
        let response = self
            .client
            .complete(CallKind::Prior, prompt, Some(PRIOR_SCHEMA), ledger)
            .await
            .ok()?;

        let answer = match parse_prior(&response) {
            Ok(answer) => answer,
            Err(e) => {
                ledger.parse_failures += 1;
                warn!("Stage 2: unusable prior for '{}': {}", question, e);
                return None;
            }
        };
        debug!(
            "Stage 2: prior for '{}' = {} ({})",
            question, answer.value, answer.certainty
        );

        let mut detail = ReasoningDetail::method("prior");
        detail.notes.push(format!("self-reported certainty {}", answer.certainty));
        let mut result = EstimationResult::success(
            question,
            answer.value,
            Source::Prior,
            answer.certainty,
            self.classifier.weight(answer.certainty),
        )
        .with_reasoning(answer.reasoning)
        .with_detail(detail);
        if let Some((low, high)) = answer.range {
            result = result.with_range(low, high);
        }
        if let Some(unit) = answer.unit {
            result = result.with_unit(unit);
        }
        Some(result)
    }

    /// Ask for a bare number; always `low` certainty
    pub async fn quick_number(
        &self,
        question: &str,
        context: &Context,
        ledger: &mut CallLedger,
    ) -> Option<EstimationResult> {
        let prompt = PromptBuilder::new(question, context).quick_number();
        let response = self
            .client
            .complete(CallKind::Prior, prompt, None, ledger)
            .await
            .ok()?;

        let Some(value) = parse_number(&response) else {
            ledger.parse_failures += 1;
            debug!("Quick number for '{}' had no number", question);
            return None;
        };
        Some(
            EstimationResult::success(
                question,
                value,
                Source::Prior,
                Certainty::Low,
                self.classifier.weight(Certainty::Low),
            )
            .with_reasoning("Rough single-number guess")
            .with_detail(ReasoningDetail::method("quick_number")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeoutConfig;
    use crate::prompt::{PRIOR_TASK, QUICK_NUMBER_TASK};
    use fermi_domain::Guardrail;
    use fermi_llm::MockProvider;

    fn estimator(provider: MockProvider) -> PriorEstimator<MockProvider> {
        let client = ModelClient::new(Arc::new(provider), TimeoutConfig::default());
        PriorEstimator::new(Arc::new(client), CertaintyClassifier::default())
    }

    #[tokio::test]
    async fn test_confidence_comes_from_tier() {
        let mut provider = MockProvider::default();
        provider.add_response(
            PRIOR_TASK,
            r#"{"value": 0.05, "range": [0.03, 0.08], "certainty": "medium", "confidence": 0.99}"#,
        );
        let result = estimator(provider)
            .estimate(
                "churn rate",
                &Context::new(),
                &GuardrailCollector::new(),
                &mut CallLedger::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.source(), Source::Prior);
        assert_eq!(result.certainty, Certainty::Medium);
        assert_eq!(result.confidence, CertaintyClassifier::default().medium);
        assert_eq!(result.value_range, Some((0.03, 0.08)));
    }

    #[tokio::test]
    async fn test_guardrails_are_in_prompt() {
        let provider = MockProvider::new("no idea");
        let handle = provider.clone();
        let collector =
            GuardrailCollector::seeded(vec![Guardrail::hard_upper(100.0, "part of whole", "test")]);
        let mut ledger = CallLedger::default();
        let result = estimator(provider)
            .estimate("q", &Context::new(), &collector, &mut ledger)
            .await;
        assert!(result.is_none());
        assert_eq!(ledger.parse_failures, 1);
        assert!(handle.prompts()[0].contains("HARD_UPPER 100"));
    }

    #[tokio::test]
    async fn test_quick_number_is_low() {
        let mut provider = MockProvider::default();
        provider.add_response(QUICK_NUMBER_TASK, "About 4,200.");
        let result = estimator(provider)
            .quick_number("cafes per district", &Context::new(), &mut CallLedger::default())
            .await
            .unwrap();
        assert_eq!(result.value(), Some(4_200.0));
        assert_eq!(result.certainty, Certainty::Low);
    }
}
