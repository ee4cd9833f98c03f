//! Integration tests for the Estimator

#[cfg(test)]
mod tests {
    use crate::{Estimator, EstimatorConfig, DECOMPOSITION_TASK, PRIOR_TASK};
    use fermi_domain::{Certainty, Context, Guardrail, Source};
    use fermi_llm::MockProvider;
    use fermi_store::{InMemoryRuleStore, InMemorySearchIndex};

    fn config() -> EstimatorConfig {
        let mut config = EstimatorConfig::default();
        config.fermi.llm_boundary_review = false;
        config
    }

    fn estimator(llm: MockProvider) -> Estimator<MockProvider, InMemorySearchIndex> {
        Estimator::new(llm, InMemorySearchIndex::new(), config()).unwrap()
    }

    fn single_model(formula: &str, variables: &[&str]) -> String {
        let vars = variables
            .iter()
            .map(|v| format!(r#"{{"name": "{}"}}"#, v))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            r#"{{"models": [{{"id": "m1", "formula": "{}", "variables": [{}]}}]}}"#,
            formula, vars
        )
    }

    #[tokio::test]
    async fn test_project_data_short_circuits() {
        let llm = MockProvider::default();
        let handle = llm.clone();
        let estimator = estimator(llm);
        let ctx = Context::new().with_project_value("seoul_cafe_count", 1_500.0);

        let result = estimator.estimate("Seoul cafe count", &ctx).await.unwrap();

        assert_eq!(result.value(), Some(1_500.0));
        assert_eq!(result.source(), Source::Literal);
        assert_eq!(result.certainty, Certainty::High);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.cost.llm_calls, 0);
        assert_eq!(result.cost.search_calls, 0);
        assert_eq!(handle.call_count(), 0);
        assert!(result.request_id.is_some());
    }

    #[tokio::test]
    async fn test_hard_guardrail_clamps_decomposition() {
        let mut llm = MockProvider::default();
        llm.add_response(DECOMPOSITION_TASK, single_model("alpha * beta", &["alpha", "beta"]));
        let estimator = estimator(llm);
        let ctx = Context::new()
            .with_project_value("alpha", 1_500.0)
            .with_project_value("beta", 100.0);

        let result = estimator
            .estimate_with_guardrails(
                "Seoul cafe count",
                &ctx,
                vec![Guardrail::hard_upper(
                    100_000.0,
                    "cafes are a subset of businesses",
                    "caller",
                )],
            )
            .await
            .unwrap();

        assert_eq!(result.value(), Some(100_000.0));
        assert_eq!(result.source(), Source::Fermi);
        assert_eq!(result.decomposition.as_ref().unwrap().formula, "alpha * beta");
        assert!(result.reasoning_detail.notes.iter().any(|n| n.contains("clamped")));
    }

    #[tokio::test]
    async fn test_agreement_beats_disagreement() {
        async fn fused(alpha: f64) -> f64 {
            let mut llm = MockProvider::default();
            llm.add_response(PRIOR_TASK, r#"{"value": 100, "certainty": "medium"}"#);
            llm.add_response(DECOMPOSITION_TASK, single_model("alpha * beta", &["alpha", "beta"]));
            let ctx = Context::new()
                .with_project_value("alpha", alpha)
                .with_project_value("beta", 1.0);
            let result = estimator(llm).estimate("widget count", &ctx).await.unwrap();
            assert_eq!(result.source(), Source::Fusion);
            assert_eq!(result.reasoning_detail.scores["contributors"], 2.0);
            result.confidence
        }

        let agreeing = fused(110.0).await;
        let disagreeing = fused(1_000.0).await;
        assert!(agreeing > disagreeing);
        assert!(agreeing > 0.90);
    }

    #[tokio::test]
    async fn test_unknown_variable_is_estimated_recursively() {
        let mut llm = MockProvider::default();
        llm.add_response(
            DECOMPOSITION_TASK,
            single_model("units * adoption_rate", &["units", "adoption_rate"]),
        );
        llm.add_response_matching(
            &[PRIOR_TASK, "adoption_rate?"],
            r#"{"value": 0.3, "certainty": "medium"}"#,
        );
        let estimator = estimator(llm);
        let ctx = Context::new().with_project_value("units", 1_000.0);

        let result = estimator.estimate("widget count", &ctx).await.unwrap();

        assert!((result.value().unwrap() - 300.0).abs() < 1e-9);
        assert_eq!(result.source(), Source::Fermi);
        assert_eq!(result.cost.variable_estimates, 1);
        let trace = result.decomposition.unwrap();
        assert_eq!(trace.variables["adoption_rate"], 0.3);
        assert_eq!(trace.depth, 0);
        // geometric mean of 1.0 (project data) and 0.7 (medium prior)
        assert!((result.confidence - 0.7_f64.sqrt()).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_broader_project_key_does_not_fill_variable() {
        let mut llm = MockProvider::default();
        llm.add_response(
            DECOMPOSITION_TASK,
            single_model("new_customers * 12", &["new_customers"]),
        );
        llm.add_response_matching(
            &[PRIOR_TASK, "new_customers?"],
            r#"{"value": 40, "certainty": "medium"}"#,
        );
        let handle = llm.clone();
        let estimator = estimator(llm);
        let ctx = Context::new().with_project_value("customers", 1_000.0);

        let result = estimator
            .estimate("annual new customer signups", &ctx)
            .await
            .unwrap();

        assert!((result.value().unwrap() - 480.0).abs() < 1e-9);
        assert_eq!(result.source(), Source::Fermi);
        assert!((result.confidence - 0.7).abs() < 1e-9);
        let trace = result.decomposition.unwrap();
        assert_eq!(trace.variables["new_customers"], 40.0);
        assert!(handle
            .prompts()
            .iter()
            .any(|p| p.contains(PRIOR_TASK) && p.contains("new_customers?")));
    }

    #[tokio::test]
    async fn test_high_prior_is_learned_and_reused() {
        let mut llm = MockProvider::default();
        llm.add_response(
            PRIOR_TASK,
            r#"{"value": 0.05, "range": [0.03, 0.08], "certainty": "high", "reasoning": "typical SMB churn"}"#,
        );
        let handle = llm.clone();
        let estimator = estimator(llm).with_rule_store(InMemoryRuleStore::new());
        let ctx = Context::new().with_domain("B2B_SaaS");

        let first = estimator.estimate("B2B SaaS churn rate", &ctx).await.unwrap();
        assert_eq!(first.source(), Source::Prior);
        assert_eq!(first.value(), Some(0.05));
        let calls = handle.call_count();
        assert!(calls >= 1);

        let second = estimator.estimate("B2B SaaS churn rate", &ctx).await.unwrap();
        assert_eq!(second.source(), Source::Literal);
        assert_eq!(second.value(), Some(0.05));
        assert_eq!(second.value_range, Some((0.03, 0.08)));
        assert_eq!(handle.call_count(), calls);

        let metrics = estimator.metrics();
        assert_eq!(metrics.rules_learned, 1);
        assert_eq!(metrics.total_runs(), 2);
    }

    #[tokio::test]
    async fn test_literal_results_are_not_learned() {
        let estimator =
            estimator(MockProvider::default()).with_rule_store(InMemoryRuleStore::new());
        let ctx = Context::new().with_project_value("churn", 0.04);
        estimator.estimate("churn", &ctx).await.unwrap();
        assert_eq!(estimator.metrics().rules_learned, 0);
    }

    #[tokio::test]
    async fn test_metrics_accumulate() {
        let estimator = estimator(MockProvider::new("no idea"));
        estimator.estimate("widget count", &Context::new()).await.unwrap();
        estimator.estimate("", &Context::new()).await.unwrap();

        let metrics = estimator.metrics();
        assert_eq!(metrics.total_runs(), 2);
        assert_eq!(metrics.total_failures(), 2);
        assert!(metrics.parse_failures >= 2);
        assert!(metrics.summary().contains("Failures: 2"));
    }
}
