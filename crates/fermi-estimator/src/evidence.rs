//! Stage 1: literal and retrieved evidence
//!
//! Sources are tried from most to least authoritative: the caller's project
//! data, a previously learned rule, curated definite facts, and benchmarks.
//! Anything that is related to the question but does not answer it is kept
//! for guardrail analysis.

use crate::budget::CallLedger;
use crate::client::SearchClient;
use crate::config::RetrievalConfig;
use fermi_domain::traits::{
    Document, LearnedRuleStore, ScoredDocument, SearchBackend, SearchFilters,
};
use fermi_domain::{
    Certainty, CertaintyClassifier, Context, EstimationResult, Guardrail, ReasoningDetail, Source,
};
use fermi_store::rule_key;
use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info};

/// What Stage 1 found for one question
#[derive(Debug, Default)]
pub(crate) struct Evidence {
    /// A high-certainty answer; the pipeline stops here
    pub definite: Option<EstimationResult>,
    /// A benchmark answer to fuse with later stages
    pub partial: Option<EstimationResult>,
    /// Weaker statistical matches, best first
    pub statistics: Vec<EstimationResult>,
    /// Facts to analyse for guardrails
    pub related: Vec<ScoredDocument>,
    /// Expected ranges from matching benchmarks
    pub soft_guardrails: Vec<Guardrail>,
}

/// Words that may surround a project key without changing the quantity
const FILLER_WORDS: &[&str] = &[
    "a", "an", "are", "current", "currently", "did", "do", "does", "has", "have", "how", "in",
    "is", "many", "much", "now", "number", "of", "our", "the", "their", "there", "today",
    "total", "was", "we", "were", "what", "your",
];

/// Lowercased units of `text`; `_` joins words into one unit
fn units(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .map(|unit| unit.trim_matches('_'))
        .filter(|unit| !unit.is_empty())
        .map(str::to_string)
        .collect()
}

fn words(unit: &str) -> impl Iterator<Item = &str> {
    unit.split('_').filter(|w| !w.is_empty())
}

/// Canonical `a_b_c` form of a key or variable name
fn unit_key(text: &str) -> String {
    units(text)
        .iter()
        .flat_map(|unit| words(unit))
        .collect::<Vec<_>>()
        .join("_")
}

/// Whether `key` names the quantity `question` asks for
///
/// The key must cover a run of whole units, so `customers` never matches
/// inside `new_customers`, and only filler words may sit next to it.
fn key_answers(key: &str, question: &[String]) -> bool {
    let key_words: Vec<&str> = key.split('_').collect();
    for start in 0..question.len() {
        let mut covered: Vec<&str> = Vec::new();
        for end in start..question.len() {
            covered.extend(words(&question[end]));
            if covered.len() > key_words.len() || covered[..] != key_words[..covered.len()] {
                break;
            }
            if covered.len() == key_words.len() {
                let filler = |unit: Option<&String>| {
                    unit.map_or(true, |u| FILLER_WORDS.contains(&u.as_str()))
                };
                let before = start.checked_sub(1).and_then(|i| question.get(i));
                if filler(before) && filler(question.get(end + 1)) {
                    return true;
                }
                break;
            }
        }
    }
    false
}

/// Project-data entry answering `question`, longest matching key first
///
/// For a sub-variable the key must name that variable exactly. For the
/// caller's question the key must appear in it as whole units, surrounded
/// by nothing but filler words. Case, punctuation and spacing are ignored.
pub(crate) fn project_literal(
    question: &str,
    variable: Option<&str>,
    context: &Context,
) -> Option<(String, f64)> {
    let candidates = context
        .project_data
        .iter()
        .map(|(key, value)| (key, *value, unit_key(key)))
        .filter(|(_, _, k)| !k.is_empty());

    match variable {
        Some(variable) => {
            let target = unit_key(variable);
            candidates
                .filter(|(_, _, k)| *k == target)
                .map(|(key, value, _)| (key.clone(), value))
                .next()
        }
        None => {
            let question = units(question);
            if question.is_empty() {
                return None;
            }
            candidates
                .filter(|(_, _, k)| key_answers(k, &question))
                .max_by_key(|(_, _, k)| k.len())
                .map(|(key, value, _)| (key.clone(), value))
        }
    }
}

fn fact_text(document: &Document) -> &str {
    document.question.as_deref().unwrap_or(&document.content)
}

/// Stage 1 collector
pub(crate) struct EvidenceCollector<S, R> {
    search: Arc<SearchClient<S, R>>,
    config: RetrievalConfig,
    classifier: CertaintyClassifier,
}

impl<S, R> EvidenceCollector<S, R>
where
    S: SearchBackend + Send + Sync + 'static,
    S::Error: Display,
    R: LearnedRuleStore + Send + Sync + 'static,
    R::Error: Display,
{
    pub fn new(
        search: Arc<SearchClient<S, R>>,
        config: RetrievalConfig,
        classifier: CertaintyClassifier,
    ) -> Self {
        Self {
            search,
            config,
            classifier,
        }
    }

    /// Gather evidence for `question`, the estimate of `variable` when set
    pub async fn collect(
        &self,
        question: &str,
        variable: Option<&str>,
        context: &Context,
        ledger: &mut CallLedger,
    ) -> Evidence {
        let mut evidence = Evidence::default();

        // 1. Caller-supplied project data
        if let Some((key, value)) = project_literal(question, variable, context) {
            info!("Stage 1: '{}' answered by project data `{}`", question, key);
            let mut detail = ReasoningDetail::method("project_data");
            detail.notes.push(format!("matched key `{}`", key));
            evidence.definite = Some(
                EstimationResult::success(question, value, Source::Literal, Certainty::High, 1.0)
                    .with_reasoning(format!("Project data `{}` = {}", key, value))
                    .with_detail(detail),
            );
            return evidence;
        }

        // 2. Learned rules
        let key = rule_key(question, context);
        if let Some(rule) = self.search.lookup_rule(&key).await {
            if rule.value.is_finite() {
                info!("Stage 1: '{}' answered by learned rule {}", question, key);
                let mut detail = ReasoningDetail::method("learned_rule");
                detail.scores.insert("evidence_count".to_string(), rule.evidence_count as f64);
                detail.notes.push(format!("originally from {}", rule.source));
                let mut result = EstimationResult::success(
                    question,
                    rule.value,
                    Source::Literal,
                    Certainty::High,
                    rule.confidence.max(self.classifier.high_threshold),
                )
                .with_reasoning(format!("Learned rule {}", key))
                .with_detail(detail);
                if let Some((low, high)) = rule.value_range {
                    result = result.with_range(low, high);
                }
                if let Some(unit) = rule.unit {
                    result = result.with_unit(unit);
                }
                evidence.definite = Some(result);
                return evidence;
            }
        }

        let mut seen = HashSet::new();

        // 3. Definite facts
        let filters = SearchFilters::collection(self.config.definite_collection.clone());
        let hits = self
            .search
            .search(question, self.config.top_k, Some(filters), ledger)
            .await;
        for hit in hits {
            if !seen.insert(hit.document.id.clone()) {
                continue;
            }
            if evidence.definite.is_none() && hit.score >= self.config.definite_threshold {
                if let Some(value) = hit.document.value {
                    info!(
                        "Stage 1: '{}' answered by definite fact {} ({:.2})",
                        question, hit.document.id, hit.score
                    );
                    evidence.definite = Some(self.answer_from(
                        question,
                        &hit,
                        value,
                        Source::Validator,
                        Certainty::High,
                    ));
                    continue;
                }
            }
            self.keep_related(&mut evidence, hit);
        }
        if evidence.definite.is_some() {
            return evidence;
        }

        // 4. Benchmarks
        let filters = SearchFilters::collection(self.config.benchmark_collection.clone());
        let hits = self
            .search
            .search(question, self.config.top_k, Some(filters), ledger)
            .await;
        for hit in hits {
            if !seen.insert(hit.document.id.clone()) {
                continue;
            }
            let representative = hit.document.representative_value();
            if hit.score >= self.config.benchmark_threshold {
                if let Some((low, high)) = hit.document.value_range {
                    let guardrail = Guardrail::expected_range(
                        low,
                        high,
                        format!("benchmark range for {}", fact_text(&hit.document)),
                        format!("retrieval:{}", hit.document.id),
                    );
                    if guardrail.is_well_formed() {
                        evidence.soft_guardrails.push(guardrail);
                    }
                }
                if evidence.partial.is_none() {
                    if let Some(value) = representative {
                        debug!(
                            "Stage 1: benchmark {} partially answers '{}' ({:.2})",
                            hit.document.id, question, hit.score
                        );
                        let certainty = if hit.document.value.is_some() {
                            Certainty::Medium
                        } else {
                            Certainty::Low
                        };
                        evidence.partial =
                            Some(self.answer_from(question, &hit, value, Source::Rag, certainty));
                        continue;
                    }
                }
                self.keep_related(&mut evidence, hit);
            } else if hit.score >= self.config.related_threshold {
                match (hit.document.value_range, representative) {
                    (Some(_), Some(value)) => {
                        let stat =
                            self.answer_from(question, &hit, value, Source::Rag, Certainty::Low);
                        evidence.statistics.push(stat);
                    }
                    _ => self.keep_related(&mut evidence, hit),
                }
            }
        }

        evidence.related.truncate(self.config.max_related_facts);
        evidence
    }

    fn keep_related(&self, evidence: &mut Evidence, hit: ScoredDocument) {
        if hit.score >= self.config.related_threshold
            && hit.document.representative_value().is_some()
        {
            evidence.related.push(hit);
        }
    }

    fn answer_from(
        &self,
        question: &str,
        hit: &ScoredDocument,
        value: f64,
        source: Source,
        certainty: Certainty,
    ) -> EstimationResult {
        let tier = self.classifier.weight(certainty);
        let confidence = match hit.document.confidence {
            Some(c) if certainty == Certainty::High => c.max(self.classifier.high_threshold),
            Some(c) => c.min(tier),
            None => tier,
        };

        let mut detail = ReasoningDetail::method(if source == Source::Validator {
            "definite_fact"
        } else {
            "benchmark"
        });
        detail.scores.insert("similarity".to_string(), hit.score);
        detail.notes.push(format!("document {}", hit.document.id));

        let mut result = EstimationResult::success(question, value, source, certainty, confidence)
            .with_reasoning(format!(
                "{} ({}, similarity {:.2})",
                hit.document.content.trim(),
                hit.document.id,
                hit.score
            ))
            .with_detail(detail);
        if let Some((low, high)) = hit.document.value_range {
            result = result.with_range(low, high);
        }
        if let Some(unit) = &hit.document.unit {
            result = result.with_unit(unit.clone());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::CallLedger;
    use fermi_domain::traits::{LearnedRule, LearnedRuleStore};
    use fermi_store::{InMemoryRuleStore, InMemorySearchIndex, NullRuleStore};
    use std::time::Duration;

    fn collector<R>(
        index: InMemorySearchIndex,
        rules: R,
    ) -> EvidenceCollector<InMemorySearchIndex, R>
    where
        R: LearnedRuleStore + Send + Sync + 'static,
        R::Error: Display,
    {
        let search = SearchClient::new(Arc::new(index), Arc::new(rules), Duration::from_secs(5));
        EvidenceCollector::new(
            Arc::new(search),
            RetrievalConfig::default(),
            CertaintyClassifier::default(),
        )
    }

    #[test]
    fn test_project_literal_matching() {
        let ctx = Context::new()
            .with_project_value("employees", 120.0)
            .with_project_value("remote_employees", 30.0);
        assert_eq!(
            project_literal("How many remote employees?", None, &ctx),
            Some(("remote_employees".to_string(), 30.0))
        );
        assert_eq!(
            project_literal("EMPLOYEES", None, &ctx),
            Some(("employees".to_string(), 120.0))
        );
        assert_eq!(
            project_literal("How many employees does Acme have?", None, &ctx),
            Some(("employees".to_string(), 120.0))
        );
        assert_eq!(project_literal("employee churn", None, &ctx), None);
        assert_eq!(project_literal("   ", None, &ctx), None);
    }

    #[test]
    fn test_project_key_is_not_a_different_quantity() {
        let ctx = Context::new().with_project_value("customers", 1_000.0);

        // Sub-variables must name the key exactly
        assert_eq!(
            project_literal("B2B SaaS new_customers?", Some("new_customers"), &ctx),
            None
        );
        assert_eq!(
            project_literal("B2B SaaS customers?", Some("customers"), &ctx),
            Some(("customers".to_string(), 1_000.0))
        );
        assert_eq!(
            project_literal("B2B SaaS Customers?", Some(" Customers "), &ctx),
            Some(("customers".to_string(), 1_000.0))
        );

        // Underscore-joined names are one unit
        assert_eq!(project_literal("new_customers", None, &ctx), None);
        assert_eq!(project_literal("active_users per customers_segment", None, &ctx), None);

        // Qualifiers next to the key change the quantity
        assert_eq!(project_literal("How many new customers?", None, &ctx), None);
        assert_eq!(project_literal("customers lost per month", None, &ctx), None);
        assert_eq!(
            project_literal("How many customers do we have?", None, &ctx),
            Some(("customers".to_string(), 1_000.0))
        );
    }

    #[tokio::test]
    async fn test_sub_variable_skips_broader_project_key() {
        let ctx = Context::new()
            .with_domain("B2B_SaaS")
            .with_project_value("customers", 1_000.0);
        let evidence = collector(InMemorySearchIndex::new(), NullRuleStore)
            .collect(
                &ctx.sub_question("new_customers"),
                Some("new_customers"),
                &ctx,
                &mut CallLedger::default(),
            )
            .await;
        assert!(evidence.definite.is_none());
    }

    #[tokio::test]
    async fn test_project_data_short_circuits_without_search() {
        let ctx = Context::new().with_project_value("monthly_active_users", 5_000.0);
        let evidence = collector(InMemorySearchIndex::new(), NullRuleStore)
            .collect("monthly active users", None, &ctx, &mut CallLedger::default())
            .await;
        let definite = evidence.definite.unwrap();
        assert_eq!(definite.value(), Some(5_000.0));
        assert_eq!(definite.source(), Source::Literal);
        assert_eq!(definite.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_learned_rule_is_literal() {
        let ctx = Context::new().with_domain("B2B_SaaS");
        let rules = InMemoryRuleStore::new();
        rules
            .save(&LearnedRule {
                key: rule_key("B2B SaaS churn rate", &ctx),
                question: "B2B SaaS churn rate".to_string(),
                value: 0.05,
                value_range: Some((0.03, 0.07)),
                unit: Some("fraction".to_string()),
                confidence: 0.9,
                certainty: Certainty::High,
                source: Source::Prior,
                evidence_count: 1,
                domain: Some("B2B_SaaS".to_string()),
                region: None,
                time_period: None,
            })
            .unwrap();

        let mut ledger = CallLedger::default();
        let evidence = collector(InMemorySearchIndex::new(), rules)
            .collect("b2b saas CHURN rate", None, &ctx, &mut ledger)
            .await;
        let definite = evidence.definite.unwrap();
        assert_eq!(definite.source(), Source::Literal);
        assert_eq!(definite.value_range, Some((0.03, 0.07)));
        assert_eq!(ledger.search_calls, 0);
    }

    #[tokio::test]
    async fn test_definite_fact_and_related() {
        let index = InMemorySearchIndex::new();
        index
            .add_document(
                Document::new("kr-pop", "South Korea population")
                    .in_collection("definite_facts")
                    .answering("South Korea population", 51_000_000.0),
            )
            .unwrap();

        let evidence = collector(index, NullRuleStore)
            .collect(
                "South Korea population",
                None,
                &Context::new(),
                &mut CallLedger::default(),
            )
            .await;
        let definite = evidence.definite.unwrap();
        assert_eq!(definite.source(), Source::Validator);
        assert_eq!(definite.certainty, Certainty::High);
        assert_eq!(definite.value(), Some(51_000_000.0));
    }

    #[tokio::test]
    async fn test_benchmark_range_is_partial_and_soft_guardrail() {
        let index = InMemorySearchIndex::new();
        index
            .add_document(
                Document::new("saas-churn", "B2B SaaS monthly churn rate")
                    .in_collection("benchmarks")
                    .with_range(0.01, 0.03),
            )
            .unwrap();

        let mut ledger = CallLedger::default();
        let evidence = collector(index, NullRuleStore)
            .collect("B2B SaaS monthly churn rate", None, &Context::new(), &mut ledger)
            .await;
        assert!(evidence.definite.is_none());
        let partial = evidence.partial.unwrap();
        assert_eq!(partial.source(), Source::Rag);
        assert_eq!(partial.certainty, Certainty::Low);
        assert!((partial.value().unwrap() - 0.02).abs() < 1e-12);
        assert_eq!(evidence.soft_guardrails.len(), 1);
        assert_eq!(ledger.search_calls, 2);
    }
}
