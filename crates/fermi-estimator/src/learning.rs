//! Write-back of confident results as learned rules

use crate::config::LearningConfig;
use fermi_domain::traits::LearnedRule;
use fermi_domain::{Context, EstimationResult, Source};
use fermi_store::rule_key;

/// Number of independent outputs behind a result
pub(crate) fn evidence_count(result: &EstimationResult) -> usize {
    result
        .reasoning_detail
        .scores
        .get("contributors")
        .map(|n| n.round().max(1.0) as usize)
        .unwrap_or(1)
}

/// Whether a final result is worth persisting
///
/// Literal results already came from data or a rule, and failures carry
/// nothing to learn.
pub(crate) fn should_learn(result: &EstimationResult, config: &LearningConfig) -> bool {
    if !config.enabled || result.is_failure() || result.source() == Source::Literal {
        return false;
    }
    let evidence = evidence_count(result);
    result.confidence >= config.high_confidence
        || (result.confidence >= config.min_confidence && evidence >= config.min_evidence)
}

/// Rule persisted for a final result; `None` for failures
pub(crate) fn to_rule(
    question: &str,
    context: &Context,
    result: &EstimationResult,
) -> Option<LearnedRule> {
    Some(LearnedRule {
        key: rule_key(question, context),
        question: question.to_string(),
        value: result.value()?,
        value_range: result.value_range,
        unit: result.unit.clone(),
        confidence: result.confidence,
        certainty: result.certainty,
        source: result.source(),
        evidence_count: evidence_count(result),
        domain: context.domain.clone(),
        region: context.region.clone(),
        time_period: context.time_period.clone(),
    })
}
