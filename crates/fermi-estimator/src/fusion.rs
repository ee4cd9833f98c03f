//! Stage 4: fusion of stage outputs
//!
//! Outputs are averaged with their certainty-tier weights. Agreement between
//! two independent estimates raises confidence; the hard-guardrail clamp is
//! applied last and never raises it.

use crate::config::FusionConfig;
use fermi_domain::confidence_computation::{agreement_boost, relative_difference, weighted_average};
use fermi_domain::{
    CertaintyClassifier, Cost, EstimationResult, ReasoningDetail, Source, VariableProvenance,
};
use fermi_guardrail::GuardrailCollector;
use tracing::debug;

/// Stage 4 combiner
#[derive(Debug, Clone)]
pub(crate) struct FusionEngine {
    classifier: CertaintyClassifier,
    config: FusionConfig,
}

/// Intersection of ranges, or their union when they do not overlap
fn combine_ranges(ranges: &[(f64, f64)]) -> Option<(f64, f64)> {
    let first = ranges.first()?;
    let low = ranges.iter().map(|r| r.0).fold(first.0, f64::max);
    let high = ranges.iter().map(|r| r.1).fold(first.1, f64::min);
    if low <= high {
        return Some((low, high));
    }
    let low = ranges.iter().map(|r| r.0).fold(first.0, f64::min);
    let high = ranges.iter().map(|r| r.1).fold(first.1, f64::max);
    Some((low, high))
}

impl FusionEngine {
    pub fn new(classifier: CertaintyClassifier, config: FusionConfig) -> Self {
        Self { classifier, config }
    }

    /// Fuse successful outputs; `None` when there are none
    pub fn fuse(
        &self,
        question: &str,
        outputs: Vec<EstimationResult>,
        collector: &GuardrailCollector,
    ) -> Option<EstimationResult> {
        let outputs: Vec<EstimationResult> =
            outputs.into_iter().filter(|r| r.is_success()).collect();
        if outputs.is_empty() {
            return None;
        }
        if outputs.len() == 1 {
            return outputs.into_iter().next().map(|only| self.clamp_single(only, collector));
        }

        let points: Vec<(f64, f64, f64)> = outputs
            .iter()
            .filter_map(|r| {
                r.value()
                    .map(|v| (v, r.confidence, self.classifier.weight(r.certainty)))
            })
            .collect();
        let fused = weighted_average(&points.iter().map(|(v, _, w)| (*v, *w)).collect::<Vec<_>>())?;
        let base = weighted_average(&points.iter().map(|(_, c, w)| (*c, *w)).collect::<Vec<_>>())?;

        // Best confidence among pairs that agree
        let mut anchor: Option<f64> = None;
        for (i, a) in points.iter().enumerate() {
            for b in &points[i + 1..] {
                if relative_difference(a.0, b.0) <= self.config.agreement_tolerance {
                    let pair = a.1.max(b.1);
                    anchor = Some(anchor.map_or(pair, |best| best.max(pair)));
                }
            }
        }
        let confidence = match anchor {
            Some(pair) => base.max(agreement_boost(pair, self.config.agreement_bonus)),
            None => base,
        };

        let mut detail = ReasoningDetail::method("fusion");
        detail.scores.insert("contributors".to_string(), outputs.len() as f64);
        for output in &outputs {
            detail.variables.push(VariableProvenance {
                name: output.reasoning_detail.method.clone(),
                value: output.value(),
                source: output.source().as_str().to_string(),
                confidence: output.confidence,
            });
        }
        if anchor.is_some() {
            detail.notes.push("independent estimates agree".to_string());
        }

        let (value, clamped) = collector.clamp(fused);
        if clamped {
            detail.notes.push(format!("clamped {} to hard bound {}", fused, value));
        }
        debug!(
            "Stage 4: fused {} outputs for '{}' -> {} (confidence {:.3})",
            outputs.len(),
            question,
            value,
            confidence
        );

        let mut result = EstimationResult::success(
            question,
            value,
            Source::Fusion,
            self.classifier.classify(confidence),
            confidence,
        )
        .with_reasoning(
            outputs
                .iter()
                .map(|r| format!("{}: {}", r.source(), r.value().unwrap_or_default()))
                .collect::<Vec<_>>()
                .join("; "),
        )
        .with_detail(detail)
        .with_cost(outputs.iter().fold(Cost::default(), |acc, r| acc.combine(&r.cost)));

        let ranges: Vec<(f64, f64)> = outputs.iter().filter_map(|r| r.value_range).collect();
        if let Some((low, high)) = combine_ranges(&ranges) {
            let (low, _) = collector.clamp(low);
            let (high, _) = collector.clamp(high);
            result = result.with_range(low, high);
        }
        if let Some(unit) = outputs.iter().find_map(|r| r.unit.clone()) {
            result = result.with_unit(unit);
        }
        if let Some(trace) = outputs.iter().find_map(|r| r.decomposition.clone()) {
            result = result.with_decomposition(trace);
        }
        Some(result)
    }

    /// A lone output keeps its source and confidence; only the clamp applies
    fn clamp_single(
        &self,
        mut only: EstimationResult,
        collector: &GuardrailCollector,
    ) -> EstimationResult {
        let Some(value) = only.value() else {
            return only;
        };
        let (clamped_value, clamped) = collector.clamp(value);
        if let Some((low, high)) = only.value_range {
            let (low, _) = collector.clamp(low);
            let (high, _) = collector.clamp(high);
            only.value_range = Some((low, high));
        }
        if !clamped {
            return only;
        }

        debug!("Stage 4: clamped {} to hard bound {}", value, clamped_value);
        let mut detail = only.reasoning_detail.clone();
        detail.notes.push(format!("clamped {} to hard bound {}", value, clamped_value));
        let mut result = EstimationResult::success(
            only.question.clone(),
            clamped_value,
            only.source(),
            only.certainty,
            only.confidence,
        )
        .with_reasoning(only.reasoning.clone())
        .with_detail(detail)
        .with_cost(only.cost);
        result.value_range = only.value_range;
        result.unit = only.unit.clone();
        result.decomposition = only.decomposition.clone();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fermi_domain::{Certainty, Guardrail};

    fn engine() -> FusionEngine {
        FusionEngine::new(CertaintyClassifier::default(), FusionConfig::default())
    }

    fn output(value: f64, source: Source, certainty: Certainty) -> EstimationResult {
        let confidence = CertaintyClassifier::default().weight(certainty);
        EstimationResult::success("q", value, source, certainty, confidence)
    }

    #[test]
    fn test_agreement_raises_confidence() {
        let fused = engine()
            .fuse(
                "q",
                vec![
                    output(100.0, Source::Prior, Certainty::Medium),
                    output(110.0, Source::Fermi, Certainty::Medium),
                ],
                &GuardrailCollector::new(),
            )
            .unwrap();
        assert_eq!(fused.source(), Source::Fusion);
        assert!(fused.confidence > 0.70);
        assert!((fused.value().unwrap() - 105.0).abs() < 1e-9);
    }

    #[test]
    fn test_disagreement_does_not_exceed_best_input() {
        let fused = engine()
            .fuse(
                "q",
                vec![
                    output(10.0, Source::Prior, Certainty::High),
                    output(1_000.0, Source::Fermi, Certainty::Low),
                ],
                &GuardrailCollector::new(),
            )
            .unwrap();
        assert!(fused.confidence <= 0.90);
    }

    #[test]
    fn test_guardrail_bounded_fusion() {
        let collector =
            GuardrailCollector::seeded(vec![Guardrail::hard_upper(
                100_000.0,
                "part of whole",
                "test",
            )]);
        let fused = engine()
            .fuse(
                "q",
                vec![
                    output(90_000.0, Source::Fermi, Certainty::Medium),
                    output(150_000.0, Source::Prior, Certainty::Medium),
                ],
                &collector,
            )
            .unwrap();
        assert!(fused.value().unwrap() <= 100_000.0);
        assert_eq!(fused.value(), Some(100_000.0));
        assert!(fused.reasoning_detail.notes.iter().any(|n| n.contains("clamped")));
    }

    #[test]
    fn test_single_output_keeps_source_but_is_clamped() {
        let collector =
            GuardrailCollector::seeded(vec![Guardrail::hard_upper(
                100_000.0,
                "part of whole",
                "test",
            )]);
        let fused = engine()
            .fuse("q", vec![output(150_000.0, Source::Fermi, Certainty::High)], &collector)
            .unwrap();
        assert_eq!(fused.source(), Source::Fermi);
        assert_eq!(fused.value(), Some(100_000.0));
        assert_eq!(fused.confidence, 0.90);
    }

    #[test]
    fn test_failures_are_ignored() {
        let fused = engine().fuse(
            "q",
            vec![EstimationResult::failure("q", "nothing")],
            &GuardrailCollector::new(),
        );
        assert!(fused.is_none());
    }

    #[test]
    fn test_ranges_intersect_then_union() {
        assert_eq!(combine_ranges(&[(1.0, 10.0), (5.0, 20.0)]), Some((5.0, 10.0)));
        assert_eq!(combine_ranges(&[(1.0, 2.0), (5.0, 6.0)]), Some((1.0, 6.0)));
        assert_eq!(combine_ranges(&[]), None);
    }
}
