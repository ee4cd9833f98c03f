//! Model ranking and the variable-count policy

use crate::config::{FermiConfig, ScoringWeights};
use fermi_domain::confidence_computation::geometric_mean;
use fermi_domain::FermiModel;

/// Simplicity component: 1.0 up to two variables, 0 past ten
pub fn simplicity_score(variables: usize) -> f64 {
    match variables {
        0..=2 => 1.0,
        3 => 0.9,
        4 => 0.7,
        5 => 0.5,
        6 => 0.3,
        7 => 0.2,
        8 => 0.15,
        9 => 0.10,
        10 => 0.05,
        _ => 0.0,
    }
}

/// Shallowness component: 1.0 at the top level, 0.2 from depth 4 down
pub fn shallowness_score(depth: usize) -> f64 {
    match depth {
        0 => 1.0,
        1 => 0.8,
        2 => 0.6,
        3 => 0.4,
        _ => 0.2,
    }
}

/// Components of one model's ranking score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelScore {
    /// Normalized weighted sum in [0, 1]
    pub total: f64,
    /// Share of variables with a value
    pub filled_ratio: f64,
    /// Geometric mean of resolved variables' confidences
    pub confidence: f64,
    /// Simplicity component
    pub simplicity: f64,
    /// Shallowness component
    pub shallowness: f64,
}

/// Score a model evaluated at `depth`
pub fn score_model(model: &FermiModel, depth: usize, weights: &ScoringWeights) -> ModelScore {
    let total_vars = model.total_variables();
    let filled_ratio = if total_vars == 0 {
        0.0
    } else {
        model.filled_count() as f64 / total_vars as f64
    };
    let confidence = geometric_mean(&model.filled_confidences()).unwrap_or(0.0);
    let simplicity = simplicity_score(total_vars);
    let shallowness = shallowness_score(depth);

    let weighted = weights.filled * filled_ratio
        + weights.confidence * confidence
        + weights.simplicity * simplicity
        + weights.shallowness * shallowness;
    let total = if weights.total() > 0.0 {
        (weighted / weights.total()).clamp(0.0, 1.0)
    } else {
        0.0
    };

    ModelScore {
        total,
        filled_ratio,
        confidence,
        simplicity,
        shallowness,
    }
}

/// Verdict of the variable-count policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyVerdict {
    /// Within the recommended limit
    Accepted,
    /// Above the recommendation; kept with a warning
    Flagged,
    /// No variables, or above the absolute cap; discarded
    Rejected,
}

/// Apply the variable-count policy to a model size
pub fn variable_policy(variables: usize, config: &FermiConfig) -> PolicyVerdict {
    if variables == 0 || variables > config.absolute_max_variables {
        PolicyVerdict::Rejected
    } else if variables > config.recommended_max_variables {
        PolicyVerdict::Flagged
    } else {
        PolicyVerdict::Accepted
    }
}

/// Score every model and sort best first
///
/// Each model's `feasibility_score` is set to its total. Ties keep the
/// model with fewer variables first.
pub fn rank_models(
    models: Vec<FermiModel>,
    depth: usize,
    weights: &ScoringWeights,
) -> Vec<(FermiModel, ModelScore)> {
    let mut ranked: Vec<(FermiModel, ModelScore)> = models
        .into_iter()
        .map(|mut model| {
            let score = score_model(&model, depth, weights);
            model.feasibility_score = score.total;
            (model, score)
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.1.total
            .total_cmp(&a.1.total)
            .then(a.0.total_variables().cmp(&b.0.total_variables()))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use fermi_domain::FermiVariable;

    fn model(id: &str, known: usize, unknown: usize) -> FermiModel {
        let mut m = FermiModel::new(id, "x");
        for i in 0..known {
            m = m.with_variable(FermiVariable::known(format!("k{}", i), 1.0, "test", 0.9));
        }
        for i in 0..unknown {
            m = m.with_variable(FermiVariable::unknown(format!("u{}", i)));
        }
        m
    }

    #[test]
    fn test_simplicity_table() {
        assert_eq!(simplicity_score(2), 1.0);
        assert_eq!(simplicity_score(6), 0.3);
        assert_eq!(simplicity_score(10), 0.05);
        assert_eq!(simplicity_score(11), 0.0);
        for n in 1..12 {
            assert!(simplicity_score(n + 1) <= simplicity_score(n));
        }
    }

    #[test]
    fn test_shallowness_decreases_with_depth() {
        assert_eq!(shallowness_score(0), 1.0);
        assert_eq!(shallowness_score(4), 0.2);
        assert_eq!(shallowness_score(9), 0.2);
    }

    #[test]
    fn test_score_is_normalized() {
        let weights = ScoringWeights::default();
        let score = score_model(&model("m", 2, 0), 0, &weights);
        // (0.5 * 1 + 0.3 * 0.9 + 0.2 * 1 + 0.1 * 1) / 1.1
        assert!((score.total - 1.07 / 1.1).abs() < 1e-9);
        assert!(score.total <= 1.0);
    }

    #[test]
    fn test_filled_models_rank_first() {
        let ranked = rank_models(
            vec![model("partial", 1, 2), model("full", 3, 0)],
            0,
            &ScoringWeights::default(),
        );
        assert_eq!(ranked[0].0.id, "full");
        assert!(ranked[0].0.feasibility_score > ranked[1].0.feasibility_score);
    }

    #[test]
    fn test_variable_policy() {
        let config = FermiConfig::default();
        assert_eq!(variable_policy(0, &config), PolicyVerdict::Rejected);
        assert_eq!(variable_policy(1, &config), PolicyVerdict::Accepted);
        assert_eq!(variable_policy(6, &config), PolicyVerdict::Accepted);
        assert_eq!(variable_policy(7, &config), PolicyVerdict::Flagged);
        assert_eq!(variable_policy(10, &config), PolicyVerdict::Flagged);
        assert_eq!(variable_policy(11, &config), PolicyVerdict::Rejected);
    }
}
