//! Append-only guardrail accumulator

use crate::GuardrailError;
use fermi_domain::{Guardrail, HardBounds};
use tracing::debug;

/// Guardrails discovered for one question
///
/// Guardrails are only ever appended, so the order in which stages add them
/// does not change the resulting bounds.
#[derive(Debug, Clone, Default)]
pub struct GuardrailCollector {
    guardrails: Vec<Guardrail>,
}

impl GuardrailCollector {
    /// Empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Collector seeded with caller-known guardrails
    ///
    /// Malformed guardrails are skipped.
    pub fn seeded(guardrails: impl IntoIterator<Item = Guardrail>) -> Self {
        let mut collector = Self::new();
        for guardrail in guardrails {
            if let Err(e) = collector.add(guardrail) {
                debug!("Skipping seeded guardrail: {}", e);
            }
        }
        collector
    }

    /// Append a guardrail
    pub fn add(&mut self, guardrail: Guardrail) -> Result<(), GuardrailError> {
        if !guardrail.is_well_formed() {
            return Err(GuardrailError::InvalidGuardrail(format!(
                "{} with value {} ({})",
                guardrail.kind, guardrail.value, guardrail.reasoning
            )));
        }
        self.guardrails.push(guardrail);
        Ok(())
    }

    /// All guardrails in insertion order
    pub fn guardrails(&self) -> &[Guardrail] {
        &self.guardrails
    }

    /// Number of guardrails
    pub fn len(&self) -> usize {
        self.guardrails.len()
    }

    /// Whether no guardrail was collected
    pub fn is_empty(&self) -> bool {
        self.guardrails.is_empty()
    }

    /// Soft guardrails only
    pub fn soft(&self) -> impl Iterator<Item = &Guardrail> {
        self.guardrails.iter().filter(|g| !g.is_hard())
    }

    /// Tightest hard interval: min of hard uppers, max of hard lowers
    pub fn hard_bounds(&self) -> HardBounds {
        use fermi_domain::GuardrailType::{HardLower, HardUpper};

        let mut bounds = HardBounds::default();
        for guardrail in &self.guardrails {
            let value = guardrail.value;
            match guardrail.kind {
                HardUpper => bounds.upper = Some(bounds.upper.map_or(value, |u| u.min(value))),
                HardLower => bounds.lower = Some(bounds.lower.map_or(value, |l| l.max(value))),
                _ => {}
            }
        }
        bounds
    }

    /// Clip a value into the hard interval
    pub fn clamp(&self, value: f64) -> (f64, bool) {
        self.hard_bounds().clamp(value)
    }

    /// One line per guardrail, for prompts and reasoning traces
    pub fn describe(&self) -> Vec<String> {
        self.guardrails
            .iter()
            .map(|g| match g.upper {
                Some(high) => format!("{} [{}, {}]: {}", g.kind, g.value, high, g.reasoning),
                None => format!("{} {}: {}", g.kind, g.value, g.reasoning),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fermi_domain::GuardrailType;

    #[test]
    fn test_hard_bounds_take_tightest() {
        let mut collector = GuardrailCollector::new();
        collector.add(Guardrail::hard_upper(200.0, "a", "t")).unwrap();
        collector.add(Guardrail::hard_upper(100.0, "b", "t")).unwrap();
        collector.add(Guardrail::hard_lower(5.0, "c", "t")).unwrap();
        collector.add(Guardrail::hard_lower(10.0, "d", "t")).unwrap();
        collector
            .add(Guardrail::new(GuardrailType::SoftUpper, 50.0, "soft", "t"))
            .unwrap();

        let bounds = collector.hard_bounds();
        assert_eq!(bounds.upper, Some(100.0));
        assert_eq!(bounds.lower, Some(10.0));
        assert_eq!(collector.soft().count(), 1);
    }

    #[test]
    fn test_hard_kind_always_clamps() {
        let mut guardrail = Guardrail::new(GuardrailType::SoftUpper, 100.0, "retyped", "t");
        guardrail.kind = GuardrailType::HardUpper;
        let collector = GuardrailCollector::seeded(vec![guardrail]);
        assert_eq!(collector.clamp(150.0), (100.0, true));
        assert_eq!(collector.soft().count(), 0);
    }

    #[test]
    fn test_soft_guardrails_do_not_clamp() {
        let mut collector = GuardrailCollector::new();
        collector
            .add(Guardrail::new(GuardrailType::SoftUpper, 50.0, "soft", "t"))
            .unwrap();
        assert_eq!(collector.clamp(80.0), (80.0, false));
    }

    #[test]
    fn test_order_independent() {
        let a = Guardrail::hard_upper(100.0, "a", "t");
        let b = Guardrail::hard_upper(70.0, "b", "t");
        let forward = GuardrailCollector::seeded(vec![a.clone(), b.clone()]);
        let backward = GuardrailCollector::seeded(vec![b, a]);
        assert_eq!(forward.hard_bounds(), backward.hard_bounds());
    }

    #[test]
    fn test_malformed_rejected() {
        let mut collector = GuardrailCollector::new();
        assert!(collector.add(Guardrail::hard_upper(f64::NAN, "nan", "t")).is_err());
        assert!(collector
            .add(Guardrail::expected_range(10.0, 1.0, "inverted", "t"))
            .is_err());
        assert!(collector.is_empty());
    }
}
