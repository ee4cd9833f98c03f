//! Boundary validation configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for boundary rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Reject rates outside [0, 1]
    pub enforce_rate_bounds: bool,

    /// Reject negative counts, amounts and market sizes
    pub enforce_non_negative: bool,

    /// Smallest plausible number of people per counted unit (store, clinic, ...)
    pub min_unit_size: f64,

    /// Confidence multiplier applied when any soft bound is violated
    pub soft_penalty: f64,

    /// Known populations, keyed by lowercase region name
    pub region_populations: BTreeMap<String, f64>,

    /// Parent region of each region, used when a population is unknown
    pub region_parents: BTreeMap<String, String>,
}

fn owned<V: Clone>(pairs: &[(&str, V)]) -> BTreeMap<String, V> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            enforce_rate_bounds: true,
            enforce_non_negative: true,
            min_unit_size: 10.0,
            soft_penalty: 0.8,
            region_populations: owned(&[
                ("south korea", 51_000_000.0),
                ("korea", 51_000_000.0),
                ("한국", 51_000_000.0),
                ("seoul", 9_500_000.0),
                ("서울", 9_500_000.0),
                ("busan", 3_400_000.0),
                ("부산", 3_400_000.0),
                ("jeju", 670_000.0),
                ("제주", 670_000.0),
                ("gangnam", 550_000.0),
                ("강남", 550_000.0),
            ]),
            region_parents: owned(&[
                ("gangnam", "seoul".to_string()),
                ("강남", "서울".to_string()),
                ("seoul", "south korea".to_string()),
                ("서울", "한국".to_string()),
                ("busan", "south korea".to_string()),
                ("부산", "한국".to_string()),
                ("jeju", "south korea".to_string()),
                ("제주", "한국".to_string()),
            ]),
        }
    }
}

impl BoundaryConfig {
    /// Only the definitional rules: rates in [0, 1] and non-negativity
    pub fn permissive() -> Self {
        Self {
            min_unit_size: 1.0,
            soft_penalty: 0.9,
            region_populations: BTreeMap::new(),
            region_parents: BTreeMap::new(),
            ..Self::default()
        }
    }

    /// Tighter unit-size bound and a heavier soft penalty
    pub fn strict() -> Self {
        Self {
            min_unit_size: 20.0,
            soft_penalty: 0.7,
            ..Self::default()
        }
    }

    /// Add or replace a region population
    pub fn with_region(mut self, name: &str, population: f64, parent: Option<&str>) -> Self {
        let name = name.to_lowercase();
        self.region_populations.insert(name.clone(), population);
        if let Some(parent) = parent {
            self.region_parents.insert(name, parent.to_lowercase());
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(self.min_unit_size >= 1.0) {
            return Err("min_unit_size must be at least 1".to_string());
        }
        if !(self.soft_penalty > 0.0 && self.soft_penalty <= 1.0) {
            return Err("soft_penalty must lie in (0, 1]".to_string());
        }
        if let Some((name, _)) = self
            .region_populations
            .iter()
            .find(|(_, p)| !(p.is_finite() && **p > 0.0))
        {
            return Err(format!("population for {name:?} must be positive"));
        }
        Ok(())
    }
}
