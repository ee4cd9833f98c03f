//! Metrics collected across estimation runs

use crate::budget::CallLedger;
use fermi_domain::Source;
use std::collections::HashMap;
use std::time::Duration;

/// Counters accumulated by an [`crate::Estimator`]
///
/// Tracks answers per source, external calls, and the reasons branches
/// were abandoned.
#[derive(Debug, Clone, Default)]
pub struct EstimatorMetrics {
    /// Final answers per source (failures included)
    pub by_source: HashMap<Source, usize>,

    /// Model calls made
    pub llm_calls: usize,

    /// Retrieval calls made
    pub search_calls: usize,

    /// Calls abandoned at their timeout
    pub timeouts: usize,

    /// Model replies that could not be parsed
    pub parse_failures: usize,

    /// Sub-variable estimates spent
    pub variable_estimates: usize,

    /// Sub-questions skipped because they were already on the branch
    pub cycles_detected: usize,

    /// Candidate models rejected by boundary validation
    pub boundary_rejections: usize,

    /// Sub-variables left unresolved because the budget ran out
    pub budget_exhausted: usize,

    /// Results written back to the learned-rule store
    pub rules_learned: usize,

    /// Wall-clock time across all runs
    pub total_elapsed: Duration,
}

impl EstimatorMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one completed run
    pub(crate) fn record_run(&mut self, source: Source, ledger: &CallLedger, elapsed: Duration) {
        *self.by_source.entry(source).or_insert(0) += 1;
        self.llm_calls += ledger.llm_calls;
        self.search_calls += ledger.search_calls;
        self.timeouts += ledger.timeouts;
        self.parse_failures += ledger.parse_failures;
        self.variable_estimates += ledger.variable_estimates;
        self.cycles_detected += ledger.cycles;
        self.boundary_rejections += ledger.boundary_rejections;
        self.budget_exhausted += ledger.budget_exhausted;
        self.total_elapsed += elapsed;
    }

    /// Record a learned-rule write
    pub fn record_learned(&mut self) {
        self.rules_learned += 1;
    }

    /// Runs recorded
    pub fn total_runs(&self) -> usize {
        self.by_source.values().sum()
    }

    /// Runs that ended in failure
    pub fn total_failures(&self) -> usize {
        self.by_source.get(&Source::Failure).copied().unwrap_or(0)
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a summary report of metrics
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Estimator Metrics Summary".to_string(),
            "=========================".to_string(),
            format!("Runs: {}", self.total_runs()),
            format!("Failures: {}", self.total_failures()),
            format!("Total time: {:.3}s", self.total_elapsed.as_secs_f64()),
            String::new(),
        ];

        if !self.by_source.is_empty() {
            lines.push("Answers by source:".to_string());
            let mut sources: Vec<_> = self.by_source.iter().collect();
            sources.sort_by_key(|(source, _)| source.as_str());
            for (source, count) in sources {
                lines.push(format!("  {}: {}", source, count));
            }
            lines.push(String::new());
        }

        lines.push(format!("LLM calls: {}", self.llm_calls));
        lines.push(format!("Search calls: {}", self.search_calls));
        lines.push(format!("Timeouts: {}", self.timeouts));
        lines.push(format!("Parse failures: {}", self.parse_failures));
        lines.push(format!("Variable estimates: {}", self.variable_estimates));
        lines.push(format!("Cycles detected: {}", self.cycles_detected));
        lines.push(format!("Boundary rejections: {}", self.boundary_rejections));
        lines.push(format!("Budget exhausted: {}", self.budget_exhausted));
        lines.push(format!("Rules learned: {}", self.rules_learned));

        lines.join("\n")
    }
}
