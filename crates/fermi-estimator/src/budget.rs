//! Recursion frames and the whole-call budget
//!
//! A `Frame` travels down one branch of the decomposition tree by value, so
//! sibling branches never see each other's cycle stack. The `RunState` is
//! shared by reference across the entire call tree; its counter is the only
//! thing that bounds the total number of sub-estimations.

use fermi_domain::{normalize_question, FermiVariable, RequestId};
use std::collections::{BTreeMap, HashSet};

/// Counters for one `estimate` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CallLedger {
    pub llm_calls: usize,
    pub search_calls: usize,
    pub timeouts: usize,
    pub provider_errors: usize,
    pub parse_failures: usize,
    pub variable_estimates: usize,
    pub boundary_rejections: usize,
    pub cycles: usize,
    pub budget_exhausted: usize,
}

/// One branch of the decomposition tree
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub depth: usize,
    /// Variable this frame estimates; `None` for the caller's question
    pub variable: Option<String>,
    stack: Vec<String>,
    /// Values resolved by ancestors, keyed by lowercase variable name
    pub inherited: BTreeMap<String, FermiVariable>,
}

impl Frame {
    /// Frame for a top-level question
    pub fn root(question: &str) -> Self {
        Self {
            depth: 0,
            variable: None,
            stack: vec![normalize_question(question)],
            inherited: BTreeMap::new(),
        }
    }

    /// Whether `question` is already being estimated on this branch
    pub fn contains(&self, question: &str) -> bool {
        let normalized = normalize_question(question);
        self.stack.iter().any(|q| *q == normalized)
    }

    /// Child frame estimating `variable` through `question`
    pub fn descend(
        &self,
        variable: &str,
        question: &str,
        seed: &BTreeMap<String, FermiVariable>,
    ) -> Self {
        let mut inherited = self.inherited.clone();
        for (name, variable) in seed {
            inherited
                .entry(name.clone())
                .or_insert_with(|| variable.clone());
        }
        let mut stack = self.stack.clone();
        stack.push(normalize_question(question));
        Self {
            depth: self.depth + 1,
            variable: Some(variable.to_string()),
            stack,
            inherited,
        }
    }
}

/// State shared by every stage of one `estimate` call
#[derive(Debug)]
pub(crate) struct RunState {
    pub request_id: RequestId,
    pub ledger: CallLedger,
    variable_cap: usize,
    /// Sub-variables resolved anywhere in the call tree
    pub resolved: BTreeMap<String, FermiVariable>,
    analyzed: HashSet<(String, String)>,
}

impl RunState {
    pub fn new(request_id: RequestId, variable_cap: usize) -> Self {
        Self {
            request_id,
            ledger: CallLedger::default(),
            variable_cap,
            resolved: BTreeMap::new(),
            analyzed: HashSet::new(),
        }
    }

    /// Take one unit of the sub-estimation budget
    pub fn try_consume_variable(&mut self) -> bool {
        if self.ledger.variable_estimates >= self.variable_cap {
            return false;
        }
        self.ledger.variable_estimates += 1;
        true
    }

    /// Remaining sub-estimation budget
    pub fn remaining_variables(&self) -> usize {
        self.variable_cap.saturating_sub(self.ledger.variable_estimates)
    }

    /// Record that a fact was analysed for a question; false if it already was
    pub fn mark_analyzed(&mut self, question: &str, document_id: &str) -> bool {
        self.analyzed
            .insert((normalize_question(question), document_id.to_string()))
    }
}
