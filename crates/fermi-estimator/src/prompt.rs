//! Prompt construction for every model call the pipeline makes

use fermi_domain::{Context, FermiVariable};

/// Opening line of a direct-estimate prompt
pub const PRIOR_TASK: &str =
    "Estimate the value of the quantity below from your own background knowledge.";

/// Opening line of a bare-number prompt
pub const QUICK_NUMBER_TASK: &str = "Give a single rough number for the quantity below.";

/// Opening line of a model-generation prompt
pub const DECOMPOSITION_TASK: &str =
    "Decompose the quantity below into a computable Fermi estimation formula.";

/// Opening line of a plausibility-review prompt
pub const PLAUSIBILITY_TASK: &str =
    "Review whether the estimated value below is plausible for the quantity.";

/// Opening line of the first guardrail-analysis step
pub const RELATIONSHIP_TASK: &str =
    "Determine the mathematical relationship between a target quantity and a known fact.";

/// Opening line of the second guardrail-analysis step
pub const HARDNESS_TASK: &str =
    "Decide whether the following constraint is a logical necessity or an empirical tendency.";

pub(crate) const PRIOR_SCHEMA: &str = r#"{"value": number, "range": [number, number] | null, "unit": string, "certainty": "high" | "medium" | "low", "reasoning": string}"#;

pub(crate) const MODELS_SCHEMA: &str = r#"{"models": [{"id": string, "formula": string, "description": string, "variables": [{"name": string, "description": string, "concept": string}]}]}"#;

pub(crate) const RELATIONSHIP_SCHEMA: &str =
    r#"{"relationship": "UPPER_BOUND" | "LOWER_BOUND" | "UNRELATED", "reasoning": string}"#;

pub(crate) const HARDNESS_SCHEMA: &str = r#"{"is_hard": boolean, "reasoning": string}"#;

pub(crate) const REVIEW_SCHEMA: &str =
    r#"{"hard_violations": [string], "soft_warnings": [string]}"#;

/// Builds prompts about one quantity
pub(crate) struct PromptBuilder<'a> {
    question: &'a str,
    context: &'a Context,
    known: Vec<&'a FermiVariable>,
    constraints: Vec<String>,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(question: &'a str, context: &'a Context) -> Self {
        Self {
            question,
            context,
            known: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Values the model should reuse instead of re-deriving
    pub fn with_known(mut self, known: impl IntoIterator<Item = &'a FermiVariable>) -> Self {
        self.known = known.into_iter().filter(|v| v.value.is_some()).collect();
        self
    }

    /// Guardrail descriptions the answer must respect
    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }

    fn header(&self, task: &str) -> String {
        let mut prompt = String::new();

        // 1. Task
        prompt.push_str(task);
        prompt.push_str("\n\n");

        // 2. Quantity and scope
        prompt.push_str(&format!("Quantity: {}\n", self.question));
        let scope = self.context.scope_labels();
        if !scope.is_empty() {
            prompt.push_str(&format!("Scope: {}\n", scope.join(", ")));
        }
        prompt.push('\n');

        // 3. Known values
        if !self.known.is_empty() {
            prompt.push_str("Known values (reuse these names):\n");
            for variable in &self.known {
                if let Some(value) = variable.value {
                    prompt.push_str(&format!(
                        "- {} = {} ({})\n",
                        variable.name,
                        value,
                        variable.source.as_deref().unwrap_or("given")
                    ));
                }
            }
            prompt.push('\n');
        }

        // 4. Constraints
        if !self.constraints.is_empty() {
            prompt.push_str("Constraints on the answer:\n");
            for line in &self.constraints {
                prompt.push_str(&format!("- {}\n", line));
            }
            prompt.push('\n');
        }
        prompt
    }

    /// Direct estimate with certainty tier
    pub fn prior(&self) -> String {
        let mut prompt = self.header(PRIOR_TASK);
        prompt.push_str(PRIOR_RULES);
        prompt.push_str("\n\n");
        prompt.push_str(JSON_ONLY);
        prompt
    }

    /// Bare number, for variables nothing else could resolve
    pub fn quick_number(&self) -> String {
        let mut prompt = self.header(QUICK_NUMBER_TASK);
        prompt.push_str("Reply with the number only: no words, no units, no ranges.");
        prompt
    }

    /// Candidate Fermi models
    pub fn decomposition(
        &self,
        min_models: usize,
        max_models: usize,
        max_variables: usize,
    ) -> String {
        let mut prompt = self.header(DECOMPOSITION_TASK);
        prompt.push_str(&format!(
            "Propose between {} and {} alternative models. Each model uses at most {} variables.\n",
            min_models, max_models, max_variables
        ));
        prompt.push_str(DECOMPOSITION_RULES);
        prompt.push_str("\n\n");
        prompt.push_str(JSON_ONLY);
        prompt
    }

    /// Plausibility review of an executed model
    pub fn plausibility(&self, value: f64, formula: &str) -> String {
        let mut prompt = self.header(PLAUSIBILITY_TASK);
        prompt.push_str(&format!("Estimated value: {}\nComputed by: {}\n\n", value, formula));
        prompt.push_str(REVIEW_RULES);
        prompt.push_str("\n\n");
        prompt.push_str(JSON_ONLY);
        prompt
    }
}

/// First guardrail step: direction of the relationship
pub(crate) fn relationship_prompt(target: &str, fact: &str, fact_value: f64) -> String {
    format!(
        "{}\n\nTarget quantity: {}\nKnown fact: {} = {}\n\n{}\n\n{}",
        RELATIONSHIP_TASK, target, fact, fact_value, RELATIONSHIP_RULES, JSON_ONLY
    )
}

/// Second guardrail step: necessity or tendency
pub(crate) fn hardness_prompt(target: &str, fact: &str, fact_value: f64, upper: bool) -> String {
    let relation = if upper { "at most" } else { "at least" };
    format!(
        "{}\n\nConstraint: {} is {} {} ({})\n\n{}\n\n{}",
        HARDNESS_TASK, target, relation, fact_value, fact, HARDNESS_RULES, JSON_ONLY
    )
}

const PRIOR_RULES: &str = r#"Rules:
- Only answer if this is a single value you could state from general knowledge
- Give a point value and, if you can, a low/high range around it
- Certainty is "high" only for well-known published figures
- Use "medium" for figures you can reason to with known anchors
- Use "low" for anything you are guessing
- Convert percentages to fractions (5% -> 0.05)

Output format:
{"value": 0.05, "range": [0.03, 0.08], "unit": "fraction", "certainty": "medium", "reasoning": "..."}"#;

const DECOMPOSITION_RULES: &str = r#"Rules:
- The formula uses only + - * / and parentheses over variable names
- Variable names are snake_case identifiers
- Reuse the names of known values exactly when a model needs them
- Prefer variables that are easier to estimate than the original quantity
- Each variable carries a concept: "rate", "count", "amount" or "market_size"

Output format:
{"models": [{"id": "m1", "formula": "households * ownership_rate", "description": "...", "variables": [{"name": "households", "description": "...", "concept": "count"}, {"name": "ownership_rate", "description": "...", "concept": "rate"}]}]}"#;

const REVIEW_RULES: &str = r#"List logically impossible aspects under "hard_violations" (the value cannot be true).
List merely unusual aspects under "soft_warnings". Leave both empty if the value is reasonable.

Output format:
{"hard_violations": [], "soft_warnings": ["..."]}"#;

const RELATIONSHIP_RULES: &str = r#"Answer UPPER_BOUND if the target can never exceed the fact (it is a part of the fact's whole),
LOWER_BOUND if the target can never fall below it, and UNRELATED otherwise.

Output format:
{"relationship": "UPPER_BOUND", "reasoning": "..."}"#;

const HARDNESS_RULES: &str = r#"A HARD constraint holds by definition (a subset cannot exceed its superset).
A SOFT constraint holds usually but can be broken in practice.

Output format:
{"is_hard": true, "reasoning": "..."}"#;

const JSON_ONLY: &str = "Remember: Return ONLY valid JSON, no markdown code blocks, no explanations.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_includes_scope_and_quantity() {
        let ctx = Context::new().with_domain("B2B_SaaS").with_region("Korea");
        let prompt = PromptBuilder::new("B2B SaaS churn rate", &ctx).prior();
        assert!(prompt.starts_with(PRIOR_TASK));
        assert!(prompt.contains("Quantity: B2B SaaS churn rate"));
        assert!(prompt.contains("Scope: B2B SaaS, Korea"));
        assert!(prompt.contains("\"certainty\""));
    }

    #[test]
    fn test_known_values_listed() {
        let ctx = Context::new();
        let known = [
            FermiVariable::known("households", 4_000_000.0, "project_data", 1.0),
            FermiVariable::unknown("ownership_rate"),
        ];
        let prompt = PromptBuilder::new("pet count", &ctx)
            .with_known(known.iter())
            .decomposition(3, 5, 6);
        assert!(prompt.contains("- households = 4000000 (project_data)"));
        assert!(!prompt.contains("- ownership_rate ="));
        assert!(prompt.contains("between 3 and 5"));
    }

    #[test]
    fn test_constraints_listed() {
        let ctx = Context::new();
        let prompt = PromptBuilder::new("q", &ctx)
            .with_constraints(vec!["HARD_UPPER 100: part of whole".to_string()])
            .prior();
        assert!(prompt.contains("Constraints on the answer:"));
        assert!(prompt.contains("HARD_UPPER 100"));
    }

    #[test]
    fn test_task_lines_are_distinct() {
        let ctx = Context::new();
        let builder = PromptBuilder::new("q", &ctx);
        let prompts = [
            builder.prior(),
            builder.quick_number(),
            builder.decomposition(3, 5, 6),
            builder.plausibility(1.0, "a * b"),
            relationship_prompt("q", "fact", 1.0),
            hardness_prompt("q", "fact", 1.0, true),
        ];
        let tasks = [
            PRIOR_TASK,
            QUICK_NUMBER_TASK,
            DECOMPOSITION_TASK,
            PLAUSIBILITY_TASK,
            RELATIONSHIP_TASK,
            HARDNESS_TASK,
        ];
        for (i, prompt) in prompts.iter().enumerate() {
            for (j, task) in tasks.iter().enumerate() {
                assert_eq!(prompt.contains(task), i == j, "prompt {} vs task {}", i, j);
            }
        }
    }
}
