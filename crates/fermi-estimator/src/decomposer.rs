//! Stage 3: Fermi decomposition
//!
//! One decomposition runs SCAN, GENERATE_MODELS, CHECK_FEASIBILITY,
//! EXECUTE and VALIDATE_BOUNDARY in that order:
//!
//! ```text
//! known values ─▶ candidate models ─▶ policy filter ─▶ retrieval refinement
//!      ─▶ recursive sub-estimates ─▶ rank ─▶ evaluate ─▶ boundary check
//! ```
//!
//! Unknown variables are estimated by calling back into the full pipeline
//! through [`SubEstimator`], one level deeper. The first ranked model that
//! evaluates and passes the boundary check wins.

use crate::budget::{Frame, RunState};
use crate::client::{CallKind, ModelClient, SearchClient};
use crate::config::{FermiConfig, RetrievalConfig, ScoringWeights};
use crate::formula::{self, Evaluation};
use crate::parser::{parse_models, parse_review};
use crate::prompt::{PromptBuilder, MODELS_SCHEMA, REVIEW_SCHEMA};
use crate::scoring::{rank_models, score_model, variable_policy, ModelScore, PolicyVerdict};
use fermi_domain::confidence_computation::geometric_mean;
use fermi_domain::traits::{LearnedRuleStore, LlmProvider, SearchBackend};
use fermi_domain::{
    CertaintyClassifier, Context, DecompositionTrace, EstimationResult, FermiModel, FermiVariable,
    ReasoningDetail, Source, VariableProvenance,
};
use fermi_guardrail::{BoundaryCheck, BoundaryValidator, GuardrailCollector};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Boxed future used at the recursion seam
pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Estimates a sub-variable by re-entering the pipeline
pub(crate) trait SubEstimator: Sync {
    fn estimate_variable<'a>(
        &'a self,
        question: String,
        context: &'a Context,
        frame: Frame,
        state: &'a mut RunState,
    ) -> BoxFuture<'a, Option<EstimationResult>>;
}

fn var_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Unresolved variable names across models, first occurrence first
fn unknown_names(models: &[FermiModel]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for model in models {
        for variable in model.variables.values().filter(|v| !v.available) {
            if !names.iter().any(|n| var_key(n) == var_key(&variable.name)) {
                names.push(variable.name.clone());
            }
        }
    }
    names
}

fn fill_named(models: &mut [FermiModel], name: &str, filled: &FermiVariable) {
    let key = var_key(name);
    for model in models.iter_mut() {
        for variable in model.variables.values_mut() {
            if !variable.available && var_key(&variable.name) == key {
                variable.available = true;
                variable.need_estimate = false;
                variable.value = filled.value;
                variable.source = filled.source.clone();
                variable.confidence = filled.confidence;
                variable.estimation_result = filled.estimation_result.clone();
            }
        }
    }
}

/// Stage 3 engine
pub(crate) struct FermiDecomposer<L, S, R> {
    client: Arc<ModelClient<L>>,
    search: Arc<SearchClient<S, R>>,
    validator: BoundaryValidator,
    config: FermiConfig,
    weights: ScoringWeights,
    retrieval: RetrievalConfig,
    classifier: CertaintyClassifier,
}

impl<L, S, R> FermiDecomposer<L, S, R>
where
    L: LlmProvider + Send + Sync + 'static,
    L::Error: Display,
    S: SearchBackend + Send + Sync + 'static,
    S::Error: Display,
    R: LearnedRuleStore + Send + Sync + 'static,
    R::Error: Display,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<ModelClient<L>>,
        search: Arc<SearchClient<S, R>>,
        validator: BoundaryValidator,
        config: FermiConfig,
        weights: ScoringWeights,
        retrieval: RetrievalConfig,
        classifier: CertaintyClassifier,
    ) -> Self {
        Self {
            client,
            search,
            validator,
            config,
            weights,
            retrieval,
            classifier,
        }
    }

    /// Decompose `question` and return the first model that survives
    pub async fn decompose(
        &self,
        question: &str,
        context: &Context,
        frame: &Frame,
        collector: &GuardrailCollector,
        state: &mut RunState,
        sub: &dyn SubEstimator,
    ) -> Option<EstimationResult> {
        info!("Stage 3: decomposing '{}' at depth {}", question, frame.depth);

        // 1. Values already known on this branch
        let known = self.scan(question, context, frame, state).await;

        // 2. Candidate models, minus those with too many variables
        let generated = self.generate_models(question, context, &known, state).await;
        let mut models = self.apply_policy(generated);
        if models.is_empty() {
            debug!("Stage 3: no usable model for '{}'", question);
            return None;
        }

        // 3. Cheap retrieval before any recursion
        self.refine(&mut models, context, state).await;

        // 4. Recursive estimation of what is still unknown
        self.fill_unknowns(&mut models, context, frame, &known, state, sub)
            .await;

        // 5. Rank, execute, validate
        let ranked = rank_models(models, frame.depth, &self.weights);
        let candidates = ranked.len();
        for (rank, (model, score)) in ranked.into_iter().enumerate() {
            if !model.is_fully_resolved() {
                debug!(
                    "Model {} skipped: {} unresolved variables",
                    model.id,
                    model.unknown_count()
                );
                continue;
            }
            let evaluation = match formula::evaluate(&model.formula, &model.bindings()) {
                Ok(evaluation) => evaluation,
                Err(e) => {
                    debug!("Model {} could not be evaluated: {}", model.id, e);
                    continue;
                }
            };

            let mut check = self
                .validator
                .validate(question, evaluation.value, context, collector);
            if check.is_valid() && self.config.llm_boundary_review {
                self.review(question, context, evaluation.value, &model, &mut check, state)
                    .await;
            }
            if !check.is_valid() {
                state.ledger.boundary_rejections += 1;
                warn!(
                    "Model {} rejected for '{}': {}",
                    model.id,
                    question,
                    check.messages().join("; ")
                );
                continue;
            }

            info!(
                "Stage 3: '{}' = {} via model {} ({})",
                question, evaluation.value, model.id, model.formula
            );
            return Some(self.build_result(
                question, &model, score, evaluation, &check, frame.depth, rank, candidates,
            ));
        }

        warn!("Stage 3: no model for '{}' survived execution", question);
        None
    }

    async fn scan(
        &self,
        question: &str,
        context: &Context,
        frame: &Frame,
        state: &mut RunState,
    ) -> BTreeMap<String, FermiVariable> {
        let mut known = frame.inherited.clone();

        for (key, value) in &context.project_data {
            known
                .entry(var_key(key))
                .or_insert_with(|| FermiVariable::known(key.clone(), *value, "project_data", 1.0));
        }

        let hits = self
            .search
            .search(question, self.retrieval.top_k, None, &mut state.ledger)
            .await;
        for hit in hits
            .into_iter()
            .filter(|h| h.score >= self.retrieval.related_threshold)
        {
            let (Some(name), Some(value)) = (
                hit.document.variable.clone(),
                hit.document.representative_value(),
            ) else {
                continue;
            };
            let confidence = hit.document.confidence.unwrap_or(self.classifier.medium);
            let source = format!("retrieval:{}", hit.document.id);
            known
                .entry(var_key(&name))
                .or_insert_with(|| FermiVariable::known(name, value, source, confidence));
        }

        for (key, variable) in &state.resolved {
            known.entry(key.clone()).or_insert_with(|| variable.clone());
        }

        for (key, value) in &context.constants {
            known
                .entry(var_key(key))
                .or_insert_with(|| FermiVariable::known(key.clone(), *value, "constant", 0.95));
        }

        debug!("Scan for '{}' found {} known values", question, known.len());
        known
    }

    async fn generate_models(
        &self,
        question: &str,
        context: &Context,
        known: &BTreeMap<String, FermiVariable>,
        state: &mut RunState,
    ) -> Vec<FermiModel> {
        let prompt = PromptBuilder::new(question, context)
            .with_known(known.values())
            .decomposition(
                self.config.min_models,
                self.config.max_models,
                self.config.recommended_max_variables,
            );
        let Ok(response) = self
            .client
            .complete(
                CallKind::Decomposition,
                prompt,
                Some(MODELS_SCHEMA),
                &mut state.ledger,
            )
            .await
        else {
            return Vec::new();
        };

        let specs = match parse_models(&response) {
            Ok(specs) => specs,
            Err(e) => {
                state.ledger.parse_failures += 1;
                warn!("Stage 3: unusable models for '{}': {}", question, e);
                return Vec::new();
            }
        };

        specs
            .into_iter()
            .take(self.config.max_models)
            .map(|parsed| {
                let mut model = FermiModel::new(parsed.id, parsed.formula);
                model.description = parsed.description;
                for variable_spec in parsed.variables {
                    let mut variable = match known.get(&var_key(&variable_spec.name)) {
                        Some(found) => FermiVariable {
                            name: variable_spec.name.clone(),
                            ..found.clone()
                        },
                        None => FermiVariable::unknown(variable_spec.name.clone()),
                    }
                    .with_description(variable_spec.description);
                    if let Some(concept) = variable_spec.concept {
                        variable = variable.with_concept(concept);
                    }
                    model = model.with_variable(variable);
                }
                model
            })
            .collect()
    }

    fn apply_policy(&self, models: Vec<FermiModel>) -> Vec<FermiModel> {
        models
            .into_iter()
            .filter(|model| {
                let count = model.total_variables();
                match variable_policy(count, &self.config) {
                    PolicyVerdict::Accepted => true,
                    PolicyVerdict::Flagged => {
                        warn!(
                            "Model {} uses {} variables (recommended at most {})",
                            model.id, count, self.config.recommended_max_variables
                        );
                        true
                    }
                    PolicyVerdict::Rejected => {
                        warn!(
                            "Model {} discarded: {} variables, allowed 1 to {}",
                            model.id, count, self.config.absolute_max_variables
                        );
                        false
                    }
                }
            })
            .collect()
    }

    async fn refine(&self, models: &mut [FermiModel], context: &Context, state: &mut RunState) {
        for pass in 0..self.config.refine_iterations {
            let unknown = unknown_names(models);
            if unknown.is_empty() {
                break;
            }
            let mut found = 0;
            for name in unknown {
                let query = context.sub_question(&name);
                let hits = self
                    .search
                    .search(&query, self.retrieval.top_k, None, &mut state.ledger)
                    .await;
                let best = hits.into_iter().find_map(|hit| {
                    let value = hit.document.representative_value()?;
                    (hit.score >= self.retrieval.benchmark_threshold).then_some((hit, value))
                });
                if let Some((hit, value)) = best {
                    let confidence = hit.document.confidence.unwrap_or(self.classifier.medium);
                    let variable = FermiVariable::known(
                        name.clone(),
                        value,
                        format!("retrieval:{}", hit.document.id),
                        confidence,
                    );
                    fill_named(models, &name, &variable);
                    found += 1;
                }
            }
            debug!("Refinement pass {} resolved {} variables", pass + 1, found);
            if found == 0 {
                break;
            }
        }
    }

    async fn fill_unknowns(
        &self,
        models: &mut [FermiModel],
        context: &Context,
        frame: &Frame,
        known: &BTreeMap<String, FermiVariable>,
        state: &mut RunState,
        sub: &dyn SubEstimator,
    ) {
        // Spend the budget on the most promising models first
        models.sort_by(|a, b| {
            score_model(b, frame.depth, &self.weights)
                .total
                .total_cmp(&score_model(a, frame.depth, &self.weights).total)
        });

        let mut local = known.clone();
        for name in unknown_names(models) {
            let key = var_key(&name);
            if let Some(resolved) = state.resolved.get(&key).cloned() {
                fill_named(models, &name, &resolved);
                continue;
            }

            let sub_question = context.sub_question(&name);
            if frame.contains(&sub_question) {
                state.ledger.cycles += 1;
                warn!(
                    "Cycle: '{}' is already being estimated on this branch",
                    sub_question
                );
                continue;
            }
            if !state.try_consume_variable() {
                state.ledger.budget_exhausted += 1;
                warn!("Variable budget exhausted; '{}' left unresolved", name);
                break;
            }

            debug!(
                "Estimating '{}' at depth {} ({} estimates left)",
                sub_question,
                frame.depth + 1,
                state.remaining_variables()
            );
            let child = frame.descend(&name, &sub_question, &local);
            let Some(result) = sub
                .estimate_variable(sub_question, context, child, state)
                .await
            else {
                continue;
            };
            let Some(value) = result.value() else {
                continue;
            };

            let mut variable = FermiVariable::known(
                name.clone(),
                value,
                result.source().as_str(),
                result.confidence,
            );
            variable.estimation_result = Some(Box::new(result));
            fill_named(models, &name, &variable);
            local.insert(key.clone(), variable.clone());
            state.resolved.insert(key, variable);
        }
    }

    async fn review(
        &self,
        question: &str,
        context: &Context,
        value: f64,
        model: &FermiModel,
        check: &mut BoundaryCheck,
        state: &mut RunState,
    ) {
        let prompt = PromptBuilder::new(question, context).plausibility(value, &model.formula);
        let Ok(response) = self
            .client
            .complete(
                CallKind::Decomposition,
                prompt,
                Some(REVIEW_SCHEMA),
                &mut state.ledger,
            )
            .await
        else {
            return;
        };
        match parse_review(&response) {
            Some((hard, soft)) => {
                check.merge_review(hard, soft, self.validator.config().soft_penalty)
            }
            None => debug!("Review of '{}' not parseable; treating as passed", question),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_result(
        &self,
        question: &str,
        model: &FermiModel,
        score: ModelScore,
        evaluation: Evaluation,
        check: &BoundaryCheck,
        depth: usize,
        rank: usize,
        candidates: usize,
    ) -> EstimationResult {
        let variable_confidence = geometric_mean(&model.filled_confidences()).unwrap_or(0.0);
        let confidence = (variable_confidence * check.confidence_factor).clamp(0.0, 1.0);

        let mut detail = ReasoningDetail::method("fermi_decomposition");
        detail.scores.insert("feasibility".to_string(), score.total);
        detail.scores.insert("filled_ratio".to_string(), score.filled_ratio);
        detail.scores.insert("variable_confidence".to_string(), variable_confidence);
        detail.scores.insert("simplicity".to_string(), score.simplicity);
        detail.scores.insert("shallowness".to_string(), score.shallowness);
        detail.scores.insert("boundary_factor".to_string(), check.confidence_factor);
        detail.variables = model
            .variables
            .values()
            .map(|v| VariableProvenance {
                name: v.name.clone(),
                value: v.value,
                source: v.source.clone().unwrap_or_default(),
                confidence: v.confidence,
            })
            .collect();
        if evaluation.used_fallback {
            detail.notes.push(format!(
                "formula `{}` not fully evaluable; used the product of its variables",
                model.formula
            ));
        }
        detail
            .notes
            .extend(check.soft_warnings.iter().map(|w| w.message.clone()));

        let bindings = model.bindings();
        let trace = DecompositionTrace {
            model_id: model.id.clone(),
            formula: model.formula.clone(),
            variables: bindings.clone(),
            depth,
            score: score.total,
            selection_reasoning: format!(
                "ranked {} of {} candidates (score {:.3})",
                rank + 1,
                candidates,
                score.total
            ),
        };
        let substituted = bindings
            .iter()
            .map(|(name, value)| format!("{} = {}", name, value))
            .collect::<Vec<_>>()
            .join(", ");

        EstimationResult::success(
            question,
            evaluation.value,
            Source::Fermi,
            self.classifier.classify(confidence),
            confidence,
        )
        .with_reasoning(format!(
            "{} = {} with {}",
            model.formula, evaluation.value, substituted
        ))
        .with_detail(detail)
        .with_decomposition(trace)
    }
}
