//! The estimation ladder
//!
//! Every question, top-level or sub-variable, runs through the same four
//! stages: evidence, prior, decomposition, fusion. Sub-variables re-enter
//! the ladder through [`SubEstimator`] with a cheaper fallback chain.

use crate::analyzer::GuardrailAnalyzer;
use crate::budget::{Frame, RunState};
use crate::client::{ModelClient, SearchClient};
use crate::config::EstimatorConfig;
use crate::decomposer::{BoxFuture, FermiDecomposer, SubEstimator};
use crate::error::EstimatorError;
use crate::evidence::EvidenceCollector;
use crate::fusion::FusionEngine;
use crate::learning::{should_learn, to_rule};
use crate::metrics::EstimatorMetrics;
use crate::prior::PriorEstimator;
use fermi_domain::traits::{LearnedRuleStore, LlmProvider, ScoredDocument, SearchBackend};
use fermi_domain::{Certainty, ConceptKind, Context, Cost, EstimationResult, Guardrail, RequestId};
use fermi_guardrail::{BoundaryValidator, GuardrailCollector};
use fermi_store::NullRuleStore;
use std::fmt::Display;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Which fallback chain a pipeline run follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// The caller's question
    TopLevel,
    /// A sub-variable of some decomposition
    Variable,
}

/// Fermi estimator over a model provider, a retrieval backend and a
/// learned-rule store
pub struct Estimator<L, S, R = NullRuleStore>
where
    L: LlmProvider,
    S: SearchBackend,
    R: LearnedRuleStore,
{
    llm: Arc<L>,
    backend: Arc<S>,
    search: Arc<SearchClient<S, R>>,
    evidence: EvidenceCollector<S, R>,
    analyzer: GuardrailAnalyzer<L>,
    prior: PriorEstimator<L>,
    decomposer: FermiDecomposer<L, S, R>,
    fusion: FusionEngine,
    config: EstimatorConfig,
    metrics: Mutex<EstimatorMetrics>,
}

impl<L, S> Estimator<L, S, NullRuleStore>
where
    L: LlmProvider + Send + Sync + 'static,
    L::Error: Display,
    S: SearchBackend + Send + Sync + 'static,
    S::Error: Display,
{
    /// Create an estimator without a learned-rule store
    pub fn new(
        llm_provider: L,
        search: S,
        config: EstimatorConfig,
    ) -> Result<Self, EstimatorError> {
        config.validate().map_err(EstimatorError::Config)?;
        Ok(Self::assemble(
            Arc::new(llm_provider),
            Arc::new(search),
            Arc::new(NullRuleStore),
            config,
        ))
    }
}

impl<L, S, R> Estimator<L, S, R>
where
    L: LlmProvider + Send + Sync + 'static,
    L::Error: Display,
    S: SearchBackend + Send + Sync + 'static,
    S::Error: Display,
    R: LearnedRuleStore + Send + Sync + 'static,
    R::Error: Display,
{
    fn assemble(llm: Arc<L>, backend: Arc<S>, rules: Arc<R>, config: EstimatorConfig) -> Self {
        let classifier = config.certainty.classifier();
        let client = Arc::new(ModelClient::new(Arc::clone(&llm), config.timeouts.clone()));
        let search = Arc::new(SearchClient::new(
            Arc::clone(&backend),
            rules,
            config.timeouts.search(),
        ));

        Self {
            evidence: EvidenceCollector::new(
                Arc::clone(&search),
                config.retrieval.clone(),
                classifier,
            ),
            analyzer: GuardrailAnalyzer::new(
                Arc::clone(&client),
                config.retrieval.max_related_facts,
            ),
            prior: PriorEstimator::new(Arc::clone(&client), classifier),
            decomposer: FermiDecomposer::new(
                client,
                Arc::clone(&search),
                BoundaryValidator::new(config.boundary.clone()),
                config.fermi.clone(),
                config.scoring.clone(),
                config.retrieval.clone(),
                classifier,
            ),
            fusion: FusionEngine::new(classifier, config.fusion.clone()),
            llm,
            backend,
            search,
            config,
            metrics: Mutex::new(EstimatorMetrics::new()),
        }
    }

    /// Replace the learned-rule store
    ///
    /// Metrics start over.
    pub fn with_rule_store<R2>(self, rules: R2) -> Estimator<L, S, R2>
    where
        R2: LearnedRuleStore + Send + Sync + 'static,
        R2::Error: Display,
    {
        Estimator::<L, S, R2>::assemble(self.llm, self.backend, Arc::new(rules), self.config)
    }

    /// Configuration in use
    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Snapshot of the accumulated metrics
    pub fn metrics(&self) -> EstimatorMetrics {
        self.metrics
            .lock()
            .map(|metrics| metrics.clone())
            .unwrap_or_default()
    }

    /// Estimate a quantity
    ///
    /// Not being able to estimate is a normal outcome, reported as a
    /// result with `Source::Failure`. Errors are reserved for malformed
    /// input.
    pub async fn estimate(
        &self,
        question: &str,
        context: &Context,
    ) -> Result<EstimationResult, EstimatorError> {
        self.estimate_with_guardrails(question, context, Vec::new())
            .await
    }

    /// Estimate a quantity under caller-known guardrails
    ///
    /// Malformed guardrails are ignored.
    pub async fn estimate_with_guardrails(
        &self,
        question: &str,
        context: &Context,
        guardrails: Vec<Guardrail>,
    ) -> Result<EstimationResult, EstimatorError> {
        context.validate().map_err(EstimatorError::InvalidInput)?;

        let started = Instant::now();
        let mut state = RunState::new(RequestId::new(), self.config.fermi.max_variable_estimates);
        info!("Estimating '{}' (request {})", question, state.request_id);

        let mut result = if question.trim().is_empty() {
            EstimationResult::failure(question, "empty question")
        } else {
            let mut collector = GuardrailCollector::seeded(guardrails);
            self.run_attempts(question, context, &mut collector, &mut state)
                .await
        };

        let elapsed = started.elapsed();
        result.request_id = Some(state.request_id);
        result.cost = Cost {
            llm_calls: state.ledger.llm_calls,
            search_calls: state.ledger.search_calls,
            variable_estimates: state.ledger.variable_estimates,
            elapsed,
        };

        let learned = self.learn(question, context, &result).await;
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.record_run(result.source(), &state.ledger, elapsed);
            if learned {
                metrics.record_learned();
            }
        }

        match result.value() {
            Some(value) => info!(
                "'{}' = {} via {} ({}, confidence {:.3}, {} model calls)",
                question,
                value,
                result.source(),
                result.certainty,
                result.confidence,
                result.cost.llm_calls
            ),
            None => warn!(
                "'{}' could not be estimated: {}",
                question,
                result.error().unwrap_or_default()
            ),
        }
        Ok(result)
    }

    /// Run the ladder under successively relaxed acceptance thresholds
    ///
    /// The best result seen is kept; a later attempt only runs when that
    /// result misses the current threshold.
    async fn run_attempts(
        &self,
        question: &str,
        context: &Context,
        collector: &mut GuardrailCollector,
        state: &mut RunState,
    ) -> EstimationResult {
        let mut best: Option<EstimationResult> = None;
        for (attempt, threshold) in self.config.attempts.thresholds.iter().enumerate() {
            if best.as_ref().is_some_and(|b| b.confidence >= *threshold) {
                break;
            }

            let outcome = self
                .run_pipeline(
                    question.to_string(),
                    context,
                    Frame::root(question),
                    collector,
                    state,
                    Mode::TopLevel,
                )
                .await;
            let Some(result) = outcome else {
                debug!("Attempt {} for '{}' produced nothing", attempt + 1, question);
                continue;
            };

            debug!(
                "Attempt {} for '{}': {} via {} (confidence {:.3}, threshold {:.2})",
                attempt + 1,
                question,
                result.value().unwrap_or_default(),
                result.source(),
                result.confidence,
                threshold
            );
            let accepted = result.confidence >= *threshold;
            if best.as_ref().is_none_or(|b| result.confidence > b.confidence) {
                best = Some(result);
            }
            if accepted {
                break;
            }
        }

        best.unwrap_or_else(|| {
            let ledger = &state.ledger;
            EstimationResult::failure(
                question,
                format!(
                    "no stage produced an estimate ({} model calls, {} timeouts, {} unparseable replies, {} cycles, {} rejected models)",
                    ledger.llm_calls,
                    ledger.timeouts,
                    ledger.parse_failures,
                    ledger.cycles,
                    ledger.boundary_rejections
                ),
            )
        })
    }

    /// One pass of the ladder for one question
    fn run_pipeline<'a>(
        &'a self,
        question: String,
        context: &'a Context,
        frame: Frame,
        collector: &'a mut GuardrailCollector,
        state: &'a mut RunState,
        mode: Mode,
    ) -> BoxFuture<'a, Option<EstimationResult>> {
        Box::pin(async move {
            // Stage 1: evidence
            let evidence = self
                .evidence
                .collect(&question, frame.variable.as_deref(), context, &mut state.ledger)
                .await;
            if let Some(definite) = evidence.definite {
                return Some(definite);
            }

            for guardrail in evidence.soft_guardrails {
                if let Err(e) = collector.add(guardrail) {
                    debug!("Skipping guardrail: {}", e);
                }
            }
            let fresh: Vec<ScoredDocument> = evidence
                .related
                .into_iter()
                .filter(|fact| state.mark_analyzed(&question, &fact.document.id))
                .collect();
            for guardrail in self
                .analyzer
                .analyze_batch(&question, &fresh, &mut state.ledger)
                .await
            {
                if let Err(e) = collector.add(guardrail) {
                    debug!("Skipping guardrail: {}", e);
                }
            }
            let mut statistics = evidence.statistics.into_iter();
            let mut outputs: Vec<EstimationResult> = evidence.partial.into_iter().collect();

            // Stage 2: prior
            if let Some(prior) = self
                .prior
                .estimate(&question, context, collector, &mut state.ledger)
                .await
            {
                let decisive = prior.certainty == Certainty::High
                    && !ConceptKind::infer(&question).is_structural();
                outputs.push(prior);
                if decisive {
                    info!("Stage 2: high-certainty prior accepted for '{}'", question);
                    return self.fusion.fuse(&question, outputs, collector);
                }
            }

            // Sub-variables take the cheapest value available
            if mode == Mode::Variable {
                if !outputs.is_empty() {
                    return self.fusion.fuse(&question, outputs, collector);
                }
                if let Some(statistic) = statistics.next() {
                    debug!("Using statistical evidence for '{}'", question);
                    return self.fusion.fuse(&question, vec![statistic], collector);
                }
                if let Some(quick) = self
                    .prior
                    .quick_number(&question, context, &mut state.ledger)
                    .await
                {
                    return self.fusion.fuse(&question, vec![quick], collector);
                }
            }

            // Stage 3: decomposition
            if frame.depth < self.config.fermi.max_depth {
                if let Some(decomposed) = self
                    .decomposer
                    .decompose(&question, context, &frame, collector, state, self)
                    .await
                {
                    outputs.push(decomposed);
                }
            } else {
                debug!("Depth limit reached for '{}'", question);
            }

            if outputs.is_empty() {
                outputs.extend(statistics.next());
            }

            // Stage 4: fusion
            self.fusion.fuse(&question, outputs, collector)
        })
    }

    /// Persist a confident result; true when a rule was written
    async fn learn(&self, question: &str, context: &Context, result: &EstimationResult) -> bool {
        if !should_learn(result, &self.config.learning) {
            return false;
        }
        let Some(rule) = to_rule(question, context, result) else {
            return false;
        };
        let key = rule.key.clone();
        match self.search.save_rule(rule).await {
            Ok(()) => {
                debug!("Learned rule {} for '{}'", key, question);
                true
            }
            Err(e) => {
                warn!("Failed to persist learned rule for '{}': {}", question, e);
                false
            }
        }
    }
}

impl<L, S, R> SubEstimator for Estimator<L, S, R>
where
    L: LlmProvider + Send + Sync + 'static,
    L::Error: Display,
    S: SearchBackend + Send + Sync + 'static,
    S::Error: Display,
    R: LearnedRuleStore + Send + Sync + 'static,
    R::Error: Display,
{
    fn estimate_variable<'a>(
        &'a self,
        question: String,
        context: &'a Context,
        frame: Frame,
        state: &'a mut RunState,
    ) -> BoxFuture<'a, Option<EstimationResult>> {
        Box::pin(async move {
            let mut collector = GuardrailCollector::new();
            self.run_pipeline(question, context, frame, &mut collector, state, Mode::Variable)
                .await
        })
    }
}
