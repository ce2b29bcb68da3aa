use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use plancast_core::config::AppConfig;
use plancast_core::error::{PlancastError, Result};
use plancast_core::traits::{ExternalRiskSource, MemoryLookup, PlanIngestor, SignalRequest};
use plancast_core::types::{ForecastReport, Graph, Plan, RunId, ScheduleResult};

use crate::annotate::{annotate, StepSignals};
use crate::forecast::Forecaster;
use crate::graph::{analyze_schedule, build_graph};
use crate::ingest::StructuredIngestor;

/// Everything one pipeline run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub run_id: RunId,
    /// The plan with validated dependencies and final per-step risk.
    pub plan: Plan,
    pub graph: Graph,
    pub schedule: ScheduleResult,
    pub report: ForecastReport,
}

/// Ingest, build, schedule, annotate and forecast a plan.
///
/// Structural errors abort the run before any external lookup is made.
/// Lookup failures and timeouts only mark the step as degraded. Composite
/// sources are expanded into their members so each member gets its own
/// timeout.
pub struct Pipeline {
    config: Arc<AppConfig>,
    ingestor: Arc<dyn PlanIngestor>,
    sources: Vec<Arc<dyn ExternalRiskSource>>,
    memory: Arc<dyn MemoryLookup>,
}

impl Pipeline {
    pub fn new(
        config: AppConfig,
        source: Arc<dyn ExternalRiskSource>,
        memory: Arc<dyn MemoryLookup>,
    ) -> Self {
        let ingestor = Arc::new(StructuredIngestor::new(config.forecast.domain_key.clone()));
        Self {
            config: Arc::new(config),
            ingestor,
            sources: leaf_sources(source),
            memory,
        }
    }

    /// Replace the default TOML/JSON ingestor.
    pub fn with_ingestor(mut self, ingestor: Arc<dyn PlanIngestor>) -> Self {
        self.ingestor = ingestor;
        self
    }

    pub async fn run(&self, text: &str) -> Result<PipelineOutput> {
        self.run_with_cancel(text, CancellationToken::new()).await
    }

    /// Run the full pipeline; cancelling the token discards the plan and
    /// returns `Cancelled`.
    pub async fn run_with_cancel(
        &self,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<PipelineOutput> {
        let plan = self.ingestor.ingest(text)?;
        self.analyze_plan(plan, cancel).await
    }

    /// Run everything after ingestion on an already-parsed plan.
    pub async fn analyze_plan(
        &self,
        plan: Plan,
        cancel: CancellationToken,
    ) -> Result<PipelineOutput> {
        let run_id = RunId::new();
        let span = info_span!("pipeline", run_id = %run_id);
        self.analyze_inner(plan, cancel, run_id).instrument(span).await
    }

    async fn analyze_inner(
        &self,
        mut plan: Plan,
        cancel: CancellationToken,
        run_id: RunId,
    ) -> Result<PipelineOutput> {
        let start = Instant::now();
        info!(goal = %plan.goal, steps = plan.steps.len(), "Analyzing plan");

        let built = build_graph(&plan.steps)?;
        plan.steps = built.steps;
        plan.graph = built.graph;
        let schedule = analyze_schedule(&plan.graph, &plan.steps)?;
        info!(
            critical_path = ?schedule.critical_path,
            groups = schedule.parallel_groups.len(),
            "Schedule ready"
        );

        if cancel.is_cancelled() {
            return Err(PlancastError::Cancelled);
        }

        let signals = tokio::select! {
            signals = self.collect_signals(&plan) => signals,
            _ = cancel.cancelled() => {
                info!("Run cancelled during external lookups");
                return Err(PlancastError::Cancelled);
            }
        };

        let annotation = annotate(plan, signals);
        let forecast = Forecaster::from_config(&self.config).forecast(
            annotation,
            &schedule,
            self.memory.as_ref(),
        );

        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            failure_probability = forecast.report.failure_probability,
            "Run complete"
        );
        Ok(PipelineOutput {
            run_id,
            graph: forecast.plan.graph.clone(),
            plan: forecast.plan,
            schedule,
            report: forecast.report,
        })
    }

    /// One lookup per step, at most `max_concurrent` steps in flight, results
    /// in plan order.
    async fn collect_signals(&self, plan: &Plan) -> Vec<StepSignals> {
        let settings = &self.config.signals;
        let timeout = Duration::from_millis(settings.timeout_ms);
        let sources = self.sources.as_slice();

        let lookups = plan.steps.iter().map(|step| {
            let request = SignalRequest {
                step,
                graph: &plan.graph,
                max_factors: settings.max_factors,
            };
            lookup(sources, request, timeout)
        });

        futures::stream::iter(lookups)
            .buffered(settings.max_concurrent.max(1))
            .collect()
            .await
    }
}

/// Expand composite sources into the sources that actually answer, in order.
fn leaf_sources(source: Arc<dyn ExternalRiskSource>) -> Vec<Arc<dyn ExternalRiskSource>> {
    let members = source.members();
    if members.is_empty() {
        vec![source]
    } else {
        members.into_iter().flat_map(leaf_sources).collect()
    }
}

/// Ask every source about one step. Factors from sources that answered are
/// kept even when others fail or time out; any failure marks the step
/// degraded.
async fn lookup(
    sources: &[Arc<dyn ExternalRiskSource>],
    request: SignalRequest<'_>,
    timeout: Duration,
) -> StepSignals {
    let step_id = request.step.id.clone();
    let started = Instant::now();
    let outcomes = join_all(
        sources
            .iter()
            .map(|source| query(source.as_ref(), request, timeout)),
    )
    .await;

    let mut factors: Vec<String> = Vec::new();
    let mut failures = Vec::new();
    for (source, outcome) in sources.iter().zip(outcomes) {
        match outcome {
            Ok(found) => {
                for f in found {
                    if !factors.contains(&f) {
                        factors.push(f);
                    }
                }
            }
            Err(e) => {
                warn!(step_id = %step_id, source = source.name(), error = %e, "Risk lookup degraded");
                failures.push(format!("{}: {}", source.name(), e));
            }
        }
    }
    factors.truncate(request.max_factors);

    debug!(
        step_id = %step_id,
        factors = factors.len(),
        failed = failures.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Risk lookup done"
    );
    if failures.is_empty() {
        StepSignals::found(step_id, factors)
    } else {
        StepSignals::partial(step_id, factors, failures.join("; "))
    }
}

async fn query(
    source: &dyn ExternalRiskSource,
    request: SignalRequest<'_>,
    timeout: Duration,
) -> Result<Vec<String>> {
    match tokio::time::timeout(timeout, source.risk_factors(request)).await {
        Ok(result) => result.map(|mut factors| {
            factors.truncate(request.max_factors);
            factors
        }),
        Err(_) => Err(PlancastError::ExternalLookupTimeout {
            step: request.step.id.clone(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
