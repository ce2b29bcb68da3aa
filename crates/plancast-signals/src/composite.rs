use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use tracing::warn;

use plancast_core::error::{PlancastError, Result};
use plancast_core::traits::{ExternalRiskSource, SignalRequest};

/// Queries several sources concurrently and concatenates their factors in
/// source order. A failing source is skipped; only when every source fails
/// does the lookup fail.
///
/// The pipeline does not call `risk_factors` on a composite: it expands
/// [`members`](ExternalRiskSource::members) and tracks each one separately.
pub struct CompositeRiskSource {
    sources: Vec<Arc<dyn ExternalRiskSource>>,
}

impl CompositeRiskSource {
    pub fn new(sources: Vec<Arc<dyn ExternalRiskSource>>) -> Self {
        Self { sources }
    }
}

impl ExternalRiskSource for CompositeRiskSource {
    fn name(&self) -> &str {
        "composite"
    }

    fn risk_factors<'a>(&'a self, request: SignalRequest<'a>) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let results = join_all(self.sources.iter().map(|s| s.risk_factors(request))).await;

            let mut factors: Vec<String> = Vec::new();
            let mut failures = Vec::new();
            for (source, result) in self.sources.iter().zip(results) {
                match result {
                    Ok(found) => {
                        for f in found {
                            if !factors.contains(&f) {
                                factors.push(f);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(step_id = %request.step.id, source = source.name(), error = %e, "Risk source failed");
                        failures.push(format!("{}: {}", source.name(), e));
                    }
                }
            }

            if !self.sources.is_empty() && failures.len() == self.sources.len() {
                return Err(PlancastError::ExternalLookupUnavailable {
                    source_name: "composite".into(),
                    message: failures.join("; "),
                });
            }
            factors.truncate(request.max_factors);
            Ok(factors)
        })
    }

    fn members(&self) -> Vec<Arc<dyn ExternalRiskSource>> {
        self.sources.clone()
    }
}

/// Never reports any factor.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRiskSource;

impl ExternalRiskSource for NoopRiskSource {
    fn name(&self) -> &str {
        "noop"
    }

    fn risk_factors<'a>(&'a self, _request: SignalRequest<'a>) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plancast_core::types::{Graph, Step};
    use plancast_test_utils::{FailingSource, StaticFactors};

    async fn factors_for(source: &dyn ExternalRiskSource, step: &Step, max: usize) -> Result<Vec<String>> {
        let graph = Graph::default();
        source
            .risk_factors(SignalRequest {
                step,
                graph: &graph,
                max_factors: max,
            })
            .await
    }

    fn src<S: ExternalRiskSource>(source: S) -> Arc<dyn ExternalRiskSource> {
        Arc::new(source)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn concatenates_in_source_order() {
        let composite = CompositeRiskSource::new(vec![
            src(StaticFactors::new().with("s", strings(&["vendor delay", "legal approval"]))),
            src(StaticFactors::new().with("s", strings(&["legal approval", "weather"]))),
        ]);
        let step = Step::new("s", "x");
        assert_eq!(
            factors_for(&composite, &step, 5).await.unwrap(),
            strings(&["vendor delay", "legal approval", "weather"])
        );
        assert_eq!(
            factors_for(&composite, &step, 2).await.unwrap(),
            strings(&["vendor delay", "legal approval"])
        );
    }

    #[tokio::test]
    async fn tolerates_partial_failure() {
        let composite = CompositeRiskSource::new(vec![
            src(FailingSource::new("down")),
            src(StaticFactors::new().with("s", strings(&["permit delay"]))),
        ]);
        let step = Step::new("s", "x");
        assert_eq!(
            factors_for(&composite, &step, 5).await.unwrap(),
            strings(&["permit delay"])
        );
    }

    #[tokio::test]
    async fn all_failing_is_unavailable() {
        let composite = CompositeRiskSource::new(vec![
            src(FailingSource::new("one")),
            src(FailingSource::new("two")),
        ]);
        let err = factors_for(&composite, &Step::new("s", "x"), 5).await.unwrap_err();
        assert!(matches!(err, PlancastError::ExternalLookupUnavailable { .. }));
        assert!(err.to_string().contains("one"));
    }

    #[test]
    fn members_in_source_order() {
        let composite = CompositeRiskSource::new(vec![
            src(StaticFactors::new()),
            src(FailingSource::new("down")),
        ]);
        let names: Vec<_> = composite.members().iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, vec!["static", "failing"]);
        assert!(NoopRiskSource.members().is_empty());
    }

    #[tokio::test]
    async fn empty_composite_and_noop_report_nothing() {
        let step = Step::new("s", "x");
        let empty = CompositeRiskSource::new(vec![]);
        assert!(factors_for(&empty, &step, 5).await.unwrap().is_empty());
        assert!(factors_for(&NoopRiskSource, &step, 5).await.unwrap().is_empty());
    }
}
