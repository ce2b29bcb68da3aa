use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// What an external risk source is asked about a single step.
#[derive(Debug, Clone, Copy)]
pub struct SignalRequest<'a> {
    pub step: &'a Step,
    /// The whole dependency graph, for sources that want context.
    pub graph: &'a Graph,
    /// Maximum number of factors the source should return.
    pub max_factors: usize,
}

/// Surfaces free-text risk factors for a step.
///
/// Implementations may search the web, apply static rules, or replay manual
/// annotations. The engine only inspects the returned strings for keywords.
pub trait ExternalRiskSource: Send + Sync + 'static {
    /// Source name (used in logs and error messages).
    fn name(&self) -> &str;

    /// Return an ordered, possibly empty, list of risk factors.
    fn risk_factors<'a>(&'a self, request: SignalRequest<'a>) -> BoxFuture<'a, Result<Vec<String>>>;

    /// Independent sources this one combines. The pipeline queries members
    /// one by one, each under its own timeout, so a failing member is
    /// reported as degraded data instead of being hidden. Empty for a source
    /// that answers by itself.
    fn members(&self) -> Vec<Arc<dyn ExternalRiskSource>> {
        Vec::new()
    }
}

/// Historical failure memory, keyed by domain (case-insensitive).
pub trait MemoryLookup: Send + Sync + 'static {
    /// Narrative of common failures for the domain, or [`NO_HISTORY`].
    fn query(&self, domain: &str) -> String;

    /// Add or replace the narrative for a domain.
    fn upsert(&self, domain: &str, narrative: &str) -> Result<()>;

    /// Forget a domain. Returns whether it was known.
    fn remove(&self, domain: &str) -> Result<bool>;

    /// All known (domain, narrative) pairs, sorted by domain.
    fn entries(&self) -> Vec<(String, String)>;
}

/// Turns raw plan text into an unvalidated plan.
pub trait PlanIngestor: Send + Sync + 'static {
    fn ingest(&self, text: &str) -> Result<Plan>;
}

/// Whether a narrative carries actual history.
pub fn has_history(narrative: &str) -> bool {
    narrative != NO_HISTORY
}
