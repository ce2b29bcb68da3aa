use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;

use plancast_core::error::{PlancastError, Result};
use plancast_core::traits::{ExternalRiskSource, SignalRequest};

/// Returns canned factors per step id.
#[derive(Debug, Default)]
pub struct StaticFactors {
    by_step: HashMap<String, Vec<String>>,
    calls: AtomicUsize,
}

impl StaticFactors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, step_id: &str, factors: Vec<String>) -> Self {
        self.by_step.insert(step_id.to_string(), factors);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExternalRiskSource for StaticFactors {
    fn name(&self) -> &str {
        "static"
    }

    fn risk_factors<'a>(&'a self, request: SignalRequest<'a>) -> BoxFuture<'a, Result<Vec<String>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let factors = self
            .by_step
            .get(&request.step.id)
            .cloned()
            .unwrap_or_default();
        Box::pin(async move { Ok(factors) })
    }
}

/// Sleeps before answering; pair with a short lookup timeout.
#[derive(Debug)]
pub struct SlowSource {
    delay: Duration,
    factors: Vec<String>,
}

impl SlowSource {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            factors: vec!["late vendor delay".to_string()],
        }
    }
}

impl ExternalRiskSource for SlowSource {
    fn name(&self) -> &str {
        "slow"
    }

    fn risk_factors<'a>(&'a self, _request: SignalRequest<'a>) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(self.factors.clone())
        })
    }
}

/// Always fails as unavailable and counts calls.
#[derive(Debug)]
pub struct FailingSource {
    message: String,
    calls: AtomicUsize,
}

impl FailingSource {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExternalRiskSource for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    fn risk_factors<'a>(&'a self, _request: SignalRequest<'a>) -> BoxFuture<'a, Result<Vec<String>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let err = PlancastError::ExternalLookupUnavailable {
            source_name: "failing".into(),
            message: self.message.clone(),
        };
        Box::pin(async move { Err(err) })
    }
}
