use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Narrative returned by a memory lookup when the domain is unknown.
pub const NO_HISTORY: &str = "No common failures found.";

/// Domain used when the plan metadata does not name one.
pub const DEFAULT_DOMAIN: &str = "general";

/// Unique pipeline run identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Risk attached to a single step. All components lie in [0, 1].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    #[serde(default)]
    pub intrinsic: f64,
    #[serde(default)]
    pub external: f64,
    #[serde(default)]
    pub historical: f64,
    #[serde(default)]
    pub total: f64,
    /// Human-readable strings explaining the score.
    #[serde(default)]
    pub factors: Vec<String>,
}

impl Risk {
    /// The component contributing most to the total.
    /// Ties resolve intrinsic, then external, then historical.
    pub fn dominant_driver(&self) -> RiskDriver {
        let mut driver = RiskDriver::Intrinsic;
        let mut best = self.intrinsic;
        if self.external > best {
            driver = RiskDriver::External;
            best = self.external;
        }
        if self.historical > best {
            driver = RiskDriver::Historical;
        }
        driver
    }
}

/// Which risk component dominates a step's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskDriver {
    Intrinsic,
    External,
    Historical,
}

impl std::fmt::Display for RiskDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Intrinsic => "intrinsic complexity",
            Self::External => "external signals",
            Self::Historical => "domain history",
        };
        f.write_str(s)
    }
}

/// An atomic unit of work in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub text: String,
    /// Ids of steps that must complete before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Estimated duration in hours.
    #[serde(default)]
    pub estimated_time_hours: Option<f64>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub risk: Risk,
}

impl Step {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            dependencies: vec![],
            estimated_time_hours: None,
            resources: vec![],
            risk: Risk::default(),
        }
    }

    /// Add a dependency on another step.
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// Set the duration estimate in hours.
    pub fn with_hours(mut self, hours: f64) -> Self {
        self.estimated_time_hours = Some(hours);
        self
    }

    /// Duration used for path-length purposes (missing counts as zero).
    pub fn duration(&self) -> f64 {
        self.estimated_time_hours.unwrap_or(0.0)
    }
}

/// A directed edge: `from` must precede `to` (dependency → dependent).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Dependency graph among steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// Node ids, in step declaration order.
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// The top-level artifact threaded through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub graph: Graph,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Plan {
    pub fn new(goal: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            goal: goal.into(),
            steps,
            graph: Graph::default(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Read the domain from metadata, falling back to `default` when absent
    /// or blank.
    pub fn domain<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.metadata
            .get(key)
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .unwrap_or(default)
    }
}

/// Critical path and parallel partition of a validated graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleResult {
    /// Step ids on the longest duration-weighted path, source first.
    pub critical_path: Vec<String>,
    /// Sum of durations along the critical path, in hours.
    pub critical_path_hours: f64,
    /// Topological levels; each group sorted by id.
    pub parallel_groups: Vec<Vec<String>>,
    /// The topological order used for the analysis.
    pub topological_order: Vec<String>,
}

impl ScheduleResult {
    pub fn is_critical(&self, id: &str) -> bool {
        self.critical_path.iter().any(|s| s == id)
    }
}

/// A step in the report's top-risk ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedStep {
    pub step_id: String,
    pub total: f64,
    pub driver: RiskDriver,
    pub on_critical_path: bool,
}

/// Final output of the forecaster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    /// Per-step risk, keyed by step id.
    pub risks: BTreeMap<String, Risk>,
    /// Weighted plan-level failure probability in [0, 1].
    pub failure_probability: f64,
    pub domain: String,
    pub historical_narrative: String,
    pub top_risks: Vec<RankedStep>,
    /// Distinct external risk factors across all steps.
    pub external_risks: Vec<String>,
    /// Steps whose external lookup timed out or failed.
    pub degraded_steps: Vec<String>,
    pub summary: String,
}

impl ForecastReport {
    /// Whether the forecast was computed with incomplete external data.
    pub fn is_partial(&self) -> bool {
        !self.degraded_steps.is_empty()
    }
}
