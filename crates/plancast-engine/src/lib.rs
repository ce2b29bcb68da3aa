//! Plancast engine: turns a step list into a risk-annotated execution graph
//! and a failure forecast.
//!
//! Stages run strictly in order, each taking the previous stage's value and
//! returning a new one:
//!
//! 1. [`graph::build_graph`] validates ids and dependencies and rejects cycles.
//! 2. [`graph::analyze_schedule`] computes the critical path and parallel groups.
//! 3. [`annotate::annotate`] attaches external risk factors to steps.
//! 4. [`forecast::Forecaster`] scores every step and aggregates the plan.
//!
//! [`Pipeline`] wires the stages to the ingestion, risk-source and memory
//! collaborators.

pub mod annotate;
pub mod forecast;
pub mod graph;
pub mod ingest;
pub mod pipeline;
pub mod scorer;

pub use annotate::{annotate, Annotation, StepSignals};
pub use forecast::{Forecast, Forecaster};
pub use graph::{analyze_schedule, build_graph, BuiltGraph};
pub use ingest::StructuredIngestor;
pub use pipeline::{Pipeline, PipelineOutput};
pub use scorer::{round2, score, RiskScorer, ScoreBreakdown};
