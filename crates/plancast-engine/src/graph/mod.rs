//! Dependency graph construction and schedule analysis.
//!
//! Edges point from a dependency to its dependent. Every algorithm here walks
//! identifiers in ascending order so results do not depend on the order in
//! which steps were declared.

pub mod builder;
pub mod schedule;

pub use builder::{build_graph, BuiltGraph};
pub use schedule::analyze_schedule;
