//! Fakes and fixtures shared by Plancast tests.

mod fixtures;
mod sources;

pub use fixtures::*;
pub use sources::{FailingSource, SlowSource, StaticFactors};
