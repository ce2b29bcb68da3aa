//! Historical failure memory keyed by domain.
//!
//! Both stores implement [`MemoryLookup`](plancast_core::traits::MemoryLookup),
//! match domains case-insensitively and start from the same seed narratives.

pub mod bank;
pub mod store;

pub use bank::MemoryBank;
pub use store::SqliteMemory;

/// Built-in domain narratives every store starts with.
pub const SEED_DOMAINS: &[(&str, &str)] = &[
    ("software", "Scope creep; conflicting requirements."),
    ("marketing", "Budget exhaustion before optimization."),
    ("renovation", "Permit delays; material shortages."),
];

/// Canonical form of a domain key.
pub(crate) fn normalize(domain: &str) -> String {
    domain.trim().to_lowercase()
}
