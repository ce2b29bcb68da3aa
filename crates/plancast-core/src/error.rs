use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlancastError {
    // Structural errors (fatal to a run)
    #[error("Duplicate step id: {0}")]
    DuplicateStepId(String),

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Step '{step}' has invalid duration estimate: {value}")]
    InvalidDuration { step: String, value: f64 },

    #[error("Graph invariant violated: {0}")]
    GraphInvariant(String),

    // External collaborator errors (recovered locally)
    #[error("External lookup timed out after {timeout_ms}ms: {step}")]
    ExternalLookupTimeout { step: String, timeout_ms: u64 },

    #[error("External lookup unavailable: {source_name}: {message}")]
    ExternalLookupUnavailable { source_name: String, message: String },

    // Ingestion errors
    #[error("Plan ingestion failed: {0}")]
    Ingest(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Pipeline run cancelled")]
    Cancelled,

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlancastError {
    /// Whether this error comes from plan structure (bad ids, cycles) rather
    /// than from the environment.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DuplicateStepId(_)
                | Self::UnknownDependency { .. }
                | Self::CyclicDependency { .. }
                | Self::InvalidDuration { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PlancastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_display_joins_ids() {
        let err = PlancastError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "c".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cyclic dependency: a -> b -> c -> a");
        assert!(err.is_structural());
    }

    #[test]
    fn lookup_errors_are_not_structural() {
        let err = PlancastError::ExternalLookupTimeout {
            step: "s1".into(),
            timeout_ms: 50,
        };
        assert!(!err.is_structural());
        assert!(err.to_string().contains("50ms"));
    }
}
