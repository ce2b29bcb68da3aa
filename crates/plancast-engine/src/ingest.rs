use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use plancast_core::error::{PlancastError, Result};
use plancast_core::traits::PlanIngestor;
use plancast_core::types::{Plan, Step};

/// On-disk plan document. TOML or JSON, same shape.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanDocument {
    #[serde(default)]
    goal: String,
    /// Shorthand for `metadata.<domain_key>`.
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default)]
    steps: Vec<StepDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepDocument {
    id: String,
    text: String,
    #[serde(default, alias = "depends_on")]
    dependencies: Vec<String>,
    #[serde(default, alias = "hours")]
    estimated_time_hours: Option<f64>,
    #[serde(default)]
    resources: Vec<String>,
    /// Manually supplied external factors.
    #[serde(default)]
    risk_factors: Vec<String>,
}

/// Reads plans written as TOML or JSON documents.
///
/// Input whose first non-blank character is `{` is parsed as JSON; anything
/// else as TOML. Only the document shape is checked here. Ids, dependencies
/// and durations are validated by the graph builder.
#[derive(Debug, Clone)]
pub struct StructuredIngestor {
    domain_key: String,
}

impl Default for StructuredIngestor {
    fn default() -> Self {
        Self::new("domain")
    }
}

impl StructuredIngestor {
    /// `domain_key` is the metadata key the top-level `domain` field fills.
    pub fn new(domain_key: impl Into<String>) -> Self {
        Self {
            domain_key: domain_key.into(),
        }
    }

    fn parse(&self, text: &str) -> Result<PlanDocument> {
        if text.trim_start().starts_with('{') {
            serde_json::from_str(text).map_err(|e| PlancastError::Ingest(format!("invalid JSON plan: {e}")))
        } else {
            toml::from_str(text).map_err(|e| PlancastError::Ingest(format!("invalid TOML plan: {e}")))
        }
    }
}

impl PlanIngestor for StructuredIngestor {
    fn ingest(&self, text: &str) -> Result<Plan> {
        let doc = self.parse(text)?;

        let mut steps = Vec::with_capacity(doc.steps.len());
        for (index, s) in doc.steps.into_iter().enumerate() {
            let id = s.id.trim().to_string();
            if id.is_empty() {
                return Err(PlancastError::Ingest(format!("step #{} has an empty id", index + 1)));
            }
            if s.text.trim().is_empty() {
                return Err(PlancastError::Ingest(format!("step {id} has empty text")));
            }
            let mut step = Step::new(id, s.text);
            step.dependencies = s.dependencies.into_iter().map(|d| d.trim().to_string()).collect();
            step.estimated_time_hours = s.estimated_time_hours;
            step.resources = s.resources;
            step.risk.factors = s
                .risk_factors
                .into_iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect();
            steps.push(step);
        }

        let mut plan = Plan::new(doc.goal, steps);
        plan.metadata = doc.metadata;
        if let Some(domain) = doc.domain {
            plan.metadata.insert(self.domain_key.clone(), domain);
        }

        debug!(steps = plan.steps.len(), goal = %plan.goal, "Plan ingested");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML_PLAN: &str = r#"
goal = "Ship the API"
domain = "software"

[metadata]
owner = "platform"

[[steps]]
id = "A"
text = "Design schema"
hours = 2

[[steps]]
id = "B"
text = "Build API"
depends_on = ["A"]
estimated_time_hours = 5.5
resources = ["backend team"]
risk_factors = ["legal approval pending", "  "]
"#;

    #[test]
    fn parses_toml() {
        let plan = StructuredIngestor::default().ingest(TOML_PLAN).unwrap();
        assert_eq!(plan.goal, "Ship the API");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].estimated_time_hours, Some(2.0));
        let b = plan.step("B").unwrap();
        assert_eq!(b.dependencies, vec!["A"]);
        assert_eq!(b.estimated_time_hours, Some(5.5));
        assert_eq!(b.resources, vec!["backend team"]);
        assert_eq!(b.risk.factors, vec!["legal approval pending"]);
        assert_eq!(plan.metadata["domain"], "software");
        assert_eq!(plan.metadata["owner"], "platform");
    }

    #[test]
    fn parses_json() {
        let json = r#"
        {
          "goal": "Renovate kitchen",
          "metadata": {"domain": "renovation"},
          "steps": [
            {"id": "permit", "text": "Get permit"},
            {"id": "demo", "text": "Demolish cabinets", "dependencies": ["permit"], "hours": 8}
          ]
        }"#;
        let plan = StructuredIngestor::default().ingest(json).unwrap();
        assert_eq!(plan.domain("domain", "general"), "renovation");
        assert_eq!(plan.step("demo").unwrap().dependencies, vec!["permit"]);
        assert!(plan.step("permit").unwrap().estimated_time_hours.is_none());
    }

    #[test]
    fn domain_field_uses_configured_key() {
        let plan = StructuredIngestor::new("industry")
            .ingest("domain = \"marketing\"\n")
            .unwrap();
        assert_eq!(plan.metadata.get("industry").map(String::as_str), Some("marketing"));
        assert!(!plan.metadata.contains_key("domain"));
    }

    #[test]
    fn empty_document_is_an_empty_plan() {
        let plan = StructuredIngestor::default().ingest("").unwrap();
        assert!(plan.steps.is_empty());
    }

    #[test]
    fn rejects_blank_id_or_text() {
        let blank_id = "[[steps]]\nid = \" \"\ntext = \"x\"\n";
        assert!(matches!(
            StructuredIngestor::default().ingest(blank_id),
            Err(PlancastError::Ingest(_))
        ));
        let blank_text = "[[steps]]\nid = \"a\"\ntext = \"\"\n";
        assert!(matches!(
            StructuredIngestor::default().ingest(blank_text),
            Err(PlancastError::Ingest(_))
        ));
    }

    #[test]
    fn malformed_input_is_an_ingest_error() {
        let err = StructuredIngestor::default().ingest("{ not json").unwrap_err();
        assert!(err.to_string().contains("JSON"));
        let err = StructuredIngestor::default().ingest("steps = 3").unwrap_err();
        assert!(matches!(err, PlancastError::Ingest(_)));
    }

    #[test]
    fn does_not_validate_graph() {
        let text = "[[steps]]\nid = \"a\"\ntext = \"x\"\ndepends_on = [\"ghost\"]\n";
        let plan = StructuredIngestor::default().ingest(text).unwrap();
        assert_eq!(plan.steps[0].dependencies, vec!["ghost"]);
    }
}
