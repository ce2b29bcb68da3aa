use futures::future::BoxFuture;
use regex::{Regex, RegexBuilder};
use tracing::debug;

use plancast_core::config::RiskRuleConfig;
use plancast_core::error::{PlancastError, Result};
use plancast_core::traits::{ExternalRiskSource, SignalRequest};

struct Rule {
    pattern: Regex,
    factor: String,
}

/// Offline risk source: each rule whose pattern matches the step text
/// (case-insensitively) contributes its factor.
pub struct RuleRiskSource {
    rules: Vec<Rule>,
}

impl RuleRiskSource {
    pub fn from_config(rules: &[RiskRuleConfig]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|r| {
                let pattern = RegexBuilder::new(&r.pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        PlancastError::Config(format!("invalid risk rule '{}': {}", r.pattern, e))
                    })?;
                Ok(Rule {
                    pattern,
                    factor: r.factor.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Factors of every matching rule, in rule order, without repeats.
    pub fn matches(&self, text: &str) -> Vec<String> {
        let mut factors: Vec<String> = Vec::new();
        for rule in &self.rules {
            if rule.pattern.is_match(text) && !factors.contains(&rule.factor) {
                factors.push(rule.factor.clone());
            }
        }
        factors
    }
}

impl ExternalRiskSource for RuleRiskSource {
    fn name(&self) -> &str {
        "rules"
    }

    fn risk_factors<'a>(&'a self, request: SignalRequest<'a>) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let mut factors = self.matches(&request.step.text);
            factors.truncate(request.max_factors);
            debug!(step_id = %request.step.id, matched = factors.len(), "Rules evaluated");
            Ok(factors)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plancast_core::types::{Graph, Step};

    fn rule(pattern: &str, factor: &str) -> RiskRuleConfig {
        RiskRuleConfig {
            pattern: pattern.into(),
            factor: factor.into(),
        }
    }

    fn source() -> RuleRiskSource {
        RuleRiskSource::from_config(&[
            rule(r"\blegal\b", "legal approval backlog"),
            rule(r"vendor|supplier", "vendor delivery delay"),
            rule(r"contract", "legal approval backlog"),
        ])
        .unwrap()
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(source().matches("Review with LEGAL"), vec!["legal approval backlog"]);
    }

    #[test]
    fn repeated_factor_reported_once() {
        let f = source().matches("Legal signs supplier contract");
        assert_eq!(f, vec!["legal approval backlog", "vendor delivery delay"]);
    }

    #[test]
    fn no_match_is_empty() {
        assert!(source().matches("Design schema").is_empty());
    }

    #[test]
    fn invalid_pattern_rejected() {
        let err = RuleRiskSource::from_config(&[rule("[z-a]", "x")]).err().unwrap();
        assert!(matches!(err, PlancastError::Config(_)));
    }

    #[tokio::test]
    async fn respects_factor_budget() {
        let step = Step::new("s", "Legal review of supplier contract");
        let graph = Graph::default();
        let factors = source()
            .risk_factors(SignalRequest {
                step: &step,
                graph: &graph,
                max_factors: 1,
            })
            .await
            .unwrap();
        assert_eq!(factors, vec!["legal approval backlog"]);
    }
}
