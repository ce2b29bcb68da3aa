//! Providers of external risk factors for plan steps.

pub mod composite;
pub mod rules;
pub mod web_search;

use std::sync::Arc;

use tracing::info;

use plancast_core::config::AppConfig;
use plancast_core::error::Result;
use plancast_core::traits::ExternalRiskSource;

pub use composite::{CompositeRiskSource, NoopRiskSource};
pub use rules::RuleRiskSource;
pub use web_search::WebSearchRiskSource;

/// Assemble the risk sources enabled in configuration.
///
/// Rules come first, then web search. With nothing configured the result is
/// a source that never reports factors.
pub fn from_config(config: &AppConfig) -> Result<Arc<dyn ExternalRiskSource>> {
    let mut sources: Vec<Arc<dyn ExternalRiskSource>> = Vec::new();

    if !config.signals.rules.is_empty() {
        sources.push(Arc::new(RuleRiskSource::from_config(&config.signals.rules)?));
    }
    if let Some(ws) = &config.web_search {
        if ws.api_key.trim().is_empty() {
            info!("Web search configured without an API key; skipping");
        } else {
            sources.push(Arc::new(WebSearchRiskSource::from_config(ws)?));
        }
    }

    info!(sources = sources.len(), "Risk sources ready");
    Ok(match sources.len() {
        0 => Arc::new(NoopRiskSource),
        1 => sources.remove(0),
        _ => Arc::new(CompositeRiskSource::new(sources)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use plancast_core::config::{RiskRuleConfig, WebSearchConfig};

    #[test]
    fn nothing_configured_is_noop() {
        let source = from_config(&AppConfig::default()).unwrap();
        assert_eq!(source.name(), "noop");
    }

    #[test]
    fn rules_only() {
        let mut config = AppConfig::default();
        config.signals.rules.push(RiskRuleConfig {
            pattern: "permit".into(),
            factor: "permit approval delay".into(),
        });
        assert_eq!(from_config(&config).unwrap().name(), "rules");
    }

    #[test]
    fn rules_and_search_compose() {
        let mut config = AppConfig::default();
        config.signals.rules.push(RiskRuleConfig {
            pattern: "permit".into(),
            factor: "permit approval delay".into(),
        });
        config.web_search = Some(WebSearchConfig {
            provider: "tavily".into(),
            api_key: "tvly-test".into(),
            query_prefix: "risks:".into(),
        });
        assert_eq!(from_config(&config).unwrap().name(), "composite");
    }

    #[test]
    fn blank_api_key_skips_search() {
        let mut config = AppConfig::default();
        config.web_search = Some(WebSearchConfig {
            provider: "tavily".into(),
            api_key: "  ".into(),
            query_prefix: "risks:".into(),
        });
        assert_eq!(from_config(&config).unwrap().name(), "noop");
    }

    #[test]
    fn bad_rule_is_config_error() {
        let mut config = AppConfig::default();
        config.signals.rules.push(RiskRuleConfig {
            pattern: "(unclosed".into(),
            factor: "x".into(),
        });
        assert!(from_config(&config).is_err());
    }
}
