use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{PlancastError, Result};
use crate::types::DEFAULT_DOMAIN;

/// Top-level Plancast configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub web_search: Option<WebSearchConfig>,
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Weights of the deterministic risk scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_base")]
    pub base: f64,
    /// Added when the step text has more words than the threshold.
    #[serde(default = "default_complexity_bonus")]
    pub complexity_bonus: f64,
    #[serde(default = "default_word_threshold")]
    pub complexity_word_threshold: usize,
    /// Added per factor mentioning "delay".
    #[serde(default = "default_delay_weight")]
    pub delay_weight: f64,
    /// Added per factor mentioning "approval".
    #[serde(default = "default_approval_weight")]
    pub approval_weight: f64,
    #[serde(default = "default_scoring_ceiling")]
    pub ceiling: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base: default_base(),
            complexity_bonus: default_complexity_bonus(),
            complexity_word_threshold: default_word_threshold(),
            delay_weight: default_delay_weight(),
            approval_weight: default_approval_weight(),
            ceiling: default_scoring_ceiling(),
        }
    }
}

fn default_base() -> f64 { 0.1 }
fn default_complexity_bonus() -> f64 { 0.15 }
fn default_word_threshold() -> usize { 20 }
fn default_delay_weight() -> f64 { 0.2 }
fn default_approval_weight() -> f64 { 0.1 }
fn default_scoring_ceiling() -> f64 { 0.95 }

/// Forecaster aggregation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Domain used when plan metadata has none.
    #[serde(default = "default_domain")]
    pub default_domain: String,
    /// Metadata key holding the plan's domain.
    #[serde(default = "default_domain_key")]
    pub domain_key: String,
    /// Historical risk applied when the domain has recorded failures.
    #[serde(default = "default_historical_weight")]
    pub historical_weight: f64,
    #[serde(default = "default_total_ceiling")]
    pub total_ceiling: f64,
    /// Aggregate weight of a critical-path step (off-path steps weigh 1).
    #[serde(default = "default_critical_path_weight")]
    pub critical_path_weight: f64,
    /// Number of steps named in the narrative report.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            default_domain: default_domain(),
            domain_key: default_domain_key(),
            historical_weight: default_historical_weight(),
            total_ceiling: default_total_ceiling(),
            critical_path_weight: default_critical_path_weight(),
            top_n: default_top_n(),
        }
    }
}

fn default_domain() -> String { DEFAULT_DOMAIN.to_string() }
fn default_domain_key() -> String { "domain".to_string() }
fn default_historical_weight() -> f64 { 0.1 }
fn default_total_ceiling() -> f64 { 0.99 }
fn default_critical_path_weight() -> f64 { 2.0 }
fn default_top_n() -> usize { 3 }

/// External risk signal lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsConfig {
    /// Per-step lookup timeout in milliseconds.
    #[serde(default = "default_signal_timeout")]
    pub timeout_ms: u64,
    /// Query budget: maximum factors kept per step.
    #[serde(default = "default_max_factors")]
    pub max_factors: usize,
    /// Maximum lookups in flight at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Static keyword rules.
    #[serde(default)]
    pub rules: Vec<RiskRuleConfig>,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_signal_timeout(),
            max_factors: default_max_factors(),
            max_concurrent: default_max_concurrent(),
            rules: vec![],
        }
    }
}

fn default_signal_timeout() -> u64 { 5000 }
fn default_max_factors() -> usize { 5 }
fn default_max_concurrent() -> usize { 8 }

/// A regex rule: steps whose text matches `pattern` receive `factor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskRuleConfig {
    pub pattern: String,
    pub factor: String,
}

/// Web search provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    pub api_key: String,
    /// Text prepended to each step when building the search query.
    #[serde(default = "default_query_prefix")]
    pub query_prefix: String,
}

fn default_search_provider() -> String { "tavily".to_string() }
fn default_query_prefix() -> String { "common risks and delays:".to_string() }

/// Historical memory configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// SQLite database path. In-process memory is used when absent.
    #[serde(default)]
    pub path: Option<String>,
    /// Extra domain → narrative entries applied at startup.
    #[serde(default)]
    pub domains: BTreeMap<String, String>,
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| PlancastError::ConfigNotFound(path.display().to_string()))?;

        let expanded = expand_vars(&content, |name| std::env::var(name).ok())?;

        let config: Self =
            toml::from_str(&expanded).map_err(|e| PlancastError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject settings the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.scoring.ceiling) {
            return Err(PlancastError::Config(format!(
                "scoring.ceiling must be within [0, 1], got {}",
                self.scoring.ceiling
            )));
        }
        if !unit.contains(&self.forecast.total_ceiling) {
            return Err(PlancastError::Config(format!(
                "forecast.total_ceiling must be within [0, 1], got {}",
                self.forecast.total_ceiling
            )));
        }
        if self.forecast.critical_path_weight <= 0.0 {
            return Err(PlancastError::Config(
                "forecast.critical_path_weight must be positive".into(),
            ));
        }
        if self.signals.max_concurrent == 0 {
            return Err(PlancastError::Config(
                "signals.max_concurrent must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the memory database path (expand ~).
    pub fn memory_path(&self) -> Option<PathBuf> {
        let raw = self.memory.path.as_deref()?;
        Some(resolve_home(raw, std::env::var_os("HOME").map(PathBuf::from)))
    }
}

/// Substitute `${NAME}` references using `lookup`. Unresolved names are left
/// as written.
fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    let reference = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| PlancastError::Config(e.to_string()))?;
    let expanded = reference.replace_all(input, |caps: &Captures<'_>| {
        lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });
    Ok(expanded.into_owned())
}

/// `~/rest` becomes `home/rest` when a home directory is known.
fn resolve_home(raw: &str, home: Option<PathBuf>) -> PathBuf {
    match (raw.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}
