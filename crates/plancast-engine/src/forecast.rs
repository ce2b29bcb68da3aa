use std::collections::BTreeMap;
use std::fmt::Write as _;

use tracing::{debug, info};

use plancast_core::config::{AppConfig, ForecastConfig, ScoringConfig};
use plancast_core::traits::{has_history, MemoryLookup};
use plancast_core::types::{ForecastReport, Plan, RankedStep, Risk, ScheduleResult, Step};

use crate::annotate::Annotation;
use crate::scorer::{round2, RiskScorer};

/// A plan with final per-step risk, plus the report built from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub plan: Plan,
    pub report: ForecastReport,
}

/// Combines step scores, domain history and the critical path into a
/// plan-level failure forecast. Never fails: an unknown domain simply
/// contributes no historical risk.
#[derive(Debug, Clone, Default)]
pub struct Forecaster {
    scorer: RiskScorer,
    config: ForecastConfig,
}

impl Forecaster {
    pub fn new(scoring: ScoringConfig, config: ForecastConfig) -> Self {
        Self {
            scorer: RiskScorer::new(scoring),
            config,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.scoring.clone(), config.forecast.clone())
    }

    /// Final risk for one step.
    ///
    /// `intrinsic` is the text-only portion of the combined score and
    /// `external` the remainder, so the two always sum to the (clamped)
    /// combined score. A clamp is noted in the factors.
    pub fn score_step(&self, step: &Step, historical: f64) -> Risk {
        let breakdown = self.scorer.breakdown(&step.text, &step.risk.factors);
        let intrinsic = round2(breakdown.intrinsic.min(breakdown.combined));
        let external = round2((breakdown.combined - intrinsic).max(0.0));
        let total = round2((intrinsic + external + historical).min(self.config.total_ceiling));

        let mut factors = step.risk.factors.clone();
        if self.scorer.is_complex(&step.text) {
            factors.push(format!(
                "complex description ({} words)",
                step.text.split_whitespace().count()
            ));
        }
        if breakdown.clamped() {
            factors.push(format!(
                "step score capped at {:.2} (uncapped {:.2})",
                breakdown.combined, breakdown.raw
            ));
        }

        Risk {
            intrinsic,
            external,
            historical,
            total,
            factors,
        }
    }

    /// Score every step and aggregate the plan.
    pub fn forecast(
        &self,
        annotation: Annotation,
        schedule: &ScheduleResult,
        memory: &dyn MemoryLookup,
    ) -> Forecast {
        let Annotation {
            mut plan,
            external_risks,
            degraded_steps,
        } = annotation;

        let domain = plan
            .domain(&self.config.domain_key, &self.config.default_domain)
            .to_string();
        let narrative = memory.query(&domain);
        let historical = if has_history(&narrative) {
            self.config.historical_weight
        } else {
            0.0
        };
        debug!(domain = %domain, historical, "Domain history resolved");

        let mut risks = BTreeMap::new();
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for step in &mut plan.steps {
            let risk = self.score_step(step, historical);
            let weight = if schedule.is_critical(&step.id) {
                self.config.critical_path_weight
            } else {
                1.0
            };
            weighted_sum += weight * risk.total;
            weight_total += weight;
            risks.insert(step.id.clone(), risk.clone());
            step.risk = risk;
        }
        let failure_probability = if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            0.0
        };

        let top_risks = self.rank(&plan, schedule);
        let summary = render_summary(
            failure_probability,
            &domain,
            &narrative,
            &top_risks,
            &degraded_steps,
        );

        info!(
            steps = plan.steps.len(),
            failure_probability,
            partial = !degraded_steps.is_empty(),
            "Forecast complete"
        );

        let report = ForecastReport {
            risks,
            failure_probability,
            domain,
            historical_narrative: narrative,
            top_risks,
            external_risks,
            degraded_steps,
            summary,
        };
        Forecast { plan, report }
    }

    /// Highest totals first; ties broken by id.
    fn rank(&self, plan: &Plan, schedule: &ScheduleResult) -> Vec<RankedStep> {
        let mut ranked: Vec<RankedStep> = plan
            .steps
            .iter()
            .map(|s| RankedStep {
                step_id: s.id.clone(),
                total: s.risk.total,
                driver: s.risk.dominant_driver(),
                on_critical_path: schedule.is_critical(&s.id),
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.total
                .total_cmp(&a.total)
                .then_with(|| a.step_id.cmp(&b.step_id))
        });
        ranked.truncate(self.config.top_n);
        ranked
    }
}

fn render_summary(
    probability: f64,
    domain: &str,
    narrative: &str,
    top: &[RankedStep],
    degraded: &[String],
) -> String {
    let mut out = format!(
        "Plan failure probability: {:.2} (domain: {})\n",
        probability, domain
    );
    if !top.is_empty() {
        out.push_str("Top risks:\n");
        for (i, r) in top.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. {} ({:.2}) driven by {}{}",
                i + 1,
                r.step_id,
                r.total,
                r.driver,
                if r.on_critical_path { ", on critical path" } else { "" }
            );
        }
    }
    let _ = writeln!(out, "Domain history ({}): {}", domain, narrative);
    if !degraded.is_empty() {
        let _ = writeln!(
            out,
            "Note: based on partial external data; lookups degraded for {}",
            degraded.join(", ")
        );
    }
    out
}
