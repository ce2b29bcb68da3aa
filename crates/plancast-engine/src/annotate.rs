use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use plancast_core::types::Plan;

/// External risk factors gathered for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSignals {
    pub step_id: String,
    pub factors: Vec<String>,
    /// Why the lookup degraded (timeout, source failure), if it did.
    #[serde(default)]
    pub degraded: Option<String>,
}

impl StepSignals {
    pub fn found(step_id: impl Into<String>, factors: Vec<String>) -> Self {
        Self {
            step_id: step_id.into(),
            factors,
            degraded: None,
        }
    }

    pub fn degraded(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::partial(step_id, vec![], reason)
    }

    /// Factors from the sources that answered, plus why the rest did not.
    pub fn partial(
        step_id: impl Into<String>,
        factors: Vec<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            factors,
            degraded: Some(reason.into()),
        }
    }
}

/// A plan whose steps carry their external risk factors.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub plan: Plan,
    /// Distinct factors across all steps, in first-seen order.
    pub external_risks: Vec<String>,
    /// Steps whose lookup degraded, in plan order.
    pub degraded_steps: Vec<String>,
}

/// Attach gathered factors to their steps.
///
/// Each step's `risk.factors` is extended with its signals, skipping blanks
/// and strings it already carries. Steps without signals are left untouched.
pub fn annotate(plan: Plan, signals: Vec<StepSignals>) -> Annotation {
    let mut by_step: HashMap<String, StepSignals> = HashMap::with_capacity(signals.len());
    for signal in signals {
        if plan.step(&signal.step_id).is_none() {
            warn!(step_id = %signal.step_id, "Risk signals for unknown step ignored");
            continue;
        }
        match by_step.get_mut(&signal.step_id) {
            Some(existing) => {
                existing.factors.extend(signal.factors);
                if existing.degraded.is_none() {
                    existing.degraded = signal.degraded;
                }
            }
            None => {
                by_step.insert(signal.step_id.clone(), signal);
            }
        }
    }

    let mut plan = plan;
    let mut degraded_steps = Vec::new();
    for step in &mut plan.steps {
        let Some(signal) = by_step.remove(&step.id) else {
            continue;
        };
        if signal.degraded.is_some() {
            degraded_steps.push(step.id.clone());
        }
        for factor in signal.factors {
            let factor = factor.trim();
            if factor.is_empty() || step.risk.factors.iter().any(|f| f == factor) {
                continue;
            }
            step.risk.factors.push(factor.to_string());
        }
        debug!(step_id = %step.id, factors = step.risk.factors.len(), "Step annotated");
    }

    let mut seen = HashSet::new();
    let external_risks = plan
        .steps
        .iter()
        .flat_map(|s| s.risk.factors.iter())
        .filter(|f| seen.insert(f.as_str()))
        .cloned()
        .collect();

    Annotation {
        plan,
        external_risks,
        degraded_steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plancast_core::types::Step;

    fn plan() -> Plan {
        Plan::new(
            "launch",
            vec![
                Step::new("a", "Design schema"),
                Step::new("b", "Build API").depends_on("a"),
                Step::new("c", "Deploy").depends_on("b"),
            ],
        )
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn extends_factors_in_order() {
        let out = annotate(
            plan(),
            vec![StepSignals::found("b", strings(&["legal approval", "vendor delay"]))],
        );
        let b = out.plan.step("b").unwrap();
        assert_eq!(b.risk.factors, strings(&["legal approval", "vendor delay"]));
        assert!(out.plan.step("a").unwrap().risk.factors.is_empty());
        assert_eq!(out.external_risks, strings(&["legal approval", "vendor delay"]));
        assert!(out.degraded_steps.is_empty());
    }

    #[test]
    fn deduplicates_within_and_across_steps() {
        let mut p = plan();
        p.steps[0].risk.factors.push("vendor delay".into());
        let out = annotate(
            p,
            vec![
                StepSignals::found("a", strings(&["vendor delay", "  ", "scope creep"])),
                StepSignals::found("b", strings(&["vendor delay", "vendor delay"])),
            ],
        );
        assert_eq!(
            out.plan.step("a").unwrap().risk.factors,
            strings(&["vendor delay", "scope creep"])
        );
        assert_eq!(out.plan.step("b").unwrap().risk.factors, strings(&["vendor delay"]));
        assert_eq!(out.external_risks, strings(&["vendor delay", "scope creep"]));
    }

    #[test]
    fn records_degraded_steps_in_plan_order() {
        let out = annotate(
            plan(),
            vec![
                StepSignals::degraded("c", "timed out"),
                StepSignals::found("b", vec![]),
                StepSignals::degraded("a", "unavailable"),
            ],
        );
        assert_eq!(out.degraded_steps, strings(&["a", "c"]));
        assert!(out.external_risks.is_empty());
    }

    #[test]
    fn no_signals_leaves_plan_unchanged() {
        let original = plan();
        let out = annotate(original.clone(), vec![]);
        assert_eq!(out.plan, original);
    }

    #[test]
    fn unknown_step_ignored() {
        let out = annotate(plan(), vec![StepSignals::found("zzz", strings(&["delay"]))]);
        assert!(out.external_risks.is_empty());
    }
}
