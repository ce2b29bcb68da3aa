use plancast_core::config::ScoringConfig;

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// How a combined score was assembled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    /// Portion attributable to the step text alone.
    pub intrinsic: f64,
    /// Sum of the factor-driven increments, before clamping.
    pub external: f64,
    /// `intrinsic + external`, rounded, before clamping.
    pub raw: f64,
    /// Final clamped and rounded score.
    pub combined: f64,
}

impl ScoreBreakdown {
    /// Whether the ceiling cut the raw sum.
    pub fn clamped(&self) -> bool {
        self.raw > self.combined
    }
}

/// Deterministic keyword-based risk scorer.
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    config: ScoringConfig,
}

impl RiskScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Whether the text is long enough to count as complex.
    pub fn is_complex(&self, text: &str) -> bool {
        text.split_whitespace().count() > self.config.complexity_word_threshold
    }

    /// Base risk plus the complexity bonus for long descriptions.
    pub fn intrinsic(&self, text: &str) -> f64 {
        let mut risk = self.config.base;
        if self.is_complex(text) {
            risk += self.config.complexity_bonus;
        }
        risk
    }

    /// Increments from external factors. A factor mentioning both keywords
    /// contributes both weights.
    pub fn external(&self, factors: &[String]) -> f64 {
        factors
            .iter()
            .map(|factor| {
                let lower = factor.to_lowercase();
                let mut increment = 0.0;
                if lower.contains("delay") {
                    increment += self.config.delay_weight;
                }
                if lower.contains("approval") {
                    increment += self.config.approval_weight;
                }
                increment
            })
            .sum()
    }

    pub fn breakdown(&self, text: &str, factors: &[String]) -> ScoreBreakdown {
        let intrinsic = self.intrinsic(text);
        let external = self.external(factors);
        let raw = round2(intrinsic + external);
        ScoreBreakdown {
            intrinsic,
            external,
            raw,
            combined: round2(raw.min(self.config.ceiling)),
        }
    }

    /// Combined score in `[0, ceiling]`, rounded to two decimals.
    pub fn score(&self, text: &str, factors: &[String]) -> f64 {
        self.breakdown(text, factors).combined
    }
}

/// Score with the default weights.
pub fn score(text: &str, factors: &[String]) -> f64 {
    RiskScorer::default().score(text, factors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factors(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn long_text() -> String {
        vec!["word"; 21].join(" ")
    }

    #[test]
    fn short_text_no_factors_is_base() {
        assert_eq!(score("Design schema", &[]), 0.1);
        assert_eq!(score("", &[]), 0.1);
    }

    #[test]
    fn word_threshold_is_exclusive() {
        let twenty = vec!["word"; 20].join(" ");
        assert_eq!(score(&twenty, &[]), 0.1);
        assert_eq!(score(&long_text(), &[]), 0.25);
    }

    #[test]
    fn deterministic() {
        let f = factors(&["Regulatory approval delay expected"]);
        let first = score("Build API", &f);
        for _ in 0..10 {
            assert_eq!(score("Build API", &f), first);
        }
    }

    #[test]
    fn keywords_case_insensitive() {
        assert_eq!(score("x", &factors(&["DELAY in shipping"])), 0.3);
        assert_eq!(score("x", &factors(&["Awaiting Approval"])), 0.2);
        assert_eq!(score("x", &factors(&["Delayed APPROVAL from legal"])), 0.4);
    }

    #[test]
    fn factors_contribute_independently() {
        let f = factors(&["supplier delay", "board approval", "weather"]);
        assert_eq!(score("x", &f), 0.4);
    }

    #[test]
    fn clamps_at_ceiling() {
        let f = factors(&["delay", "delay", "delay", "delay", "delay"]);
        assert_eq!(score(&long_text(), &f), 0.95);

        let scorer = RiskScorer::default();
        let b = scorer.breakdown(&long_text(), &f);
        assert!(b.clamped());
        assert_eq!(b.raw, 1.25);
        assert_eq!(b.combined, 0.95);
    }

    #[test]
    fn exact_ceiling_is_not_clamped() {
        // 0.25 + 0.2 * 3 + 0.1 = 0.95
        let f = factors(&["delay", "delay", "delay", "approval"]);
        let b = RiskScorer::default().breakdown(&long_text(), &f);
        assert_eq!(b.combined, 0.95);
        assert!(!b.clamped());
    }

    #[test]
    fn output_has_two_decimals() {
        let f = factors(&["delay", "approval", "delay"]);
        let s = score(&long_text(), &f);
        assert_eq!(s, round2(s));
        assert_eq!(s, 0.75);
    }

    #[test]
    fn custom_weights() {
        let scorer = RiskScorer::new(ScoringConfig {
            base: 0.2,
            delay_weight: 0.5,
            ceiling: 0.6,
            ..Default::default()
        });
        assert_eq!(scorer.score("x", &[]), 0.2);
        assert_eq!(scorer.score("x", &factors(&["delay"])), 0.6);
    }

    #[test]
    fn round2_behaviour() {
        assert_eq!(round2(0.1 + 0.2), 0.3);
        assert_eq!(round2(0.126), 0.13);
        assert_eq!(round2(0.0), 0.0);
    }
}
