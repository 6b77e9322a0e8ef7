//! Actionable suggestions derived from assessed forecast state.
//!
//! Suggestions come from a static, ordered rules table. Every matching
//! rule emits its template; the result is deduplicated by type (first
//! match wins) and ranked by descending priority.

use std::collections::HashSet;

use burndown_core::{CvBucket, Magnitude, RiskLevel, Suggestion, SuggestionType, VelocityTrend};

/// State the rules are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuggestionInput {
    /// Assessed risk level
    pub risk_level: RiskLevel,
    /// Velocity trend
    pub trend: VelocityTrend,
    /// Variability bucket
    pub cv_bucket: CvBucket,
    /// Delay probability (0-100), if a target was set
    pub delay_probability: Option<f64>,
}

impl SuggestionInput {
    fn delay_at_least(&self, threshold: f64) -> bool {
        self.delay_probability.is_some_and(|p| p >= threshold)
    }
}

/// One row of the rules table.
#[derive(Clone, Copy)]
pub struct SuggestionRule {
    /// Suggestion emitted when the rule matches
    pub suggestion_type: SuggestionType,
    /// Predicate over the assessed state
    pub applies: fn(&SuggestionInput) -> bool,
    /// Priority before risk and delay bonuses
    pub base_priority: u32,
    /// Expected impact
    pub impact: Magnitude,
    /// Expected effort
    pub effort: Magnitude,
    /// Recommendation text
    pub text: &'static str,
}

impl SuggestionRule {
    fn render(&self, input: &SuggestionInput) -> Suggestion {
        Suggestion {
            suggestion_type: self.suggestion_type,
            priority: priority(self.base_priority, input),
            impact: self.impact,
            effort: self.effort,
            text: self.text.to_string(),
        }
    }
}

fn at_least_high_risk(i: &SuggestionInput) -> bool {
    i.risk_level >= RiskLevel::High
}

fn likely_late(i: &SuggestionInput) -> bool {
    i.delay_at_least(40.0)
}

fn needs_capacity(i: &SuggestionInput) -> bool {
    i.risk_level == RiskLevel::Critical || i.delay_at_least(65.0)
}

fn slowing_down(i: &SuggestionInput) -> bool {
    i.trend == VelocityTrend::Decreasing
}

fn erratic(i: &SuggestionInput) -> bool {
    i.cv_bucket == CvBucket::High
}

fn process_drag(i: &SuggestionInput) -> bool {
    i.cv_bucket >= CvBucket::Medium
        || (i.trend == VelocityTrend::Decreasing && i.risk_level >= RiskLevel::Medium)
}

fn worth_watching(i: &SuggestionInput) -> bool {
    matches!(i.risk_level, RiskLevel::Medium | RiskLevel::High) || i.cv_bucket == CvBucket::Medium
}

fn on_track(i: &SuggestionInput) -> bool {
    i.risk_level == RiskLevel::Low
        && i.trend != VelocityTrend::Decreasing
        && i.cv_bucket == CvBucket::Low
}

/// The rules table, in evaluation order.
pub static RULES: &[SuggestionRule] = &[
    SuggestionRule {
        suggestion_type: SuggestionType::ReduceScope,
        applies: at_least_high_risk,
        base_priority: 50,
        impact: Magnitude::High,
        effort: Magnitude::Medium,
        text: "Defer lower-priority tasks out of this release to bring the forecast inside the target",
    },
    SuggestionRule {
        suggestion_type: SuggestionType::ReduceScope,
        applies: likely_late,
        base_priority: 50,
        impact: Magnitude::High,
        effort: Magnitude::Medium,
        text: "Defer lower-priority tasks out of this release to bring the forecast inside the target",
    },
    SuggestionRule {
        suggestion_type: SuggestionType::AddressSlowdown,
        applies: slowing_down,
        base_priority: 45,
        impact: Magnitude::High,
        effort: Magnitude::Medium,
        text: "Velocity is falling; review blockers, unplanned work and context switching from the last periods",
    },
    SuggestionRule {
        suggestion_type: SuggestionType::IncreaseCapacity,
        applies: needs_capacity,
        base_priority: 40,
        impact: Magnitude::High,
        effort: Magnitude::High,
        text: "Add capacity to the board or negotiate a later target date",
    },
    SuggestionRule {
        suggestion_type: SuggestionType::StabilizeVelocity,
        applies: erratic,
        base_priority: 35,
        impact: Magnitude::Medium,
        effort: Magnitude::Medium,
        text: "Split large tasks and limit work in progress to make throughput more predictable",
    },
    SuggestionRule {
        suggestion_type: SuggestionType::ProcessImprovement,
        applies: process_drag,
        base_priority: 20,
        impact: Magnitude::Medium,
        effort: Magnitude::Low,
        text: "Hold a retrospective focused on estimation and handoffs",
    },
    SuggestionRule {
        suggestion_type: SuggestionType::IncreaseMonitoring,
        applies: worth_watching,
        base_priority: 10,
        impact: Magnitude::Low,
        effort: Magnitude::Low,
        text: "Regenerate the forecast more often until risk settles",
    },
    SuggestionRule {
        suggestion_type: SuggestionType::MaintainPace,
        applies: on_track,
        base_priority: 5,
        impact: Magnitude::Low,
        effort: Magnitude::Low,
        text: "The board is on track; keep the current pace",
    },
];

/// Priority grows with risk level and delay probability.
fn priority(base: u32, input: &SuggestionInput) -> u32 {
    let delay_bonus = input
        .delay_probability
        .map(|p| (p.clamp(0.0, 100.0) / 10.0).floor() as u32)
        .unwrap_or(0);
    base + input.risk_level.weight() * 10 + delay_bonus
}

/// Maps assessed state to ranked suggestions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuggestionEngine;

impl SuggestionEngine {
    /// Create a new engine.
    pub fn new() -> Self {
        Self
    }

    /// The rules table this engine evaluates.
    pub fn rules(&self) -> &'static [SuggestionRule] {
        RULES
    }

    /// Ranked suggestions for the given state.
    pub fn suggest(
        &self,
        risk_level: RiskLevel,
        trend: VelocityTrend,
        cv_bucket: CvBucket,
        delay_probability: Option<f64>,
    ) -> Vec<Suggestion> {
        self.suggest_for(&SuggestionInput {
            risk_level,
            trend,
            cv_bucket,
            delay_probability,
        })
    }

    /// Ranked suggestions for a prepared input.
    pub fn suggest_for(&self, input: &SuggestionInput) -> Vec<Suggestion> {
        let mut seen = HashSet::new();
        let mut suggestions: Vec<Suggestion> = RULES
            .iter()
            .filter(|rule| (rule.applies)(input))
            .filter(|rule| seen.insert(rule.suggestion_type))
            .map(|rule| rule.render(input))
            .collect();

        // Stable sort keeps table order among equal priorities
        suggestions.sort_by(|a, b| b.priority.cmp(&a.priority));
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(suggestions: &[Suggestion]) -> Vec<SuggestionType> {
        suggestions.iter().map(|s| s.suggestion_type).collect()
    }

    #[test]
    fn test_suggest_is_pure() {
        let engine = SuggestionEngine::new();
        let a = engine.suggest(RiskLevel::High, VelocityTrend::Decreasing, CvBucket::High, Some(65.0));
        let b = engine.suggest(RiskLevel::High, VelocityTrend::Decreasing, CvBucket::High, Some(65.0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_high_risk_decreasing_erratic() {
        let engine = SuggestionEngine::new();
        let s = engine.suggest(RiskLevel::High, VelocityTrend::Decreasing, CvBucket::High, Some(65.0));

        assert_eq!(
            types(&s),
            vec![
                SuggestionType::ReduceScope,
                SuggestionType::AddressSlowdown,
                SuggestionType::IncreaseCapacity,
                SuggestionType::StabilizeVelocity,
                SuggestionType::ProcessImprovement,
                SuggestionType::IncreaseMonitoring,
            ]
        );
        // base 50 + high risk 20 + 65% delay 6
        assert_eq!(s[0].priority, 76);
        assert!(s.windows(2).all(|w| w[0].priority >= w[1].priority));
    }

    #[test]
    fn test_types_are_unique() {
        let engine = SuggestionEngine::new();
        // Both reduce_scope rules match here
        let s = engine.suggest(RiskLevel::Critical, VelocityTrend::Stable, CvBucket::Low, Some(90.0));
        let reduce = s
            .iter()
            .filter(|x| x.suggestion_type == SuggestionType::ReduceScope)
            .count();
        assert_eq!(reduce, 1);
        assert!(types(&s).contains(&SuggestionType::IncreaseCapacity));
    }

    #[test]
    fn test_healthy_board_keeps_pace() {
        let engine = SuggestionEngine::new();
        let s = engine.suggest(RiskLevel::Low, VelocityTrend::Increasing, CvBucket::Low, Some(3.0));
        assert_eq!(types(&s), vec![SuggestionType::MaintainPace]);
        assert_eq!(s[0].impact, Magnitude::Low);
    }

    #[test]
    fn test_medium_risk_without_target() {
        let engine = SuggestionEngine::new();
        let s = engine.suggest(RiskLevel::Medium, VelocityTrend::Stable, CvBucket::Medium, None);
        assert_eq!(
            types(&s),
            vec![SuggestionType::ProcessImprovement, SuggestionType::IncreaseMonitoring]
        );
        assert_eq!(s[1].priority, 20);
    }

    #[test]
    fn test_priority_rises_with_risk_and_delay() {
        let engine = SuggestionEngine::new();
        let low = engine.suggest(RiskLevel::High, VelocityTrend::Stable, CvBucket::Low, Some(31.0));
        let high = engine.suggest(RiskLevel::Critical, VelocityTrend::Stable, CvBucket::Low, Some(80.0));

        let scope = |s: &[Suggestion]| {
            s.iter()
                .find(|x| x.suggestion_type == SuggestionType::ReduceScope)
                .map(|x| x.priority)
                .unwrap()
        };
        assert!(scope(&high) > scope(&low));
    }

    #[test]
    fn test_each_rule_individually() {
        let base = SuggestionInput {
            risk_level: RiskLevel::Low,
            trend: VelocityTrend::Stable,
            cv_bucket: CvBucket::Low,
            delay_probability: None,
        };
        let rule = |t: SuggestionType| RULES.iter().filter(move |r| r.suggestion_type == t);

        assert!(rule(SuggestionType::AddressSlowdown)
            .all(|r| (r.applies)(&SuggestionInput { trend: VelocityTrend::Decreasing, ..base })));
        assert!(rule(SuggestionType::StabilizeVelocity)
            .all(|r| !(r.applies)(&base)));
        assert!(rule(SuggestionType::StabilizeVelocity)
            .all(|r| (r.applies)(&SuggestionInput { cv_bucket: CvBucket::High, ..base })));
        assert!(rule(SuggestionType::IncreaseCapacity)
            .all(|r| (r.applies)(&SuggestionInput { delay_probability: Some(70.0), ..base })));
        assert!(rule(SuggestionType::MaintainPace).all(|r| (r.applies)(&base)));
        assert!(rule(SuggestionType::IncreaseMonitoring)
            .all(|r| (r.applies)(&SuggestionInput { risk_level: RiskLevel::Medium, ..base })));
    }

    #[test]
    fn test_every_catalogue_entry_reachable() {
        let engine = SuggestionEngine::new();
        let all: HashSet<SuggestionType> = engine.rules().iter().map(|r| r.suggestion_type).collect();
        for t in [
            SuggestionType::ReduceScope,
            SuggestionType::StabilizeVelocity,
            SuggestionType::AddressSlowdown,
            SuggestionType::IncreaseCapacity,
            SuggestionType::ProcessImprovement,
            SuggestionType::IncreaseMonitoring,
        ] {
            assert!(all.contains(&t), "missing rule for {}", t.as_str());
        }
    }
}
