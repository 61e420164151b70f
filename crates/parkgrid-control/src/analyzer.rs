//! Analyzer — classifies a lot snapshot into issues and a severity.
//!
//! Rules are checked in a fixed priority order:
//!
//! | # | condition                         | severity | tag                  |
//! |---|-----------------------------------|----------|----------------------|
//! | 1 | occupancy > critical (98%)        | CRITICAL | `CRITICAL_OCCUPANCY` |
//! | 2 | occupancy > high (90%)            | HIGH     | `HIGH_OCCUPANCY`     |
//! | 3 | queue ≥ gate close threshold (8)  | HIGH     | `HIGH_QUEUE`         |
//! | 4 | occupancy < low (50%)             | MEDIUM   | `LOW_OCCUPANCY`      |
//! | 5 | queue ≥ queue building (5)        | LOW      | `QUEUE_BUILDING`     |
//!
//! The first match decides the severity. Every other matching tag is kept
//! after it, in the same order, for the decision log.

use parkgrid_core::{AdaptationConfig, AnalysisResult, FacilityState, IssueTag, Severity};

#[derive(Debug, Clone)]
pub struct Analyzer {
    thresholds: AdaptationConfig,
}

impl Analyzer {
    pub fn new(thresholds: AdaptationConfig) -> Self {
        Self { thresholds }
    }

    pub fn analyze(&self, state: &FacilityState) -> AnalysisResult {
        let t = &self.thresholds;
        let occupancy = state.occupancy_percentage();
        let queue = state.queue_length;

        let rules = [
            (occupancy > t.critical_occupancy_threshold, IssueTag::CriticalOccupancy),
            (occupancy > t.high_occupancy_threshold, IssueTag::HighOccupancy),
            (queue >= t.gate_close_queue_threshold, IssueTag::HighQueue),
            (occupancy < t.low_occupancy_threshold, IssueTag::LowOccupancy),
            (queue >= t.queue_building_threshold, IssueTag::QueueBuilding),
        ];
        let issues: Vec<IssueTag> = rules
            .into_iter()
            .filter_map(|(matched, tag)| matched.then_some(tag))
            .collect();
        let severity = issues.first().map_or(Severity::None, IssueTag::severity);

        AnalysisResult {
            lot_id: state.lot_id.clone(),
            issues,
            severity,
            snapshot: state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> Analyzer {
        Analyzer::new(AdaptationConfig::default())
    }

    fn state(occupancy: u32, queue: u32) -> FacilityState {
        let mut s = FacilityState::new("lot_1", 100, occupancy, 5.0);
        s.queue_length = queue;
        s
    }

    #[test]
    fn critical_occupancy_wins() {
        let r = analyzer().analyze(&state(99, 9));
        assert_eq!(r.severity, Severity::Critical);
        assert_eq!(r.primary_issue(), Some(IssueTag::CriticalOccupancy));
        assert_eq!(
            r.issues,
            vec![IssueTag::CriticalOccupancy, IssueTag::HighOccupancy, IssueTag::HighQueue, IssueTag::QueueBuilding]
        );
    }

    #[test]
    fn exactly_98_is_high_not_critical() {
        let r = analyzer().analyze(&state(98, 0));
        assert_eq!(r.severity, Severity::High);
        assert_eq!(r.primary_issue(), Some(IssueTag::HighOccupancy));
    }

    #[test]
    fn high_queue_at_moderate_occupancy() {
        let r = analyzer().analyze(&state(70, 8));
        assert_eq!(r.severity, Severity::High);
        assert_eq!(r.primary_issue(), Some(IssueTag::HighQueue));
        assert_eq!(r.trigger_condition(), "HIGH_QUEUE; QUEUE_BUILDING");
    }

    #[test]
    fn low_occupancy_is_medium() {
        let r = analyzer().analyze(&state(45, 0));
        assert_eq!(r.severity, Severity::Medium);
        assert_eq!(r.issues, vec![IssueTag::LowOccupancy]);
    }

    #[test]
    fn queue_building_is_low() {
        let r = analyzer().analyze(&state(70, 5));
        assert_eq!(r.severity, Severity::Low);
        assert_eq!(r.issues, vec![IssueTag::QueueBuilding]);
    }

    #[test]
    fn normal_state_has_no_issues() {
        let r = analyzer().analyze(&state(70, 0));
        assert_eq!(r.severity, Severity::None);
        assert!(r.issues.is_empty());
        assert_eq!(r.trigger_condition(), "NONE");
        assert_eq!(r.snapshot.current_occupancy, 70);
    }

    #[test]
    fn thresholds_are_configurable() {
        let analyzer = Analyzer::new(AdaptationConfig {
            high_occupancy_threshold: 75.0,
            ..AdaptationConfig::default()
        });
        assert_eq!(analyzer.analyze(&state(80, 0)).severity, Severity::High);
    }
}
