//! Planner — turns an analysis into at most one adaptation per lot.
//!
//! Decision matrix, first match wins, skipped entirely while the lot is
//! cooling down:
//!
//! 1. occupancy ≥ critical, queue > 0 and a peer below the redirect
//!    threshold exists → `RedirectVehicles` to the emptiest such peer
//! 2. gate closed and occupancy < reopen threshold → `OpenGate`
//! 3. queue ≥ gate close threshold and gate open → `CloseGate`
//! 4. occupancy > high threshold → `IncreasePrice`
//! 5. occupancy < low threshold → `DecreasePrice`
//! 6. otherwise `NoOp`
//!
//! Rule 2 before rule 3 gives the gate its hysteresis: once closed it
//! stays closed until occupancy drops, however short the queue gets.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parkgrid_core::{
    Action, AdaptationAction, AdaptationConfig, AnalysisResult, FacilityState, GateState, LotConfig,
    LotId, ParkConfig,
};
use tracing::{debug, warn};

use crate::cooldown::CooldownTracker;

#[derive(Debug, Clone)]
pub struct Planner {
    thresholds: AdaptationConfig,
    lots: HashMap<LotId, LotConfig>,
}

impl Planner {
    pub fn new(config: &ParkConfig) -> Self {
        Self {
            thresholds: config.adaptation.clone(),
            lots: config.lots.iter().map(|l| (l.id.clone(), l.clone())).collect(),
        }
    }

    /// Plan the next action for `analysis.lot_id`.
    ///
    /// `peers` is the fleet snapshot captured at tick start; the lot's own
    /// entry is ignored. Any non-NO_OP result is recorded in `cooldown`.
    pub fn plan(
        &self,
        analysis: &AnalysisResult,
        cooldown: &mut CooldownTracker,
        peers: &[FacilityState],
        now: DateTime<Utc>,
    ) -> AdaptationAction {
        let lot_id = analysis.lot_id.as_str();
        let Some(lot) = self.lots.get(lot_id) else {
            warn!(lot = %lot_id, "no configuration for lot, skipping");
            return AdaptationAction::no_op(lot_id, "Unknown lot", now);
        };

        if let Some(left) = cooldown.remaining(lot_id, now) {
            debug!(lot = %lot_id, remaining_ms = left.num_milliseconds(), "cooldown active");
            return AdaptationAction::no_op(
                lot_id,
                format!("Cooldown active ({:.1}s remaining)", left.num_milliseconds() as f64 / 1000.0),
                now,
            );
        }

        let (action, reason) = self.decide(&analysis.snapshot, lot, peers);
        if !action.is_no_op() {
            cooldown.record(lot_id, now);
        }
        AdaptationAction::new(lot_id, action, reason, now)
    }

    fn decide(&self, s: &FacilityState, lot: &LotConfig, peers: &[FacilityState]) -> (Action, String) {
        let t = &self.thresholds;
        let occupancy = s.occupancy_percentage();

        if occupancy >= t.critical_occupancy_threshold && s.queue_length > 0 {
            if let Some(target) = self.redirect_target(&s.lot_id, peers) {
                let reason = format!(
                    "Lot at capacity ({occupancy:.0}%) with {} queued, redirecting to {} ({:.0}%)",
                    s.queue_length,
                    target.lot_id,
                    target.occupancy_percentage()
                );
                let action = Action::RedirectVehicles {
                    target_lot: target.lot_id.clone(),
                };
                return (action, reason);
            }
        }

        if s.gate_state == GateState::Closed && occupancy < t.gate_reopen_occupancy {
            return (
                Action::OpenGate,
                format!("Occupancy down to {occupancy:.0}%, reopening gate"),
            );
        }

        if s.queue_length >= t.gate_close_queue_threshold && s.gate_state == GateState::Open {
            return (
                Action::CloseGate,
                format!("Queue length {} reached gate threshold ({occupancy:.0}% occupied)", s.queue_length),
            );
        }

        if occupancy > t.high_occupancy_threshold {
            let new_price = round_cents((s.current_price + t.price_increase_step).min(lot.max_price));
            return (
                Action::IncreasePrice { new_price },
                format!("High occupancy detected ({occupancy:.0}%)"),
            );
        }

        if occupancy < t.low_occupancy_threshold {
            let new_price = round_cents((s.current_price - t.price_decrease_step).max(lot.min_price));
            return (
                Action::DecreasePrice { new_price },
                format!("Low occupancy detected ({occupancy:.0}%)"),
            );
        }

        (Action::NoOp, "Conditions normal".to_string())
    }

    /// Emptiest peer under the redirect threshold; ties go to the lowest id.
    fn redirect_target<'a>(&self, source: &str, peers: &'a [FacilityState]) -> Option<&'a FacilityState> {
        peers
            .iter()
            .filter(|p| p.lot_id != source)
            .filter(|p| p.occupancy_percentage() < self.thresholds.redirect_occupancy_threshold)
            .min_by(|a, b| {
                a.occupancy_percentage()
                    .total_cmp(&b.occupancy_percentage())
                    .then_with(|| a.lot_id.cmp(&b.lot_id))
            })
    }
}

fn round_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;
    use chrono::{TimeDelta, TimeZone};
    use std::time::Duration;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn lot(id: &str) -> LotConfig {
        LotConfig {
            id: id.to_string(),
            name: None,
            total_capacity: 100,
            initial_occupancy: 0,
            base_price: 5.0,
            min_price: 2.0,
            max_price: 20.0,
        }
    }

    fn config() -> ParkConfig {
        ParkConfig {
            adaptation: AdaptationConfig::default(),
            simulation: Default::default(),
            lots: vec![lot("lot_1"), lot("lot_2"), lot("lot_3")],
        }
    }

    fn state(id: &str, occupancy: u32, queue: u32, price: f64) -> FacilityState {
        let mut s = FacilityState::new(id, 100, occupancy, price);
        s.queue_length = queue;
        s
    }

    fn plan_for(s: &FacilityState, peers: &[FacilityState]) -> AdaptationAction {
        let cfg = config();
        let analysis = Analyzer::new(cfg.adaptation.clone()).analyze(s);
        let mut cooldown = CooldownTracker::new(Duration::from_secs(10));
        Planner::new(&cfg).plan(&analysis, &mut cooldown, peers, t0())
    }

    #[test]
    fn high_occupancy_raises_price() {
        let a = plan_for(&state("lot_1", 92, 0, 5.0), &[]);
        assert_eq!(a.action, Action::IncreasePrice { new_price: 6.0 });
        assert_eq!(a.reason, "High occupancy detected (92%)");
    }

    #[test]
    fn price_increase_stops_at_max() {
        let a = plan_for(&state("lot_1", 95, 0, 19.5), &[]);
        assert_eq!(a.action, Action::IncreasePrice { new_price: 20.0 });
    }

    #[test]
    fn low_occupancy_lowers_price() {
        let a = plan_for(&state("lot_1", 45, 0, 5.0), &[]);
        assert_eq!(a.action, Action::DecreasePrice { new_price: 4.5 });
    }

    #[test]
    fn price_decrease_stops_at_min() {
        let a = plan_for(&state("lot_1", 10, 0, 2.2), &[]);
        assert_eq!(a.action, Action::DecreasePrice { new_price: 2.0 });
    }

    #[test]
    fn long_queue_closes_gate() {
        let a = plan_for(&state("lot_1", 88, 8, 5.0), &[]);
        assert_eq!(a.action, Action::CloseGate);
    }

    #[test]
    fn closed_gate_reopens_below_threshold_only() {
        let mut s = state("lot_1", 86, 0, 5.0);
        s.gate_state = GateState::Closed;
        assert_eq!(plan_for(&s, &[]).action, Action::NoOp);

        s.current_occupancy = 84;
        assert_eq!(plan_for(&s, &[]).action, Action::OpenGate);
    }

    #[test]
    fn closed_gate_with_long_queue_is_not_closed_again() {
        let mut s = state("lot_1", 88, 10, 5.0);
        s.gate_state = GateState::Closed;
        assert_eq!(plan_for(&s, &[]).action, Action::NoOp);
    }

    #[test]
    fn redirects_to_emptiest_eligible_peer() {
        let source = state("lot_1", 99, 3, 5.0);
        let peers = [
            source.clone(),
            state("lot_2", 60, 0, 5.0),
            state("lot_3", 40, 0, 5.0),
        ];
        let a = plan_for(&source, &peers);
        assert_eq!(
            a.action,
            Action::RedirectVehicles {
                target_lot: "lot_3".to_string()
            }
        );
    }

    #[test]
    fn redirect_tie_goes_to_lowest_id() {
        let source = state("lot_1", 99, 3, 5.0);
        let peers = [state("lot_3", 60, 0, 5.0), state("lot_2", 60, 0, 5.0)];
        let a = plan_for(&source, &peers);
        assert_eq!(
            a.action,
            Action::RedirectVehicles {
                target_lot: "lot_2".to_string()
            }
        );
    }

    #[test]
    fn no_eligible_peer_falls_through_to_pricing() {
        let source = state("lot_1", 99, 3, 5.0);
        let peers = [state("lot_2", 85, 0, 5.0)];
        let a = plan_for(&source, &peers);
        assert_eq!(a.action, Action::IncreasePrice { new_price: 6.0 });
    }

    #[test]
    fn no_redirect_without_queue() {
        let source = state("lot_1", 99, 0, 5.0);
        let peers = [state("lot_2", 10, 0, 5.0)];
        assert_eq!(plan_for(&source, &peers).kind(), parkgrid_core::ActionKind::IncreasePrice);
    }

    #[test]
    fn cooldown_suppresses_second_action() {
        let cfg = config();
        let planner = Planner::new(&cfg);
        let analysis = Analyzer::new(cfg.adaptation.clone()).analyze(&state("lot_1", 92, 0, 5.0));
        let mut cooldown = CooldownTracker::new(Duration::from_secs(10));

        let first = planner.plan(&analysis, &mut cooldown, &[], t0());
        assert!(!first.action.is_no_op());
        assert_eq!(cooldown.last_adaptation("lot_1"), Some(t0()));

        let second = planner.plan(&analysis, &mut cooldown, &[], t0() + TimeDelta::seconds(5));
        assert!(second.action.is_no_op());
        assert!(second.reason.starts_with("Cooldown active"));

        let third = planner.plan(&analysis, &mut cooldown, &[], t0() + TimeDelta::seconds(10));
        assert!(!third.action.is_no_op());
    }

    #[test]
    fn no_op_does_not_start_cooldown() {
        let cfg = config();
        let planner = Planner::new(&cfg);
        let analysis = Analyzer::new(cfg.adaptation.clone()).analyze(&state("lot_1", 70, 0, 5.0));
        let mut cooldown = CooldownTracker::new(Duration::from_secs(10));
        let a = planner.plan(&analysis, &mut cooldown, &[], t0());
        assert!(a.action.is_no_op());
        assert!(cooldown.last_adaptation("lot_1").is_none());
    }
}
