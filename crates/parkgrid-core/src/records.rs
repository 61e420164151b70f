//! Knowledge-store records: the decision log and fleet-wide metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::{ActionKind, AdaptationAction};
use crate::types::{AnalysisResult, FacilityState, LotId};

/// One row of `adaptation_decisions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub lot_id: LotId,
    pub timestamp: DateTime<Utc>,
    pub action: ActionKind,
    pub trigger_condition: String,
    /// Rule-based decisions are always fully confident.
    pub confidence: f64,
    pub expected_outcome: String,
    pub occupancy_percentage: f64,
    pub queue_length: u32,
    pub price: f64,
    pub reason: String,
}

impl DecisionRecord {
    pub fn new(analysis: &AnalysisResult, action: &AdaptationAction) -> Self {
        let kind = action.kind();
        Self {
            lot_id: action.lot_id.clone(),
            timestamp: action.timestamp,
            action: kind,
            trigger_condition: analysis.trigger_condition(),
            confidence: 1.0,
            expected_outcome: kind.expected_outcome().to_string(),
            occupancy_percentage: analysis.snapshot.occupancy_percentage(),
            queue_length: analysis.snapshot.queue_length,
            price: analysis.snapshot.current_price,
            reason: action.reason.clone(),
        }
    }

    /// Key in the decisions table: `{lot_id}:{epoch_millis}`.
    pub fn table_key(&self) -> String {
        time_key(&self.lot_id, self.timestamp)
    }
}

/// Aggregate view over all lots for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub timestamp: DateTime<Utc>,
    pub total_revenue: f64,
    pub total_occupancy: u64,
    pub total_capacity: u64,
    /// Percent of all spaces in use.
    pub overall_utilization: f64,
    pub total_rejected: u64,
    pub total_queue_length: u64,
    pub average_price: f64,
    pub lots_at_capacity: u32,
    pub lots_under_utilized: u32,
}

/// Occupancy percentage at which a lot counts as at capacity.
const AT_CAPACITY_PERCENT: f64 = 95.0;

impl SystemMetrics {
    pub fn aggregate(states: &[FacilityState], low_occupancy_threshold: f64, timestamp: DateTime<Utc>) -> Self {
        let total_revenue: f64 = states.iter().map(|s| s.revenue).sum();
        let total_occupancy: u64 = states.iter().map(|s| s.current_occupancy as u64).sum();
        let total_capacity: u64 = states.iter().map(|s| s.total_capacity as u64).sum();
        let total_rejected: u64 = states.iter().map(|s| s.rejected_count).sum();
        let total_queue_length: u64 = states.iter().map(|s| s.queue_length as u64).sum();

        let average_price = if states.is_empty() {
            0.0
        } else {
            states.iter().map(|s| s.current_price).sum::<f64>() / states.len() as f64
        };
        let overall_utilization = if total_capacity == 0 {
            0.0
        } else {
            total_occupancy as f64 / total_capacity as f64 * 100.0
        };

        Self {
            timestamp,
            total_revenue,
            total_occupancy,
            total_capacity,
            overall_utilization,
            total_rejected,
            total_queue_length,
            average_price,
            lots_at_capacity: states
                .iter()
                .filter(|s| s.occupancy_percentage() >= AT_CAPACITY_PERCENT)
                .count() as u32,
            lots_under_utilized: states
                .iter()
                .filter(|s| s.occupancy_percentage() < low_occupancy_threshold)
                .count() as u32,
        }
    }

    /// Key in the system metrics table: zero-padded epoch millis.
    pub fn table_key(&self) -> String {
        format!("{:020}", epoch_millis(self.timestamp))
    }
}

/// Composite key `{lot_id}:{epoch_millis}` that sorts chronologically per lot.
pub fn time_key(lot_id: &str, at: DateTime<Utc>) -> String {
    format!("{lot_id}:{:020}", epoch_millis(at))
}

fn epoch_millis(at: DateTime<Utc>) -> u64 {
    at.timestamp_millis().max(0) as u64
}
