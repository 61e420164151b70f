//! Shared types used across ParkGrid crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a parking facility, e.g. `lot_1`.
pub type LotId = String;

/// Hard upper bound on any lot's entry queue.
pub const QUEUE_HARD_CAP: u32 = 15;

// ── Gate ──────────────────────────────────────────────────────────

/// Entry gate position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Open,
    Closed,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::Open => "open",
            GateState::Closed => "closed",
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Facility ──────────────────────────────────────────────────────

/// Live counters for one parking lot.
///
/// Owned by the lot's simulator and mutated only by its tick logic and by
/// commands targeting that lot. Everyone else works on cloned snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityState {
    pub lot_id: LotId,
    pub total_capacity: u32,
    pub current_occupancy: u32,
    pub queue_length: u32,
    pub rejected_count: u64,
    pub current_price: f64,
    pub gate_state: GateState,
    pub revenue: f64,
    /// Simulation-only traffic intensity in `[0, 1]`.
    pub external_traffic_level: f64,
}

impl FacilityState {
    /// Fresh state for a lot with the gate open and no queue.
    pub fn new(lot_id: &str, total_capacity: u32, initial_occupancy: u32, price: f64) -> Self {
        Self {
            lot_id: lot_id.to_string(),
            total_capacity,
            current_occupancy: initial_occupancy.min(total_capacity),
            queue_length: 0,
            rejected_count: 0,
            current_price: price,
            gate_state: GateState::Open,
            revenue: 0.0,
            external_traffic_level: 0.5,
        }
    }

    /// Occupancy as a percentage in `[0, 100]`.
    pub fn occupancy_percentage(&self) -> f64 {
        if self.total_capacity == 0 {
            return 0.0;
        }
        self.current_occupancy as f64 / self.total_capacity as f64 * 100.0
    }

    pub fn available_spaces(&self) -> u32 {
        self.total_capacity.saturating_sub(self.current_occupancy)
    }

    pub fn is_full(&self) -> bool {
        self.current_occupancy >= self.total_capacity
    }
}

// ── Analysis ──────────────────────────────────────────────────────

/// Overall severity of a lot's condition. Ordered `None < ... < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A condition detected by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueTag {
    CriticalOccupancy,
    HighOccupancy,
    HighQueue,
    LowOccupancy,
    QueueBuilding,
}

impl IssueTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueTag::CriticalOccupancy => "CRITICAL_OCCUPANCY",
            IssueTag::HighOccupancy => "HIGH_OCCUPANCY",
            IssueTag::HighQueue => "HIGH_QUEUE",
            IssueTag::LowOccupancy => "LOW_OCCUPANCY",
            IssueTag::QueueBuilding => "QUEUE_BUILDING",
        }
    }

    /// Severity this tag carries when it is the primary finding.
    pub fn severity(&self) -> Severity {
        match self {
            IssueTag::CriticalOccupancy => Severity::Critical,
            IssueTag::HighOccupancy | IssueTag::HighQueue => Severity::High,
            IssueTag::LowOccupancy => Severity::Medium,
            IssueTag::QueueBuilding => Severity::Low,
        }
    }
}

impl fmt::Display for IssueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the analyzer for one lot and one tick.
///
/// `issues[0]`, when present, is the rule that determined `severity`;
/// the rest are lower-priority conditions that also hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub lot_id: LotId,
    pub issues: Vec<IssueTag>,
    pub severity: Severity,
    pub snapshot: FacilityState,
}

impl AnalysisResult {
    pub fn primary_issue(&self) -> Option<IssueTag> {
        self.issues.first().copied()
    }

    /// Issue tags joined for the decision log.
    pub fn trigger_condition(&self) -> String {
        if self.issues.is_empty() {
            return "NONE".to_string();
        }
        self.issues
            .iter()
            .map(IssueTag::as_str)
            .collect::<Vec<_>>()
            .join("; ")
    }
}
