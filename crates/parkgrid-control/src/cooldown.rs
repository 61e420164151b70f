//! Per-lot cooldown between adaptation attempts.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parkgrid_core::LotId;

/// Last adaptation time per lot.
///
/// A lot is cooling while `now - last < window`. Only non-NO_OP actions
/// are recorded, and they are recorded when planned, not when delivered.
#[derive(Debug, Clone)]
pub struct CooldownTracker {
    window: TimeDelta,
    last: HashMap<LotId, DateTime<Utc>>,
}

impl CooldownTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            last: HashMap::new(),
        }
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    pub fn last_adaptation(&self, lot_id: &str) -> Option<DateTime<Utc>> {
        self.last.get(lot_id).copied()
    }

    /// Time left before `lot_id` may adapt again, if any.
    pub fn remaining(&self, lot_id: &str, now: DateTime<Utc>) -> Option<TimeDelta> {
        let last = self.last.get(lot_id)?;
        let elapsed = now - *last;
        (elapsed < self.window).then(|| self.window.checked_sub(&elapsed).unwrap_or(TimeDelta::MAX))
    }

    pub fn is_cooling(&self, lot_id: &str, now: DateTime<Utc>) -> bool {
        self.remaining(lot_id, now).is_some()
    }

    pub fn record(&mut self, lot_id: &str, now: DateTime<Utc>) {
        self.last.insert(lot_id.to_string(), now);
    }
}
