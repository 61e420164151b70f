//! Sensor reading: the wire form of a `FacilityState`.
//!
//! Published on `parking/lot/{lot_id}/sensors` and appended to the
//! `parking_sensor_data` table. Readings arriving from outside are checked
//! by [`SensorReading::validate`] before they replace a lot's state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LotConfig;
use crate::error::ReadingError;
use crate::records::time_key;
use crate::types::{FacilityState, GateState, LotId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub lot_id: LotId,
    pub occupancy_percentage: f64,
    /// Signed so that out-of-range payloads can be detected and rejected.
    pub current_occupancy: i64,
    pub total_capacity: u32,
    pub queue_length: i64,
    pub rejected_count: u64,
    pub current_price: f64,
    pub gate_state: GateState,
    pub revenue: f64,
    #[serde(default = "default_traffic")]
    pub external_traffic_level: f64,
    pub timestamp: DateTime<Utc>,
}

fn default_traffic() -> f64 {
    0.5
}

impl SensorReading {
    pub fn from_state(state: &FacilityState, timestamp: DateTime<Utc>) -> Self {
        Self {
            lot_id: state.lot_id.clone(),
            occupancy_percentage: round2(state.occupancy_percentage()),
            current_occupancy: state.current_occupancy as i64,
            total_capacity: state.total_capacity,
            queue_length: state.queue_length as i64,
            rejected_count: state.rejected_count,
            current_price: state.current_price,
            gate_state: state.gate_state,
            revenue: round2(state.revenue),
            external_traffic_level: round2(state.external_traffic_level),
            timestamp,
        }
    }

    /// Key in the sensor data table: `{lot_id}:{epoch_millis}`.
    pub fn table_key(&self) -> String {
        time_key(&self.lot_id, self.timestamp)
    }

    /// Validate against the lot's config and its last accepted state.
    ///
    /// On success returns the state to adopt; `occupancy_percentage` in the
    /// payload is ignored and recomputed from the counters.
    pub fn validate(
        &self,
        lot: &LotConfig,
        max_queue: u32,
        previous: &FacilityState,
    ) -> Result<FacilityState, ReadingError> {
        if self.lot_id != lot.id {
            return Err(ReadingError::UnknownLot(self.lot_id.clone()));
        }
        if self.total_capacity != lot.total_capacity {
            return Err(ReadingError::CapacityMismatch {
                expected: lot.total_capacity,
                actual: self.total_capacity,
            });
        }
        if self.current_occupancy < 0 || self.current_occupancy > lot.total_capacity as i64 {
            return Err(ReadingError::OccupancyOutOfRange {
                occupancy: self.current_occupancy,
                capacity: lot.total_capacity,
            });
        }
        if self.queue_length < 0 || self.queue_length > max_queue as i64 {
            return Err(ReadingError::QueueOutOfRange {
                queue: self.queue_length,
                max_queue,
            });
        }
        if !self.current_price.is_finite() || self.current_price < 0.0 {
            return Err(ReadingError::InvalidNumber("current_price"));
        }
        if !self.revenue.is_finite() || self.revenue < 0.0 {
            return Err(ReadingError::InvalidNumber("revenue"));
        }
        if !self.external_traffic_level.is_finite() || self.external_traffic_level < 0.0 {
            return Err(ReadingError::InvalidNumber("external_traffic_level"));
        }
        if self.rejected_count < previous.rejected_count {
            return Err(ReadingError::CounterRegressed("rejected_count"));
        }
        // Readings carry revenue rounded to cents.
        if self.revenue + 0.005 < previous.revenue {
            return Err(ReadingError::CounterRegressed("revenue"));
        }

        Ok(FacilityState {
            lot_id: self.lot_id.clone(),
            total_capacity: self.total_capacity,
            current_occupancy: self.current_occupancy as u32,
            queue_length: self.queue_length as u32,
            rejected_count: self.rejected_count,
            current_price: lot.clamp_price(self.current_price),
            gate_state: self.gate_state,
            revenue: self.revenue.max(previous.revenue),
            external_traffic_level: self.external_traffic_level.min(1.0),
        })
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot() -> LotConfig {
        LotConfig {
            id: "lot_1".to_string(),
            name: None,
            total_capacity: 100,
            initial_occupancy: 0,
            base_price: 5.0,
            min_price: 2.0,
            max_price: 20.0,
        }
    }

    fn reading(occupancy: i64, queue: i64) -> SensorReading {
        let mut state = FacilityState::new("lot_1", 100, 0, 5.0);
        state.revenue = 10.0;
        let mut r = SensorReading::from_state(&state, Utc::now());
        r.current_occupancy = occupancy;
        r.queue_length = queue;
        r
    }

    #[test]
    fn valid_reading_is_adopted() {
        let previous = FacilityState::new("lot_1", 100, 40, 5.0);
        let state = reading(60, 3).validate(&lot(), 15, &previous).unwrap();
        assert_eq!(state.current_occupancy, 60);
        assert_eq!(state.queue_length, 3);
        assert_eq!(state.occupancy_percentage(), 60.0);
    }

    #[test]
    fn negative_occupancy_is_rejected() {
        let previous = FacilityState::new("lot_1", 100, 40, 5.0);
        let err = reading(-1, 0).validate(&lot(), 15, &previous).unwrap_err();
        assert!(matches!(err, ReadingError::OccupancyOutOfRange { occupancy: -1, .. }));
    }

    #[test]
    fn occupancy_above_capacity_is_rejected() {
        let previous = FacilityState::new("lot_1", 100, 40, 5.0);
        assert!(reading(101, 0).validate(&lot(), 15, &previous).is_err());
    }

    #[test]
    fn queue_above_max_is_rejected() {
        let previous = FacilityState::new("lot_1", 100, 40, 5.0);
        let err = reading(50, 16).validate(&lot(), 15, &previous).unwrap_err();
        assert!(matches!(err, ReadingError::QueueOutOfRange { queue: 16, .. }));
    }

    #[test]
    fn capacity_mismatch_is_rejected() {
        let previous = FacilityState::new("lot_1", 100, 40, 5.0);
        let mut r = reading(50, 0);
        r.total_capacity = 120;
        assert!(matches!(
            r.validate(&lot(), 15, &previous),
            Err(ReadingError::CapacityMismatch { expected: 100, actual: 120 })
        ));
    }

    #[test]
    fn regressing_rejections_are_rejected() {
        let mut previous = FacilityState::new("lot_1", 100, 40, 5.0);
        previous.rejected_count = 9;
        assert_eq!(
            reading(50, 0).validate(&lot(), 15, &previous),
            Err(ReadingError::CounterRegressed("rejected_count"))
        );
    }

    #[test]
    fn non_finite_price_is_rejected() {
        let previous = FacilityState::new("lot_1", 100, 40, 5.0);
        let mut r = reading(50, 0);
        r.current_price = f64::NAN;
        assert_eq!(
            r.validate(&lot(), 15, &previous),
            Err(ReadingError::InvalidNumber("current_price"))
        );
    }

    #[test]
    fn percentage_is_rounded_on_the_wire() {
        let state = FacilityState::new("lot_1", 3, 1, 5.0);
        let r = SensorReading::from_state(&state, Utc::now());
        assert_eq!(r.occupancy_percentage, 33.33);
    }
}
