//! Time-of-day traffic model.

use parkgrid_core::SimulationConfig;

use crate::rng::LotRng;

const PEAK_LEVEL: f64 = 0.8;
const MODERATE_LEVEL: f64 = 0.5;
const LOW_LEVEL: f64 = 0.2;
const JITTER: f64 = 0.1;

/// Maps the hour of day to an external traffic level in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct TrafficModel {
    variation: bool,
    peak_hours: Vec<u32>,
    moderate_hours: Vec<u32>,
}

impl TrafficModel {
    pub fn new(params: &SimulationConfig) -> Self {
        Self {
            variation: params.traffic_variation,
            peak_hours: params.peak_hours.clone(),
            moderate_hours: params.moderate_hours.clone(),
        }
    }

    /// Level before jitter for the given hour.
    pub fn base_level(&self, hour: u32) -> f64 {
        if !self.variation {
            return MODERATE_LEVEL;
        }
        if self.peak_hours.contains(&hour) {
            PEAK_LEVEL
        } else if self.moderate_hours.contains(&hour) {
            MODERATE_LEVEL
        } else {
            LOW_LEVEL
        }
    }

    /// Draw this tick's level: base for the hour plus ±0.1 jitter.
    pub fn sample(&self, hour: u32, rng: &mut LotRng) -> f64 {
        if !self.variation {
            return MODERATE_LEVEL;
        }
        (self.base_level(hour) + rng.uniform(-JITTER, JITTER)).clamp(0.0, 1.0)
    }
}

/// Arrival-rate multiplier for a traffic level.
pub fn traffic_multiplier(level: f64) -> f64 {
    0.5 + level.clamp(0.0, 1.0)
}
