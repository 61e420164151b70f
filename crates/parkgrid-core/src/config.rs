//! parkgrid.toml configuration parser.
//!
//! Loaded once at startup and read-only afterwards. `ParkConfig::load`
//! parses and validates in one step; an inconsistent file is a fatal
//! `ConfigError`, never silently clamped.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::QUEUE_HARD_CAP;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParkConfig {
    #[serde(default)]
    pub adaptation: AdaptationConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    pub lots: Vec<LotConfig>,
}

/// Per-lot capacity and price bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LotConfig {
    pub id: String,
    pub name: Option<String>,
    pub total_capacity: u32,
    #[serde(default)]
    pub initial_occupancy: u32,
    pub base_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// Thresholds and steps used by the analyzer and planner.
///
/// Occupancy thresholds are percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdaptationConfig {
    pub high_occupancy_threshold: f64,
    pub low_occupancy_threshold: f64,
    pub critical_occupancy_threshold: f64,
    pub gate_close_queue_threshold: u32,
    pub queue_building_threshold: u32,
    pub gate_reopen_occupancy: f64,
    pub redirect_occupancy_threshold: f64,
    pub price_increase_step: f64,
    pub price_decrease_step: f64,
    pub cooldown_seconds: u64,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            high_occupancy_threshold: 90.0,
            low_occupancy_threshold: 50.0,
            critical_occupancy_threshold: 98.0,
            gate_close_queue_threshold: 8,
            queue_building_threshold: 5,
            gate_reopen_occupancy: 85.0,
            redirect_occupancy_threshold: 85.0,
            price_increase_step: 1.0,
            price_decrease_step: 0.5,
            cooldown_seconds: 10,
        }
    }
}

/// Parameters of the facility simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub tick_interval_seconds: u64,
    pub max_queue: u32,
    /// Bernoulli arrival trials per tick.
    pub arrival_slots: u32,
    pub base_arrival_rate: f64,
    pub base_departure_rate: f64,
    pub max_departure_probability: f64,
    pub price_elasticity: bool,
    /// Thin out arrivals once a lot is at least 90% full.
    pub capacity_damping: bool,
    pub queue_abandon_probability: f64,
    pub queue_abandon_max: u32,
    pub traffic_variation: bool,
    pub peak_hours: Vec<u32>,
    pub moderate_hours: Vec<u32>,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 2,
            max_queue: QUEUE_HARD_CAP,
            arrival_slots: 10,
            base_arrival_rate: 0.3,
            base_departure_rate: 0.15,
            max_departure_probability: 0.5,
            price_elasticity: true,
            capacity_damping: true,
            queue_abandon_probability: 0.1,
            queue_abandon_max: 2,
            traffic_variation: true,
            peak_hours: vec![8, 9, 12, 13, 17, 18],
            moderate_hours: vec![7, 10, 11, 14, 15, 16, 19],
            seed: None,
        }
    }
}

impl AdaptationConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}

impl SimulationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }
}

impl LotConfig {
    /// Clamp a price into this lot's `[min_price, max_price]` band.
    pub fn clamp_price(&self, price: f64) -> f64 {
        price.clamp(self.min_price, self.max_price)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl ParkConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ParkConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn lot(&self, id: &str) -> Option<&LotConfig> {
        self.lots.iter().find(|l| l.id == id)
    }

    /// Check every cross-field invariant. Any violation is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lots.is_empty() {
            return Err(invalid("at least one [[lots]] entry is required"));
        }

        let mut seen = HashSet::new();
        for lot in &self.lots {
            lot.validate()?;
            if !seen.insert(lot.id.as_str()) {
                return Err(invalid(format!("duplicate lot id {}", lot.id)));
            }
        }

        self.adaptation.validate()?;
        self.simulation.validate()?;

        if self.adaptation.gate_close_queue_threshold > self.simulation.max_queue {
            return Err(invalid(format!(
                "gate_close_queue_threshold ({}) exceeds max_queue ({})",
                self.adaptation.gate_close_queue_threshold, self.simulation.max_queue
            )));
        }
        Ok(())
    }
}

impl LotConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(invalid("lot id must not be empty"));
        }
        // Ids become store key prefixes and topic levels.
        if !self.id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(invalid(format!(
                "lot id {:?} may only contain ASCII letters, digits, '_' and '-'",
                self.id
            )));
        }
        if self.total_capacity == 0 {
            return Err(invalid(format!("lot {}: total_capacity must be positive", self.id)));
        }
        if self.initial_occupancy > self.total_capacity {
            return Err(invalid(format!(
                "lot {}: initial_occupancy {} exceeds total_capacity {}",
                self.id, self.initial_occupancy, self.total_capacity
            )));
        }
        for (field, value) in [
            ("base_price", self.base_price),
            ("min_price", self.min_price),
            ("max_price", self.max_price),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("lot {}: {field} must be a non-negative number", self.id)));
            }
        }
        if self.min_price > self.max_price {
            return Err(invalid(format!(
                "lot {}: min_price {} exceeds max_price {}",
                self.id, self.min_price, self.max_price
            )));
        }
        if self.base_price < self.min_price || self.base_price > self.max_price {
            return Err(invalid(format!(
                "lot {}: base_price {} outside [{}, {}]",
                self.id, self.base_price, self.min_price, self.max_price
            )));
        }
        Ok(())
    }
}

impl AdaptationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("high_occupancy_threshold", self.high_occupancy_threshold),
            ("low_occupancy_threshold", self.low_occupancy_threshold),
            ("critical_occupancy_threshold", self.critical_occupancy_threshold),
            ("gate_reopen_occupancy", self.gate_reopen_occupancy),
            ("redirect_occupancy_threshold", self.redirect_occupancy_threshold),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                return Err(invalid(format!("{field} must be within (0, 100], got {value}")));
            }
        }
        if self.low_occupancy_threshold >= self.high_occupancy_threshold {
            return Err(invalid(format!(
                "low_occupancy_threshold ({}) must be below high_occupancy_threshold ({})",
                self.low_occupancy_threshold, self.high_occupancy_threshold
            )));
        }
        if self.high_occupancy_threshold > self.critical_occupancy_threshold {
            return Err(invalid("high_occupancy_threshold exceeds critical_occupancy_threshold"));
        }
        if !(self.price_increase_step.is_finite() && self.price_increase_step > 0.0) {
            return Err(invalid("price_increase_step must be positive"));
        }
        if !(self.price_decrease_step.is_finite() && self.price_decrease_step > 0.0) {
            return Err(invalid("price_decrease_step must be positive"));
        }
        if self.queue_building_threshold == 0 || self.gate_close_queue_threshold == 0 {
            return Err(invalid("queue thresholds must be positive"));
        }
        Ok(())
    }
}

impl SimulationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_seconds == 0 {
            return Err(invalid("tick_interval_seconds must be positive"));
        }
        if self.max_queue == 0 || self.max_queue > QUEUE_HARD_CAP {
            return Err(invalid(format!(
                "max_queue must be within 1..={QUEUE_HARD_CAP}, got {}",
                self.max_queue
            )));
        }
        for (field, value) in [
            ("base_arrival_rate", self.base_arrival_rate),
            ("base_departure_rate", self.base_departure_rate),
            ("max_departure_probability", self.max_departure_probability),
            ("queue_abandon_probability", self.queue_abandon_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{field} must be within [0, 1], got {value}")));
            }
        }
        if let Some(h) = self
            .peak_hours
            .iter()
            .chain(self.moderate_hours.iter())
            .find(|h| **h >= 24)
        {
            return Err(invalid(format!("hour {h} is outside 0..24")));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
