//! parkgrid-core — shared data model for the ParkGrid control loop.
//!
//! Holds the per-lot live counters (`FacilityState`), the analysis and
//! adaptation types exchanged between the Analyzer, Planner and Executor,
//! the wire forms published on the transport (`SensorReading`,
//! `ControlCommand`), the knowledge-store records, and the TOML
//! configuration loaded once at startup.

pub mod action;
pub mod config;
pub mod error;
pub mod reading;
pub mod records;
pub mod types;

pub use action::{Action, ActionKind, AdaptationAction, CommandParameters, ControlCommand};
pub use config::{AdaptationConfig, LotConfig, ParkConfig, SimulationConfig};
pub use error::{CommandError, ConfigError, ReadingError};
pub use reading::SensorReading;
pub use records::{time_key, DecisionRecord, SystemMetrics};
pub use types::*;
