//! Control loop errors.

use parkgrid_core::ReadingError;
use thiserror::Error;

use crate::coordinator::Phase;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("reading rejected: {0}")]
    Reading(#[from] ReadingError),

    #[error("unknown lot '{0}'")]
    UnknownLot(String),

    #[error("cannot {operation} while {phase}")]
    InvalidPhase { operation: &'static str, phase: Phase },
}
