//! Executor — applies planned actions and hands them off for the record.

use parkgrid_core::{Action, AdaptationAction, AnalysisResult, ControlCommand, DecisionRecord};
use parkgrid_sim::CommandOutcome;
use tracing::{info, warn};

use crate::fleet::Fleet;
use crate::outbox::{Outbound, Outbox};

pub struct Executor {
    outbox: Outbox,
}

impl Executor {
    pub fn new(outbox: Outbox) -> Self {
        Self { outbox }
    }

    /// Apply `action` to the fleet and queue its command and decision
    /// record. Returns the command, or `None` for NO_OP.
    ///
    /// Redirects only move demand between lots; every other kind goes
    /// through the target simulator's command path, so re-applying the
    /// same command is harmless.
    pub fn execute(
        &self,
        analysis: &AnalysisResult,
        action: &AdaptationAction,
        fleet: &mut Fleet,
    ) -> Option<ControlCommand> {
        if action.action.is_no_op() {
            return None;
        }
        let command = ControlCommand::from(action);

        let applied = match &action.action {
            Action::RedirectVehicles { target_lot } => fleet
                .route(&action.lot_id, target_lot)
                .map(|()| CommandOutcome::Changed),
            _ => fleet.apply_command(&command),
        };
        match applied {
            Ok(outcome) => info!(
                lot = %action.lot_id,
                action = %action.kind(),
                reason = %action.reason,
                ?outcome,
                "adaptation executed"
            ),
            Err(e) => warn!(lot = %action.lot_id, action = %action.kind(), error = %e, "adaptation not applied"),
        }

        self.outbox.push(Outbound::Decision(DecisionRecord::new(analysis, action)));
        self.outbox.push(Outbound::Command(command.clone()));
        Some(command)
    }
}
