//! Outbox — fire-and-forget queue between the tick loop and I/O.

use parkgrid_core::{ControlCommand, DecisionRecord, SensorReading, SystemMetrics};
use tokio::sync::mpsc;
use tracing::warn;

/// Everything the loop hands off for persistence or publication.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Reading(SensorReading),
    Command(ControlCommand),
    Decision(DecisionRecord),
    Metrics(SystemMetrics),
}

impl Outbound {
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::Reading(_) => "reading",
            Outbound::Command(_) => "command",
            Outbound::Decision(_) => "decision",
            Outbound::Metrics(_) => "metrics",
        }
    }
}

/// Sending half. Pushing never blocks and never fails the caller.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outbound>,
}

pub type OutboxReceiver = mpsc::UnboundedReceiver<Outbound>;

pub fn outbox() -> (Outbox, OutboxReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Outbox { tx }, rx)
}

impl Outbox {
    pub fn push(&self, item: Outbound) {
        if let Err(e) = self.tx.send(item) {
            warn!(kind = e.0.kind(), "outbox closed, dropping item");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
