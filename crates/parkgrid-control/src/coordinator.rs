//! Coordinator — the tick driver of the control loop.
//!
//! Phases move `Init → Running → Stopping → Stopped`. One tick:
//!
//! 1. drain the inbound reading channel (latest per lot wins), validate,
//!    and adopt accepted readings
//! 2. capture the snapshot array all planning in this tick reads
//! 3. analyze and plan every lot, in config order
//! 4. execute redirects, then every other action
//! 5. advance every simulator
//! 6. queue readings and fleet metrics on the outbox
//!
//! A tick is synchronous, so a stop request is only ever observed
//! between ticks.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Timelike;
use parkgrid_core::{
    Action, AdaptationAction, AnalysisResult, ControlCommand, FacilityState, LotId, ParkConfig, SensorReading,
    SystemMetrics,
};
use parkgrid_sim::TickReport;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::analyzer::Analyzer;
use crate::clock::Clock;
use crate::cooldown::CooldownTracker;
use crate::error::ControlError;
use crate::executor::Executor;
use crate::fleet::Fleet;
use crate::outbox::{Outbound, Outbox};
use crate::planner::Planner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Init => "init",
            Phase::Running => "running",
            Phase::Stopping => "stopping",
            Phase::Stopped => "stopped",
        })
    }
}

/// What one tick did.
#[derive(Debug, Clone)]
pub struct TickSummary {
    pub tick: u64,
    /// Non-NO_OP actions, in execution order (redirects first).
    pub commands: Vec<ControlCommand>,
    pub readings_accepted: usize,
    pub readings_rejected: usize,
    pub reports: Vec<(LotId, TickReport)>,
    pub metrics: SystemMetrics,
}

pub struct Coordinator {
    config: ParkConfig,
    analyzer: Analyzer,
    planner: Planner,
    executor: Executor,
    cooldown: CooldownTracker,
    fleet: Fleet,
    outbox: Outbox,
    inbound: Option<mpsc::UnboundedReceiver<SensorReading>>,
    clock: Arc<dyn Clock>,
    phase: Phase,
    ticks: u64,
}

impl Coordinator {
    pub fn new(config: ParkConfig, fleet: Fleet, outbox: Outbox, clock: Arc<dyn Clock>) -> Self {
        Self {
            analyzer: Analyzer::new(config.adaptation.clone()),
            planner: Planner::new(&config),
            executor: Executor::new(outbox.clone()),
            cooldown: CooldownTracker::new(config.adaptation.cooldown()),
            fleet,
            outbox,
            inbound: None,
            clock,
            phase: Phase::Init,
            ticks: 0,
            config,
        }
    }

    /// Accept externally received readings on this channel.
    pub fn with_inbound(mut self, rx: mpsc::UnboundedReceiver<SensorReading>) -> Self {
        self.inbound = Some(rx);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn fleet_mut(&mut self) -> &mut Fleet {
        &mut self.fleet
    }

    pub fn cooldown(&self) -> &CooldownTracker {
        &self.cooldown
    }

    pub fn start(&mut self) -> Result<(), ControlError> {
        if self.phase != Phase::Init {
            return Err(ControlError::InvalidPhase {
                operation: "start",
                phase: self.phase,
            });
        }
        self.transition(Phase::Running);
        Ok(())
    }

    /// Stop after the current tick. Idempotent once stopped.
    pub fn stop(&mut self) {
        match self.phase {
            Phase::Stopped => {}
            Phase::Init => self.transition(Phase::Stopped),
            Phase::Running | Phase::Stopping => {
                self.transition(Phase::Stopping);
                // Ticks run to completion, so nothing is left in flight.
                self.transition(Phase::Stopped);
            }
        }
    }

    fn transition(&mut self, to: Phase) {
        if self.phase != to {
            info!(from = %self.phase, to = %to, ticks = self.ticks, "coordinator phase change");
            self.phase = to;
        }
    }

    /// Run one full cycle.
    pub fn tick(&mut self) -> Result<TickSummary, ControlError> {
        if self.phase != Phase::Running {
            return Err(ControlError::InvalidPhase {
                operation: "tick",
                phase: self.phase,
            });
        }
        let now = self.clock.now();
        let (readings_accepted, readings_rejected) = self.ingest();

        let snapshots = self.fleet.snapshots();
        let planned: Vec<(AnalysisResult, AdaptationAction)> = snapshots
            .iter()
            .map(|state| {
                let analysis = self.analyzer.analyze(state);
                let action = self.planner.plan(&analysis, &mut self.cooldown, &snapshots, now);
                (analysis, action)
            })
            .collect();

        let (redirects, others): (Vec<_>, Vec<_>) = planned
            .iter()
            .filter(|(_, action)| !action.action.is_no_op())
            .partition(|(_, action)| matches!(action.action, Action::RedirectVehicles { .. }));
        let commands: Vec<ControlCommand> = redirects
            .into_iter()
            .chain(others)
            .filter_map(|(analysis, action)| self.executor.execute(analysis, action, &mut self.fleet))
            .collect();

        let reports = self.fleet.advance(now.hour());

        let states = self.fleet.snapshots();
        for state in &states {
            self.outbox.push(Outbound::Reading(SensorReading::from_state(state, now)));
        }
        let metrics = SystemMetrics::aggregate(&states, self.config.adaptation.low_occupancy_threshold, now);
        self.outbox.push(Outbound::Metrics(metrics.clone()));

        self.ticks += 1;
        debug!(
            tick = self.ticks,
            commands = commands.len(),
            utilization = metrics.overall_utilization,
            revenue = metrics.total_revenue,
            "tick complete"
        );
        Ok(TickSummary {
            tick: self.ticks,
            commands,
            readings_accepted,
            readings_rejected,
            reports,
            metrics,
        })
    }

    /// Drain the inbound channel, keeping the newest reading per lot, and
    /// adopt the ones that validate.
    fn ingest(&mut self) -> (usize, usize) {
        let Some(rx) = self.inbound.as_mut() else {
            return (0, 0);
        };
        let mut latest: HashMap<LotId, SensorReading> = HashMap::new();
        while let Ok(reading) = rx.try_recv() {
            match latest.get(&reading.lot_id) {
                Some(kept) if kept.timestamp > reading.timestamp => {}
                _ => {
                    latest.insert(reading.lot_id.clone(), reading);
                }
            }
        }

        let (mut accepted, mut rejected) = (0, 0);
        for reading in latest.into_values() {
            match self.fleet.ingest(&reading) {
                Ok(()) => accepted += 1,
                Err(e) => {
                    rejected += 1;
                    warn!(lot = %reading.lot_id, error = %e, "sensor reading rejected, keeping last state");
                }
            }
        }
        (accepted, rejected)
    }

    /// Tick every `interval` until shutdown is signalled or `max_ticks`
    /// ticks have run.
    pub async fn run(
        &mut self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
        max_ticks: Option<u64>,
    ) -> Result<(), ControlError> {
        self.start()?;
        info!(
            lots = self.fleet.len(),
            interval_ms = interval.as_millis() as u64,
            "coordinator started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.tick()?;
                    for cmd in &summary.commands {
                        debug!(lot = %cmd.lot_id, action = %cmd.action, "command issued");
                    }
                    if max_ticks.is_some_and(|max| self.ticks >= max) {
                        info!(ticks = self.ticks, "tick limit reached");
                        break;
                    }
                }
                _ = shutdown.changed() => {
                    info!("coordinator shutting down");
                    break;
                }
            }
        }

        self.stop();
        Ok(())
    }

    /// Current state of every lot.
    pub fn snapshots(&self) -> Vec<FacilityState> {
        self.fleet.snapshots()
    }
}
