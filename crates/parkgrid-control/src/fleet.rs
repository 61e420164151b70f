//! Fleet — the coordinator's owned set of lot simulators.
//!
//! Besides indexing simulators by lot id, the fleet carries demand that
//! redirection moves between lots: a routed vehicle is owed to the target
//! as an extra arrival on its next advance, and the source gives up its
//! next successful arrival draw.

use std::collections::HashMap;

use parkgrid_core::{ControlCommand, FacilityState, LotId, ParkConfig, SensorReading};
use parkgrid_sim::{CommandOutcome, SimRng, Simulator, TickReport};
use tracing::warn;

use crate::error::ControlError;

pub struct Fleet {
    sims: Vec<Simulator>,
    index: HashMap<LotId, usize>,
    /// Routed arrivals owed to each lot, by position in `sims`.
    routed: Vec<u32>,
    max_queue: u32,
}

impl Fleet {
    /// One simulator per configured lot, in config order.
    pub fn from_config(config: &ParkConfig, rng: &SimRng) -> Self {
        let sims: Vec<Simulator> = config
            .lots
            .iter()
            .enumerate()
            .map(|(i, lot)| Simulator::new(lot.clone(), config.simulation.clone(), rng.lot(i)))
            .collect();
        let index = sims
            .iter()
            .enumerate()
            .map(|(i, s)| (s.lot_id().to_string(), i))
            .collect();
        Self {
            routed: vec![0; sims.len()],
            sims,
            index,
            max_queue: config.simulation.max_queue,
        }
    }

    pub fn len(&self) -> usize {
        self.sims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sims.is_empty()
    }

    pub fn lot_ids(&self) -> impl Iterator<Item = &str> {
        self.sims.iter().map(Simulator::lot_id)
    }

    pub fn get(&self, lot_id: &str) -> Option<&Simulator> {
        self.index.get(lot_id).map(|&i| &self.sims[i])
    }

    pub fn get_mut(&mut self, lot_id: &str) -> Option<&mut Simulator> {
        self.index.get(lot_id).map(|&i| &mut self.sims[i])
    }

    pub fn state(&self, lot_id: &str) -> Option<&FacilityState> {
        self.get(lot_id).map(Simulator::state)
    }

    /// Cloned states of every lot, in config order.
    pub fn snapshots(&self) -> Vec<FacilityState> {
        self.sims.iter().map(Simulator::snapshot).collect()
    }

    /// Routed arrivals currently owed to `lot_id`.
    pub fn routed_to(&self, lot_id: &str) -> u32 {
        self.index.get(lot_id).map_or(0, |&i| self.routed[i])
    }

    /// Validate an external reading and, if it passes, adopt it as the
    /// lot's state.
    pub fn ingest(&mut self, reading: &SensorReading) -> Result<(), ControlError> {
        let max_queue = self.max_queue;
        let sim = self
            .get_mut(&reading.lot_id)
            .ok_or_else(|| ControlError::UnknownLot(reading.lot_id.clone()))?;
        let state = reading.validate(sim.lot(), max_queue, sim.state())?;
        sim.replace_state(state);
        Ok(())
    }

    /// Apply a command to the lot it addresses.
    pub fn apply_command(&mut self, command: &ControlCommand) -> Result<CommandOutcome, ControlError> {
        let sim = self
            .get_mut(&command.lot_id)
            .ok_or_else(|| ControlError::UnknownLot(command.lot_id.clone()))?;
        Ok(sim.apply_command(command))
    }

    /// Move one unit of demand from `source` to `target`.
    pub fn route(&mut self, source: &str, target: &str) -> Result<(), ControlError> {
        let src = *self
            .index
            .get(source)
            .ok_or_else(|| ControlError::UnknownLot(source.to_string()))?;
        let dst = *self
            .index
            .get(target)
            .ok_or_else(|| ControlError::UnknownLot(target.to_string()))?;
        if src == dst {
            warn!(lot = %source, "redirect to self ignored");
            return Ok(());
        }
        self.sims[src].divert_next_arrival();
        self.routed[dst] += 1;
        Ok(())
    }

    /// Advance every lot by one tick at the given hour of day.
    ///
    /// Routed arrivals owed to a lot are delivered first and then cleared.
    pub fn advance(&mut self, hour: u32) -> Vec<(LotId, TickReport)> {
        self.sims
            .iter_mut()
            .zip(self.routed.iter_mut())
            .map(|(sim, routed)| {
                let level = sim.sample_traffic(hour);
                let report = sim.tick(level, std::mem::take(routed));
                (sim.lot_id().to_string(), report)
            })
            .collect()
    }
}
