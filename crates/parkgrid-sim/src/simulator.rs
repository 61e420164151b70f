//! Per-lot simulator — owns a `FacilityState` and advances it one tick at a time.

use parkgrid_core::{Action, ControlCommand, FacilityState, GateState, LotConfig, SimulationConfig};
use tracing::{debug, warn};

use crate::rng::LotRng;
use crate::traffic::{traffic_multiplier, TrafficModel};

/// Floor of the price elasticity factor on arrivals.
const MIN_PRICE_FACTOR: f64 = 0.3;
const DAMPING_THRESHOLD: f64 = 0.9;

/// Counts of what happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Successful arrival draws plus routed arrivals, excluding diverted ones.
    pub arrivals: u32,
    pub admitted: u32,
    pub departures: u32,
    pub queued: u32,
    pub rejected: u32,
    pub abandoned: u32,
    pub routed_in: u32,
    pub diverted: u32,
}

/// Result of applying a control command to a lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The lot's state changed.
    Changed,
    /// Valid command, but the lot was already in the requested state.
    Unchanged,
    /// Malformed or misaddressed command, treated as a no-op.
    Ignored,
}

/// Simulates one parking lot.
pub struct Simulator {
    lot: LotConfig,
    params: SimulationConfig,
    traffic: TrafficModel,
    state: FacilityState,
    rng: LotRng,
    /// Successful arrival draws owed to peers through redirection.
    pending_diversions: u32,
}

impl Simulator {
    pub fn new(lot: LotConfig, params: SimulationConfig, rng: LotRng) -> Self {
        let state = FacilityState::new(&lot.id, lot.total_capacity, lot.initial_occupancy, lot.base_price);
        Self {
            traffic: TrafficModel::new(&params),
            lot,
            params,
            state,
            rng,
            pending_diversions: 0,
        }
    }

    pub fn lot_id(&self) -> &str {
        &self.lot.id
    }

    pub fn lot(&self) -> &LotConfig {
        &self.lot
    }

    pub fn state(&self) -> &FacilityState {
        &self.state
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> FacilityState {
        self.state.clone()
    }

    /// Adopt an externally validated state.
    pub fn replace_state(&mut self, state: FacilityState) {
        debug_assert_eq!(state.lot_id, self.lot.id);
        self.state = state;
    }

    pub fn pending_diversions(&self) -> u32 {
        self.pending_diversions
    }

    /// Hand this lot's next successful arrival draw to a peer.
    pub fn divert_next_arrival(&mut self) {
        self.pending_diversions += 1;
    }

    /// Draw the traffic level for the given hour from this lot's RNG.
    pub fn sample_traffic(&mut self, hour: u32) -> f64 {
        self.traffic.sample(hour, &mut self.rng)
    }

    /// Probability that one arrival slot produces a vehicle.
    pub fn arrival_probability(&self) -> f64 {
        let mut p = self.params.base_arrival_rate * traffic_multiplier(self.state.external_traffic_level);
        if self.params.price_elasticity {
            p *= (1.5 - 0.5 * self.price_ratio()).max(MIN_PRICE_FACTOR);
        }
        if self.params.capacity_damping {
            let fill = self.state.occupancy_percentage() / 100.0;
            if fill >= DAMPING_THRESHOLD {
                p *= (1.0 - fill) * 5.0;
            }
        }
        p.clamp(0.0, 1.0)
    }

    /// Probability that one parked vehicle leaves this tick.
    pub fn departure_probability(&self) -> f64 {
        if self.state.current_occupancy == 0 {
            return 0.0;
        }
        let mut p = self.params.base_departure_rate;
        if self.params.price_elasticity {
            p = (p * (1.0 + 0.2 * (self.price_ratio() - 1.0))).min(self.params.max_departure_probability);
        }
        p.clamp(0.0, 1.0)
    }

    fn price_ratio(&self) -> f64 {
        if self.lot.base_price > 0.0 {
            self.state.current_price / self.lot.base_price
        } else {
            1.0
        }
    }

    /// Advance the lot by one tick.
    ///
    /// `routed_in` vehicles redirected from peers are processed before the
    /// stochastic draws so they see this tick's capacity first.
    pub fn tick(&mut self, traffic_level: f64, routed_in: u32) -> TickReport {
        let mut report = TickReport {
            routed_in,
            ..TickReport::default()
        };
        self.state.external_traffic_level = if traffic_level.is_finite() {
            traffic_level.clamp(0.0, 1.0)
        } else {
            0.5
        };

        for _ in 0..routed_in {
            self.arrive(&mut report);
        }

        let p_arrival = self.arrival_probability();
        for _ in 0..self.params.arrival_slots {
            if !self.rng.gen_bool(p_arrival) {
                continue;
            }
            if self.pending_diversions > 0 {
                self.pending_diversions -= 1;
                report.diverted += 1;
                continue;
            }
            self.arrive(&mut report);
        }

        let p_departure = self.departure_probability();
        let leaving = (0..self.state.current_occupancy)
            .filter(|_| self.rng.gen_bool(p_departure))
            .count() as u32;
        for _ in 0..leaving {
            self.depart(&mut report);
        }

        if self.state.gate_state == GateState::Open {
            while self.state.queue_length > 0 && !self.state.is_full() {
                self.admit_from_queue(&mut report);
            }
        }

        if self.state.queue_length > 0 && self.rng.gen_bool(self.params.queue_abandon_probability) {
            let gave_up = self
                .rng
                .up_to(self.params.queue_abandon_max.min(self.state.queue_length));
            self.state.queue_length -= gave_up;
            self.state.rejected_count += gave_up as u64;
            report.abandoned = gave_up;
        }

        debug!(
            lot = %self.lot.id,
            occupancy = self.state.current_occupancy,
            capacity = self.state.total_capacity,
            queue = self.state.queue_length,
            price = self.state.current_price,
            arrivals = report.arrivals,
            departures = report.departures,
            rejected = report.rejected,
            "tick"
        );
        report
    }

    fn arrive(&mut self, report: &mut TickReport) {
        report.arrivals += 1;
        match self.state.gate_state {
            GateState::Open if !self.state.is_full() => {
                self.state.current_occupancy += 1;
                self.state.revenue += self.state.current_price;
                report.admitted += 1;
            }
            GateState::Open => {
                self.state.rejected_count += 1;
                report.rejected += 1;
            }
            GateState::Closed if self.state.queue_length < self.params.max_queue => {
                self.state.queue_length += 1;
                report.queued += 1;
            }
            GateState::Closed => {
                self.state.rejected_count += 1;
                report.rejected += 1;
            }
        }
    }

    fn depart(&mut self, report: &mut TickReport) {
        if self.state.current_occupancy == 0 {
            return;
        }
        self.state.current_occupancy -= 1;
        report.departures += 1;
        if self.state.queue_length > 0 {
            self.admit_from_queue(report);
        }
    }

    fn admit_from_queue(&mut self, report: &mut TickReport) {
        self.state.queue_length -= 1;
        self.state.current_occupancy += 1;
        self.state.revenue += self.state.current_price;
        report.admitted += 1;
    }

    /// Apply a decoded action to this lot's effectors.
    ///
    /// Prices are clamped into the lot's band. Redirection does not touch
    /// this lot's counters; the fleet moves the demand.
    pub fn apply_action(&mut self, action: &Action) -> CommandOutcome {
        let before = self.state.clone();
        match action {
            Action::IncreasePrice { new_price } | Action::DecreasePrice { new_price } => {
                self.state.current_price = self.lot.clamp_price(*new_price);
            }
            Action::CloseGate => self.state.gate_state = GateState::Closed,
            Action::OpenGate => self.state.gate_state = GateState::Open,
            Action::RedirectVehicles { .. } | Action::NoOp => {}
        }
        if self.state == before {
            CommandOutcome::Unchanged
        } else {
            CommandOutcome::Changed
        }
    }

    /// Apply a command received in wire form.
    ///
    /// Unknown or malformed commands are logged and ignored.
    pub fn apply_command(&mut self, command: &ControlCommand) -> CommandOutcome {
        if command.lot_id != self.lot.id {
            warn!(lot = %self.lot.id, target = %command.lot_id, "command addressed to another lot ignored");
            return CommandOutcome::Ignored;
        }
        match command.decode() {
            Ok(action) => self.apply_action(&action),
            Err(e) => {
                warn!(lot = %self.lot.id, action = %command.action, error = %e, "malformed command treated as no-op");
                CommandOutcome::Ignored
            }
        }
    }
}
