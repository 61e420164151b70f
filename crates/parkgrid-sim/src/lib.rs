//! parkgrid-sim — the sensor stream the control loop reacts to.
//!
//! Each lot gets a [`Simulator`] that owns its `FacilityState` and advances
//! it one tick at a time:
//!
//! ```text
//! tick(traffic_level, routed_in)
//!   ├── routed arrivals (redirected from full peers)
//!   ├── arrival_slots × Bernoulli(base_rate × traffic × price factor)
//!   │     open + room  → admit, revenue += price
//!   │     open + full  → reject
//!   │     closed       → queue (≤ max_queue) or reject
//!   ├── occupancy × Bernoulli(departure rate)
//!   │     each departure admits the queue head
//!   ├── gate open → drain queue into free spaces
//!   └── queue abandonment
//! ```
//!
//! Randomness comes from a per-lot seeded [`LotRng`] so runs are
//! reproducible for a given seed.

pub mod rng;
pub mod simulator;
pub mod traffic;

pub use rng::{LotRng, SimRng};
pub use simulator::{CommandOutcome, Simulator, TickReport};
pub use traffic::{traffic_multiplier, TrafficModel};
