//! parkgrid-control — the Monitor → Analyze → Plan → Execute loop.
//!
//! The [`Coordinator`] owns every lot's simulator (through a [`Fleet`]),
//! the [`CooldownTracker`] and the config, and drives one tick at a time:
//! ingest readings, analyze and plan per lot against an immutable
//! snapshot array, apply redirects then other actions, advance the
//! simulators, and queue readings, decisions and metrics on the
//! [`Outbox`]. A separate [`Dispatcher`] task drains the outbox into the
//! knowledge store and the transport so I/O never stalls a tick.

pub mod analyzer;
pub mod clock;
pub mod cooldown;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod fleet;
pub mod outbox;
pub mod planner;

pub use analyzer::Analyzer;
pub use clock::{Clock, ManualClock, SystemClock};
pub use cooldown::CooldownTracker;
pub use coordinator::{Coordinator, Phase, TickSummary};
pub use dispatch::{DispatchStats, Dispatcher, KnowledgeSink, RetryPolicy};
pub use error::ControlError;
pub use executor::Executor;
pub use fleet::Fleet;
pub use outbox::{outbox, Outbound, Outbox, OutboxReceiver};
pub use planner::Planner;
