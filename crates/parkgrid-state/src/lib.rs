//! parkgrid-state — knowledge store for the ParkGrid control loop.
//!
//! Backed by [redb](https://docs.rs/redb). Sensor readings, adaptation
//! decisions and fleet metrics are JSON-serialized into `&[u8]` value
//! columns under time-ordered keys (`{lot_id}:{epoch_millis}`), so history
//! queries are range scans over a lot's prefix.
//!
//! `KnowledgeStore` is `Clone + Send + Sync` (an `Arc<Database>`) and is
//! shared between the dispatcher worker and any readers.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::{KnowledgeStore, Trend};
