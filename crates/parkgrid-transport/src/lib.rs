//! parkgrid-transport — publish/subscribe boundary of the control loop.
//!
//! Topics follow the MQTT layout used by the lots and the manager
//! (`parking/lot/{lot_id}/sensors`, `parking/lot/{lot_id}/control`,
//! `parking/system/...`). The [`Transport`] trait is the seam the
//! dispatcher publishes through; [`Broker`] is the in-process
//! implementation that fans payloads out to filtered subscriptions.

pub mod broker;
pub mod error;
pub mod topics;

pub use broker::{Broker, Message, Subscription};
pub use error::TransportError;

use serde::Serialize;

/// Outbound side of the pub/sub boundary.
///
/// `publish` must not block: implementations hand the payload off and
/// return. Delivery retries are the caller's concern.
pub trait Transport: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;
}

/// Serialize `value` as JSON and publish it.
pub fn publish_json<T: Serialize + ?Sized>(
    transport: &dyn Transport,
    topic: &str,
    value: &T,
) -> Result<(), TransportError> {
    let payload = serde_json::to_vec(value)?;
    transport.publish(topic, payload)
}
