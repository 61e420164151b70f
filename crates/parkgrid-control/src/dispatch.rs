//! Dispatcher — drains the outbox into the knowledge store and transport.
//!
//! Each item goes through two independent steps, persist and publish.
//! A failing step is retried with exponential backoff (double per
//! failure, capped) up to a fixed number of attempts and then dropped
//! with an error log. Steps that already succeeded are not repeated.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parkgrid_state::{KnowledgeStore, StateError};
use parkgrid_transport::{publish_json, topics, Transport, TransportError};
use tracing::{debug, error, info, warn};

use crate::outbox::{Outbound, OutboxReceiver};

/// Persistence seam of the dispatcher.
pub trait KnowledgeSink: Send + Sync {
    fn record(&self, item: &Outbound) -> Result<(), StateError>;
}

impl KnowledgeSink for KnowledgeStore {
    fn record(&self, item: &Outbound) -> Result<(), StateError> {
        match item {
            Outbound::Reading(r) => self.put_reading(r),
            Outbound::Decision(d) => self.put_decision(d),
            Outbound::Metrics(m) => self.put_system_metrics(m),
            // Commands are logged through their decision record.
            Outbound::Command(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

/// Backoff state for one delivery step.
struct Backoff {
    policy: RetryPolicy,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            current: policy.base_delay,
            attempts: 0,
        }
    }

    /// Record a failure; returns the delay before the next attempt, or
    /// `None` once attempts are exhausted.
    fn fail(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        let delay = self.current;
        self.current = (self.current * 2).min(self.policy.max_delay);
        Some(delay)
    }
}

/// Delivery counters, shared with whoever holds a clone.
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub delivered: AtomicU64,
    pub retries: AtomicU64,
    pub dropped: AtomicU64,
}

impl DispatchStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct Dispatcher {
    sink: Arc<dyn KnowledgeSink>,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn KnowledgeSink>, transport: Arc<dyn Transport>) -> Self {
        Self {
            sink,
            transport,
            policy: RetryPolicy::default(),
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// Deliver until every `Outbox` handle is dropped and the queue is empty.
    pub async fn run(self, mut rx: OutboxReceiver) -> Arc<DispatchStats> {
        info!("dispatcher started");
        while let Some(item) = rx.recv().await {
            self.deliver(&item).await;
        }
        info!(
            delivered = self.stats.delivered(),
            retries = self.stats.retries(),
            dropped = self.stats.dropped(),
            "dispatcher drained"
        );
        self.stats
    }

    async fn deliver(&self, item: &Outbound) {
        let persisted = self
            .with_retry(item.kind(), "persist", || self.sink.record(item).map_err(|e| e.to_string()))
            .await;
        let published = self
            .with_retry(item.kind(), "publish", || self.publish(item).map_err(|e| e.to_string()))
            .await;
        if persisted && published {
            self.stats.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn publish(&self, item: &Outbound) -> Result<(), TransportError> {
        let transport = self.transport.as_ref();
        match item {
            Outbound::Reading(r) => publish_json(transport, &topics::sensor_topic(&r.lot_id), r),
            Outbound::Command(c) => {
                publish_json(transport, &topics::control_topic(&c.lot_id), c)?;
                publish_json(transport, topics::ADAPTATIONS, c)
            }
            Outbound::Metrics(m) => publish_json(transport, topics::SYSTEM_METRICS, m),
            Outbound::Decision(_) => Ok(()),
        }
    }

    async fn with_retry<F>(&self, kind: &'static str, step: &'static str, mut attempt: F) -> bool
    where
        F: FnMut() -> Result<(), String>,
    {
        let mut backoff = Backoff::new(self.policy);
        loop {
            match attempt() {
                Ok(()) => return true,
                Err(e) => match backoff.fail() {
                    Some(delay) => {
                        self.stats.retries.fetch_add(1, Ordering::Relaxed);
                        warn!(kind, step, error = %e, delay_ms = delay.as_millis() as u64, "delivery failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        error!(kind, step, error = %e, attempts = backoff.attempts, "delivery failed, dropping");
                        return false;
                    }
                },
            }
            debug!(kind, step, attempt = backoff.attempts + 1, "retrying delivery");
        }
    }
}
