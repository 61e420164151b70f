//! KnowledgeStore — redb-backed history of the control loop.
//!
//! Append-only from the loop's point of view: the dispatcher writes
//! readings, decisions and fleet metrics; queries read time ranges back.
//! Supports on-disk and in-memory backends (the latter for tests).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parkgrid_core::{time_key, DecisionRecord, SensorReading, SystemMetrics};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Mean per-minute change of occupancy percentage beyond which a lot is
/// considered to be filling or emptying.
const TREND_THRESHOLD: f64 = 0.5;

/// Direction of a lot's occupancy over a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Increasing => "increasing",
            Trend::Decreasing => "decreasing",
            Trend::Stable => "stable",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thread-safe knowledge store backed by redb.
#[derive(Clone)]
pub struct KnowledgeStore {
    db: Arc<Database>,
}

impl KnowledgeStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "knowledge store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory knowledge store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SENSOR_DATA).map_err(map_err!(Table))?;
        txn.open_table(ADAPTATION_DECISIONS).map_err(map_err!(Table))?;
        txn.open_table(SYSTEM_METRICS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn put<T: Serialize>(&self, table: Table, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            t.insert(key, bytes.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Rows with `start <= key < end`, oldest first.
    fn scan<T: DeserializeOwned>(&self, table: Table, start: &str, end: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in t.range(start..end).map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(results)
    }

    /// Up to `limit` rows with `start <= key < end`, newest first.
    fn scan_newest<T: DeserializeOwned>(
        &self,
        table: Table,
        start: &str,
        end: &str,
        limit: usize,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in t.range(start..end).map_err(map_err!(Read))?.rev().take(limit) {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(results)
    }

    // ── Sensor data ────────────────────────────────────────────────

    pub fn put_reading(&self, reading: &SensorReading) -> StateResult<()> {
        let key = reading.table_key();
        self.put(SENSOR_DATA, &key, reading)?;
        debug!(%key, "reading stored");
        Ok(())
    }

    /// Most recent reading for a lot.
    pub fn latest_reading(&self, lot_id: &str) -> StateResult<Option<SensorReading>> {
        let (start, end) = lot_bounds(lot_id);
        Ok(self
            .scan_newest(SENSOR_DATA, &start, &end, 1)?
            .into_iter()
            .next())
    }

    /// Readings for a lot at or after `since`, oldest first.
    pub fn readings_since(&self, lot_id: &str, since: DateTime<Utc>) -> StateResult<Vec<SensorReading>> {
        let (_, end) = lot_bounds(lot_id);
        self.scan(SENSOR_DATA, &time_key(lot_id, since), &end)
    }

    /// Mean occupancy percentage since `since`; 0 when there is no data.
    pub fn average_occupancy(&self, lot_id: &str, since: DateTime<Utc>) -> StateResult<f64> {
        let readings = self.readings_since(lot_id, since)?;
        if readings.is_empty() {
            return Ok(0.0);
        }
        let sum: f64 = readings.iter().map(|r| r.occupancy_percentage).sum();
        Ok(sum / readings.len() as f64)
    }

    /// Occupancy direction since `since`, from the mean per-minute change
    /// between consecutive readings.
    pub fn occupancy_trend(&self, lot_id: &str, since: DateTime<Utc>) -> StateResult<Trend> {
        let readings = self.readings_since(lot_id, since)?;
        let rates: Vec<f64> = readings
            .windows(2)
            .filter_map(|pair| {
                let minutes = (pair[1].timestamp - pair[0].timestamp).num_milliseconds() as f64 / 60_000.0;
                (minutes > 0.0)
                    .then(|| (pair[1].occupancy_percentage - pair[0].occupancy_percentage) / minutes)
            })
            .collect();
        if rates.is_empty() {
            return Ok(Trend::Stable);
        }
        let mean = rates.iter().sum::<f64>() / rates.len() as f64;
        Ok(if mean > TREND_THRESHOLD {
            Trend::Increasing
        } else if mean < -TREND_THRESHOLD {
            Trend::Decreasing
        } else {
            Trend::Stable
        })
    }

    // ── Decisions ──────────────────────────────────────────────────

    pub fn put_decision(&self, record: &DecisionRecord) -> StateResult<()> {
        let key = record.table_key();
        self.put(ADAPTATION_DECISIONS, &key, record)?;
        debug!(%key, action = %record.action, "decision stored");
        Ok(())
    }

    /// Up to `limit` decisions for a lot, newest first.
    pub fn recent_decisions(&self, lot_id: &str, limit: usize) -> StateResult<Vec<DecisionRecord>> {
        let (start, end) = lot_bounds(lot_id);
        self.scan_newest(ADAPTATION_DECISIONS, &start, &end, limit)
    }

    /// Decisions across all lots at or after `since`, oldest first.
    pub fn decisions_since(&self, since: DateTime<Utc>) -> StateResult<Vec<DecisionRecord>> {
        let mut all: Vec<DecisionRecord> = self.scan(ADAPTATION_DECISIONS, "", "\u{10ffff}")?;
        all.retain(|d| d.timestamp >= since);
        all.sort_by_key(|d| d.timestamp);
        Ok(all)
    }

    // ── System metrics ─────────────────────────────────────────────

    pub fn put_system_metrics(&self, metrics: &SystemMetrics) -> StateResult<()> {
        self.put(SYSTEM_METRICS, &metrics.table_key(), metrics)
    }

    /// Up to `limit` fleet snapshots, newest first.
    pub fn recent_system_metrics(&self, limit: usize) -> StateResult<Vec<SystemMetrics>> {
        self.scan_newest(SYSTEM_METRICS, "", "\u{10ffff}", limit)
    }
}

/// Key range covering every row of one lot. `;` sorts right after `:`,
/// and validated lot ids never contain either.
fn lot_bounds(lot_id: &str) -> (String, String) {
    (format!("{lot_id}:"), format!("{lot_id};"))
}
