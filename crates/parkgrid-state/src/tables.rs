//! redb table definitions.
//!
//! `&str` keys, `&[u8]` JSON values. Per-lot tables are keyed
//! `{lot_id}:{epoch_millis:020}` so a lot's rows are contiguous and sorted
//! by time.

use redb::TableDefinition;

/// `SensorReading` rows keyed by `{lot_id}:{epoch_millis}`.
pub const SENSOR_DATA: TableDefinition<&str, &[u8]> = TableDefinition::new("parking_sensor_data");

/// `DecisionRecord` rows keyed by `{lot_id}:{epoch_millis}`.
pub const ADAPTATION_DECISIONS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("adaptation_decisions");

/// `SystemMetrics` rows keyed by `{epoch_millis}`.
pub const SYSTEM_METRICS: TableDefinition<&str, &[u8]> = TableDefinition::new("system_metrics");
