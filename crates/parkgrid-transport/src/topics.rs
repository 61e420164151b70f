//! Topic names and MQTT-style filter matching.

/// Fleet-wide metrics published once per tick.
pub const SYSTEM_METRICS: &str = "parking/system/metrics";

/// Every non-NO_OP command, for observers.
pub const ADAPTATIONS: &str = "parking/system/adaptations";

/// Filter matching every lot's sensor topic.
pub const ALL_SENSORS: &str = "parking/lot/+/sensors";

/// Filter matching every lot's control topic.
pub const ALL_CONTROL: &str = "parking/lot/+/control";

pub fn sensor_topic(lot_id: &str) -> String {
    format!("parking/lot/{lot_id}/sensors")
}

pub fn control_topic(lot_id: &str) -> String {
    format!("parking/lot/{lot_id}/control")
}

/// Lot id embedded in a `parking/lot/{lot_id}/...` topic.
pub fn lot_of(topic: &str) -> Option<&str> {
    let mut levels = topic.split('/');
    match (levels.next(), levels.next(), levels.next()) {
        (Some("parking"), Some("lot"), Some(id)) if !id.is_empty() => Some(id),
        _ => None,
    }
}

/// Whether a concrete topic matches a subscription filter.
///
/// `+` matches exactly one level, `#` (last level only) matches the
/// remaining levels including none.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut f = filter.split('/');
    let mut t = topic.split('/');
    loop {
        match (f.next(), t.next()) {
            (Some("#"), _) => return f.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(a), Some(b)) if a == b => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// A filter is valid when `#` only appears as the whole last level and
/// `+` only as a whole level.
pub fn is_valid_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }
    let levels: Vec<&str> = filter.split('/').collect();
    levels.iter().enumerate().all(|(i, level)| match *level {
        "#" => i == levels.len() - 1,
        "+" => true,
        other => !other.contains('#') && !other.contains('+'),
    })
}
