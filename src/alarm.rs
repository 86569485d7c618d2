// File: src/alarm.rs
// Alarm records as delivered by the alarm source.
//
// An EDS point object is decoded once into an immutable `AlarmRecord`; every
// later stage (evaluation, formatting, the web API) only reads it.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use tracing::warn;

/// Fallback shown when an alarm has no point name
pub const UNKNOWN_POINT: &str = "Unknown";
/// Fallback shown when an alarm has no description
pub const NO_DESCRIPTION: &str = "No description";
/// Fallback shown when an alarm has no value
pub const UNKNOWN_VALUE: &str = "Unknown";
/// Fallback shown when an alarm has no source
pub const UNKNOWN_SOURCE: &str = "Unknown";

// ==========================================
// SECTION 1: ALARM IDENTIFIERS
// ==========================================

/// Opaque alarm identifier (the EDS `sid`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AlarmId {
    /// Numeric system id
    Int(i64),
    /// Any other textual id
    Text(String),
}

impl AlarmId {
    /// Decode an identifier from a JSON scalar. Null, empty strings and
    /// non-scalar values carry no identity.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            // Non-integral or out of range numbers keep their textual form
            JsonValue::Number(n) => Some(
                n.as_i64()
                    .map(AlarmId::Int)
                    .unwrap_or_else(|| AlarmId::Text(n.to_string())),
            ),
            JsonValue::String(s) if !s.trim().is_empty() => Some(AlarmId::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmId::Int(id) => write!(f, "{}", id),
            AlarmId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for AlarmId {
    fn from(id: i64) -> Self {
        AlarmId::Int(id)
    }
}

impl From<&str> for AlarmId {
    fn from(id: &str) -> Self {
        AlarmId::Text(id.to_string())
    }
}

// ==========================================
// SECTION 2: ALARM RECORD
// ==========================================

/// One alarm fetched from the alarm source
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlarmRecord {
    /// Identifier used for deduplication; `None` means always eligible
    pub id: Option<AlarmId>,

    /// Ascending-urgency priority (1 is most urgent)
    pub priority: Option<i64>,

    /// When the alarm was raised
    pub timestamp: Option<DateTime<Utc>>,

    /// Point name (`iess`)
    pub point_name: Option<String>,

    /// Human readable description (`desc`)
    pub description: Option<String>,

    /// Process value rendered as text
    pub value: Option<String>,

    /// Originating zone / source (`zd`)
    pub source: Option<String>,

    /// Free-form auxiliary data, may carry `contact:<number>;`
    pub aux: Option<String>,

    /// Signal quality as reported by EDS
    pub quality: Option<String>,
}

impl AlarmRecord {
    /// Decode an EDS point object.
    ///
    /// Returns `None` only when the point is not a JSON object. Individual
    /// malformed fields are dropped so the record degrades to its fallbacks.
    pub fn from_point(point: &JsonValue) -> Option<Self> {
        let fields = match point.as_object() {
            Some(fields) => fields,
            None => {
                warn!("Skipping alarm point that is not an object: {}", point);
                return None;
            }
        };

        Some(Self {
            id: fields.get("sid").and_then(AlarmId::from_json),
            priority: fields.get("ap").and_then(coerce_priority),
            timestamp: fields.get("ts").and_then(coerce_timestamp),
            point_name: fields.get("iess").and_then(scalar_text),
            description: fields.get("desc").and_then(scalar_text),
            value: fields.get("value").and_then(scalar_text),
            source: fields.get("zd").and_then(scalar_text),
            aux: fields.get("aux").and_then(scalar_text),
            quality: fields.get("quality").and_then(scalar_text),
        })
    }

    /// Decode a list of EDS points, skipping anything that is not an object
    pub fn from_points(points: &[JsonValue]) -> Vec<Self> {
        points.iter().filter_map(Self::from_point).collect()
    }

    /// Point name or its fallback literal
    pub fn point_name_or_default(&self) -> &str {
        self.point_name.as_deref().unwrap_or(UNKNOWN_POINT)
    }

    /// Description or its fallback literal
    pub fn description_or_default(&self) -> &str {
        self.description.as_deref().unwrap_or(NO_DESCRIPTION)
    }

    /// Value or its fallback literal
    pub fn value_or_default(&self) -> &str {
        self.value.as_deref().unwrap_or(UNKNOWN_VALUE)
    }

    /// Source or its fallback literal
    pub fn source_or_default(&self) -> &str {
        self.source.as_deref().unwrap_or(UNKNOWN_SOURCE)
    }
}

// ==========================================
// SECTION 3: FIELD COERCION
// ==========================================

/// Coerce a JSON priority into an integer.
///
/// Accepts integers, finite floats and numeric strings; fractional values
/// truncate toward zero, so `1.5` ranks as priority 1. Everything else
/// (text, booleans, null) yields `None`.
pub fn coerce_priority(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate)),
        JsonValue::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate))
        }
        _ => None,
    }
}

fn truncate(value: f64) -> Option<i64> {
    value.is_finite().then(|| value.trunc() as i64)
}

/// EDS timestamps are unix seconds; zero means "not set"
fn coerce_timestamp(value: &JsonValue) -> Option<DateTime<Utc>> {
    let secs = match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        JsonValue::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if secs == 0 {
        return None;
    }
    Utc.timestamp_opt(secs, 0).single()
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_full_point() {
        let point = json!({
            "sid": 42,
            "ap": 1,
            "ts": 1_700_000_000,
            "iess": "PUMP01.STATUS",
            "desc": "Pump tripped",
            "value": 0.5,
            "zd": "NORTH",
            "aux": "contact:+6421000000;",
            "quality": "GOOD"
        });

        let alarm = AlarmRecord::from_point(&point).unwrap();
        assert_eq!(alarm.id, Some(AlarmId::Int(42)));
        assert_eq!(alarm.priority, Some(1));
        assert_eq!(alarm.timestamp.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(alarm.point_name_or_default(), "PUMP01.STATUS");
        assert_eq!(alarm.value_or_default(), "0.5");
        assert_eq!(alarm.source_or_default(), "NORTH");
        assert_eq!(alarm.quality.as_deref(), Some("GOOD"));
    }

    #[test]
    fn test_missing_fields_use_fallbacks() {
        let alarm = AlarmRecord::from_point(&json!({})).unwrap();
        assert_eq!(alarm.id, None);
        assert_eq!(alarm.priority, None);
        assert_eq!(alarm.timestamp, None);
        assert_eq!(alarm.point_name_or_default(), "Unknown");
        assert_eq!(alarm.description_or_default(), "No description");
        assert_eq!(alarm.value_or_default(), "Unknown");
        assert_eq!(alarm.source_or_default(), "Unknown");
    }

    #[test]
    fn test_non_object_points_are_skipped() {
        let points = vec![json!(1), json!({"sid": 3}), json!("bad")];
        let alarms = AlarmRecord::from_points(&points);
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].id, Some(AlarmId::Int(3)));
    }

    #[test]
    fn test_priority_coercion() {
        assert_eq!(coerce_priority(&json!(2)), Some(2));
        assert_eq!(coerce_priority(&json!(2.0)), Some(2));
        assert_eq!(coerce_priority(&json!("3")), Some(3));
        assert_eq!(coerce_priority(&json!(" 1 ")), Some(1));
        assert_eq!(coerce_priority(&json!(1.5)), Some(1));
        assert_eq!(coerce_priority(&json!("1.5")), Some(1));
        assert_eq!(coerce_priority(&json!(2.9)), Some(2));
        assert_eq!(coerce_priority(&json!("NaN")), None);
        assert_eq!(coerce_priority(&json!("high")), None);
        assert_eq!(coerce_priority(&json!(null)), None);
        assert_eq!(coerce_priority(&json!(true)), None);
    }

    #[test]
    fn test_fractional_priority_is_kept() {
        let alarm = AlarmRecord::from_point(&json!({"sid": 1, "ap": 1.5})).unwrap();
        assert_eq!(alarm.priority, Some(1));

        let alarm = AlarmRecord::from_point(&json!({"sid": 2, "ap": "1.5"})).unwrap();
        assert_eq!(alarm.priority, Some(1));
    }

    #[test]
    fn test_zero_timestamp_is_absent() {
        let alarm = AlarmRecord::from_point(&json!({"sid": 1, "ts": 0})).unwrap();
        assert_eq!(alarm.timestamp, None);
    }

    #[test]
    fn test_text_ids() {
        assert_eq!(AlarmId::from_json(&json!("A-7")), Some(AlarmId::from("A-7")));
        assert_eq!(AlarmId::from_json(&json!("  ")), None);
        assert_eq!(AlarmId::from_json(&json!(null)), None);
        assert_eq!(AlarmId::Int(7).to_string(), "7");
    }
}
