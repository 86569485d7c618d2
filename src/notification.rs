//! Notification records and the SMS message template.

use crate::alarm::{AlarmId, AlarmRecord};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;

/// Time line value used when an alarm carries no timestamp
pub const UNKNOWN_TIME: &str = "Unknown time";

/// One decided outbound SMS
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRecord {
    /// Destination number
    pub recipient: String,
    /// Formatted message body
    pub message: String,
    /// Originating alarm
    pub alarm_id: Option<AlarmId>,
    pub priority: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Set only when the recipient came from the configured contact list
    pub contact_name: Option<String>,
}

/// Map a numeric priority onto its label
pub fn priority_label(priority: Option<i64>) -> &'static str {
    match priority {
        Some(1) => "HIGH",
        Some(2) => "MEDIUM",
        Some(3) => "LOW",
        _ => "UNKNOWN",
    }
}

/// `YYYY-MM-DD HH:MM:SS` in local time, or [`UNKNOWN_TIME`]
pub fn format_time(timestamp: Option<&DateTime<Utc>>) -> String {
    match timestamp {
        Some(ts) => ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => UNKNOWN_TIME.to_string(),
    }
}

/// Render the SMS body for an alarm.
///
/// ```text
/// ALARM NOTIFICATION
/// Priority: HIGH
/// Time: 2024-01-01 12:00:00
/// Point: PUMP01.STATUS
/// Description: Pump tripped
/// Value: 0
/// Source: NORTH
/// ID: 42
/// ```
pub fn format_message(alarm: &AlarmRecord) -> String {
    let id = alarm
        .id
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "Unknown".to_string());

    format!(
        "ALARM NOTIFICATION\n\
         Priority: {}\n\
         Time: {}\n\
         Point: {}\n\
         Description: {}\n\
         Value: {}\n\
         Source: {}\n\
         ID: {}",
        priority_label(alarm.priority),
        format_time(alarm.timestamp.as_ref()),
        alarm.point_name_or_default(),
        alarm.description_or_default(),
        alarm.value_or_default(),
        alarm.source_or_default(),
        id,
    )
}
