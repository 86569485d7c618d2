use super::AppState;
use crate::alarm::{AlarmId, AlarmRecord};
use crate::config::{parse_priority_list, Config};
use crate::dispatch::Delivery;
use crate::error::{RelayError, Result};
use crate::notification::{format_time, priority_label};
use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

const MIN_MINUTES: u64 = 5;
const MAX_MINUTES: u64 = 1440;
const DEFAULT_MINUTES: u64 = 60;
const DEFAULT_PRIORITIES: &[i64] = &[1, 2, 3];

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: crate::VERSION,
        uptime_seconds: state.started.elapsed().as_secs(),
    })
}

pub async fn status(State(state): State<AppState>) -> Json<JsonValue> {
    let eds = match (state.sources)() {
        Ok(mut source) => {
            let connected = source.is_reachable().await;
            json!({
                "status": if connected { "connected" } else { "error" },
                "base_url": source.describe(),
            })
        }
        Err(e) => json!({ "status": "not configured", "error": e.to_string() }),
    };

    let sms = match &state.sender {
        Some(sender) => json!({ "status": "configured", "base_url": sender.describe() }),
        None => json!({ "status": "not configured" }),
    };

    Json(json!({ "eds_api": eds, "sms_api": sms }))
}

#[derive(Debug, Deserialize)]
pub struct AlarmQuery {
    minutes: Option<u64>,
    priority: Option<String>,
}

impl AlarmQuery {
    fn minutes(&self) -> u64 {
        self.minutes
            .unwrap_or(DEFAULT_MINUTES)
            .clamp(MIN_MINUTES, MAX_MINUTES)
    }

    fn priorities(&self) -> Vec<i64> {
        let parsed = self
            .priority
            .as_deref()
            .map(parse_priority_list)
            .unwrap_or_default();
        if parsed.is_empty() {
            DEFAULT_PRIORITIES.to_vec()
        } else {
            parsed
        }
    }
}

/// An alarm as shown to operators
#[derive(Debug, Serialize)]
pub struct AlarmSummary {
    id: Option<AlarmId>,
    priority: Option<i64>,
    priority_label: &'static str,
    time: String,
    point_name: String,
    description: String,
    value: String,
    source: String,
}

impl From<&AlarmRecord> for AlarmSummary {
    fn from(alarm: &AlarmRecord) -> Self {
        Self {
            id: alarm.id.clone(),
            priority: alarm.priority,
            priority_label: priority_label(alarm.priority),
            time: format_time(alarm.timestamp.as_ref()),
            point_name: alarm.point_name_or_default().to_string(),
            description: alarm.description_or_default().to_string(),
            value: alarm.value_or_default().to_string(),
            source: alarm.source_or_default().to_string(),
        }
    }
}

pub async fn recent_alarms(
    State(state): State<AppState>,
    Query(query): Query<AlarmQuery>,
) -> Result<Json<JsonValue>> {
    let minutes = query.minutes();
    let priorities = query.priorities();

    let mut source = (state.sources)()?;
    if let Err(e) = source.open().await {
        source.sign_off().await;
        return Err(e);
    }
    let alarms = source.fetch_recent_alarms(minutes, &priorities).await;
    source.sign_off().await;

    let summaries: Vec<AlarmSummary> = alarms.iter().map(AlarmSummary::from).collect();
    Ok(Json(json!({
        "count": summaries.len(),
        "minutes": minutes,
        "priorities": priorities,
        "alarms": summaries,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    send_sms: bool,
}

/// Run one cycle on demand. An empty body is a dry run.
pub async fn check_alarms(State(state): State<AppState>, body: Bytes) -> Result<Json<JsonValue>> {
    let request: CheckRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CheckRequest::default()
    } else {
        serde_json::from_slice(&body)?
    };

    let delivery = if request.send_sms {
        match &state.sender {
            Some(sender) => Delivery::Send(sender.as_ref()),
            None => {
                warn!("Manual check requested SMS delivery without a configured gateway");
                return Err(RelayError::Config("SMS gateway not configured".into()));
            }
        }
    } else {
        Delivery::DryRun
    };

    info!("Manual alarm check triggered (send_sms={})", request.send_sms);
    let mut source = (state.sources)()?;
    let report = state.dispatcher.run_cycle(source.as_mut(), delivery).await;

    let sms_sent = if report.dry_run {
        json!("Disabled")
    } else {
        json!(report.sms_sent)
    };

    Ok(Json(json!({
        "success": true,
        "alarms_processed": report.alarms_fetched,
        "notifications_generated": report.notifications_generated,
        "sms_sent": sms_sent,
    })))
}

pub async fn config(State(state): State<AppState>) -> Json<Config> {
    Json(state.config.redacted())
}
