// src/eds.rs
// Client for the EDS alarm-management REST API.
//
// EDS hands out a session id at login which is then sent as a bearer token.
// Sessions are a scarce server resource, so every cycle that logs in also
// logs out (see `AlarmSource::sign_off`).

use crate::alarm::{AlarmId, AlarmRecord};
use crate::config::EdsConfig;
use crate::error::{RelayError, Result};
use crate::source::{AlarmSource, SourceFactory};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Fields requested for alarm queries
const ALARM_FIELDS: &[&str] = &[
    "sid", "iess", "desc", "value", "ts", "ap", "quality", "aux", "zd",
];

/// Fields requested for a single point lookup
const DETAIL_FIELDS: &[&str] = &[
    "sid", "iess", "desc", "value", "ts", "ap", "quality", "aux", "idcs", "zd", "un", "dp", "artd",
    "ard",
];

/// Priorities queried when the caller passes none
const DEFAULT_PRIORITIES: &[i64] = &[1, 2];

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    #[serde(rename = "type")]
    client_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PointsResponse {
    #[serde(default)]
    points: Vec<JsonValue>,
}

pub struct EdsClient {
    base_url: String,
    username: String,
    password: String,
    client_type: String,
    client: Client,
    session_id: Option<String>,
}

impl EdsClient {
    pub fn new(config: &EdsConfig) -> Result<Self> {
        let (base_url, username, password) = match (
            config.base_url.as_deref(),
            config.username.as_deref(),
            config.password.as_deref(),
        ) {
            (Some(url), Some(user), Some(pass))
                if !url.is_empty() && !user.is_empty() && !pass.is_empty() =>
            {
                (url, user, pass)
            }
            _ => {
                return Err(RelayError::Config(
                    "EDS API credentials not configured".into(),
                ))
            }
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            client_type: config.client_type.clone(),
            client,
            session_id: None,
        })
    }

    /// Factory producing a new client per cycle
    pub fn factory(config: EdsConfig) -> SourceFactory {
        Arc::new(move || {
            let client = EdsClient::new(&config)?;
            Ok(Box::new(client) as Box<dyn AlarmSource>)
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    fn session(&self) -> Result<&str> {
        self.session_id
            .as_deref()
            .ok_or_else(|| RelayError::Session("No active EDS session".into()))
    }

    /// Log in and keep the session id for later requests
    pub async fn login(&mut self) -> Result<String> {
        let request = LoginRequest {
            username: &self.username,
            password: &self.password,
            client_type: &self.client_type,
        };

        let response = self
            .client
            .post(self.url("login"))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: LoginResponse = response.json().await?;
        match body.session_id.filter(|id| !id.is_empty()) {
            Some(session_id) => {
                info!("Successfully logged in to EDS API");
                self.session_id = Some(session_id.clone());
                Ok(session_id)
            }
            None => Err(RelayError::Session(
                "Login response did not contain a session ID".into(),
            )),
        }
    }

    /// Log out. Without a session this is a successful no-op.
    ///
    /// The session id is forgotten even when the request fails so the next
    /// cycle starts with a fresh login.
    pub async fn logout(&mut self) -> Result<()> {
        let session = match self.session_id.take() {
            Some(session) => session,
            None => {
                debug!("No active EDS session to log out from");
                return Ok(());
            }
        };

        self.client
            .post(self.url("logout"))
            .bearer_auth(&session)
            .send()
            .await?
            .error_for_status()?;

        info!("Successfully logged out from EDS API");
        Ok(())
    }

    /// Keep the session alive
    pub async fn ping(&self) -> Result<()> {
        let session = self.session()?;
        self.client
            .get(self.url("ping"))
            .bearer_auth(session)
            .send()
            .await?
            .error_for_status()?;
        debug!("Successfully pinged EDS API");
        Ok(())
    }

    /// Active alarms raised in the last `minutes` with one of `priorities`,
    /// ordered by priority then newest first
    pub async fn query_alarms(&self, minutes: u64, priorities: &[i64]) -> Result<Vec<AlarmRecord>> {
        let till = Utc::now();
        let from = i64::try_from(minutes)
            .ok()
            .and_then(ChronoDuration::try_minutes)
            .and_then(|window| till.checked_sub_signed(window))
            .ok_or_else(|| {
                RelayError::Config(format!("Alarm window of {} minutes is out of range", minutes))
            })?;
        let session = self.session()?;
        let priorities = if priorities.is_empty() {
            DEFAULT_PRIORITIES
        } else {
            priorities
        };

        let payload = json!({
            "filters": [{
                "ts": { "from": from.timestamp(), "till": till.timestamp() },
                "ap": priorities,
                "stSet": 1,
                "quality": ["GOOD", "FAIR"]
            }],
            "order": ["ap", "-ts"],
            "fields": ALARM_FIELDS
        });

        let points = self.query_points(session, &payload).await?;
        let alarms = AlarmRecord::from_points(&points);
        info!("Retrieved {} alarms from EDS API", alarms.len());
        Ok(alarms)
    }

    /// Full detail for one point
    pub async fn get_alarm_details(&self, sid: &AlarmId) -> Result<Option<AlarmRecord>> {
        let session = self.session()?;
        let payload = json!({
            "filters": [{ "sid": [sid] }],
            "fields": DETAIL_FIELDS
        });

        let points = self.query_points(session, &payload).await?;
        let detail = points.first().and_then(AlarmRecord::from_point);
        if detail.is_none() {
            warn!("No details found for alarm with sid {}", sid);
        }
        Ok(detail)
    }

    async fn query_points(&self, session: &str, payload: &JsonValue) -> Result<Vec<JsonValue>> {
        let response = self
            .client
            .post(self.url("points/query"))
            .bearer_auth(session)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;

        let body: PointsResponse = response.json().await?;
        Ok(body.points)
    }
}

#[async_trait]
impl AlarmSource for EdsClient {
    async fn fetch_recent_alarms(
        &mut self,
        window_minutes: u64,
        priorities: &[i64],
    ) -> Vec<AlarmRecord> {
        if let Err(e) = self.open().await {
            error!("Error during EDS login: {}", e);
            return Vec::new();
        }

        match self.query_alarms(window_minutes, priorities).await {
            Ok(alarms) => alarms,
            Err(e) => {
                error!("Error querying alarms: {}", e);
                Vec::new()
            }
        }
    }

    async fn open(&mut self) -> Result<()> {
        if self.session_id.is_none() {
            self.login()
                .await
                .map_err(|e| RelayError::Session(format!("Failed to login to EDS API: {}", e)))?;
        }
        Ok(())
    }

    async fn sign_off(&mut self) {
        if let Err(e) = self.logout().await {
            error!("Error during EDS logout: {}", e);
        }
    }

    async fn is_reachable(&mut self) -> bool {
        match self.login().await {
            Ok(_) => {
                self.sign_off().await;
                true
            }
            Err(e) => {
                error!("Error checking EDS API status: {}", e);
                false
            }
        }
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EdsConfig {
        EdsConfig {
            base_url: Some("https://eds.local/".into()),
            username: Some("relay".into()),
            password: Some("secret".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_requires_credentials() {
        let mut incomplete = config();
        incomplete.password = None;
        assert!(matches!(EdsClient::new(&incomplete), Err(RelayError::Config(_))));

        let mut blank = config();
        blank.username = Some(String::new());
        assert!(EdsClient::new(&blank).is_err());
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = EdsClient::new(&config()).unwrap();
        assert_eq!(client.base_url(), "https://eds.local");
        assert_eq!(client.url("login"), "https://eds.local/api/v1/login");
        assert!(client.session_id().is_none());
    }

    #[tokio::test]
    async fn test_queries_need_a_session() {
        let client = EdsClient::new(&config()).unwrap();
        assert!(matches!(
            client.query_alarms(15, &[1]).await,
            Err(RelayError::Session(_))
        ));
        assert!(client.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_window_out_of_range_is_rejected() {
        let client = EdsClient::new(&config()).unwrap();
        assert!(matches!(
            client.query_alarms(u64::MAX, &[1]).await,
            Err(RelayError::Config(_))
        ));
        assert!(matches!(
            client.query_alarms(i64::MAX as u64, &[1]).await,
            Err(RelayError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_without_session_is_ok() {
        let mut client = EdsClient::new(&config()).unwrap();
        client.logout().await.unwrap();
    }
}
