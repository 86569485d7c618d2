// src/config.rs - Relay configuration: YAML file plus environment overrides

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Replacement shown for secrets in redacted output
pub const MASK: &str = "********";

/// Longest look-back a poll may request (one day)
pub const MAX_WINDOW_MINUTES: u64 = 1440;

/// Longest dedup retention (one year)
pub const MAX_DEDUP_TTL_MINUTES: u64 = 525_600;

// ============================================================================
// MAIN CONFIGURATION
// ============================================================================

/// Main relay configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Alarm source (EDS API) connection
    #[serde(default)]
    pub eds: EdsConfig,

    /// SMS provider selection and credentials
    #[serde(default)]
    pub sms: SmsConfig,

    /// Alarm evaluation and polling settings
    #[serde(default)]
    pub alarms: AlarmsConfig,

    /// Notification contact list
    #[serde(default)]
    pub contacts: Vec<Contact>,

    /// Operator web API
    #[serde(default)]
    pub web: WebConfig,
}

// ============================================================================
// EDS CONFIGURATION
// ============================================================================

/// EDS alarm-management API connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdsConfig {
    /// Base URL, e.g. `https://eds.example.net`
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Client type reported at login
    #[serde(default = "default_client_type")]
    pub client_type: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for EdsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            username: None,
            password: None,
            client_type: default_client_type(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl EdsConfig {
    /// Base URL, username and password are all present
    pub fn is_configured(&self) -> bool {
        [&self.base_url, &self.username, &self.password]
            .iter()
            .all(|v| v.as_deref().map_or(false, |s| !s.is_empty()))
    }
}

// ============================================================================
// SMS CONFIGURATION
// ============================================================================

/// Which SMS gateway delivers notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsProvider {
    Tnz,
    Twilio,
}

impl Default for SmsProvider {
    fn default() -> Self {
        SmsProvider::Tnz
    }
}

impl std::str::FromStr for SmsProvider {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tnz" => Ok(SmsProvider::Tnz),
            "twilio" => Ok(SmsProvider::Twilio),
            other => Err(RelayError::Config(format!("Unknown SMS provider '{}'", other))),
        }
    }
}

/// SMS delivery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsConfig {
    #[serde(default)]
    pub provider: SmsProvider,

    #[serde(default)]
    pub tnz: TnzConfig,

    #[serde(default)]
    pub twilio: TwilioConfig,

    /// Per-request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            provider: SmsProvider::default(),
            tnz: TnzConfig::default(),
            twilio: TwilioConfig::default(),
            timeout_secs: default_http_timeout(),
        }
    }
}

/// TNZ SMS API credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TnzConfig {
    #[serde(default = "default_tnz_base_url")]
    pub base_url: String,

    /// Sent verbatim as `Authorization: Basic <api_key>`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Optional sender id shown to recipients
    #[serde(default)]
    pub sender_id: Option<String>,
}

impl Default for TnzConfig {
    fn default() -> Self {
        Self {
            base_url: default_tnz_base_url(),
            api_key: None,
            sender_id: None,
        }
    }
}

/// Twilio SMS credentials
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: Option<String>,

    #[serde(default)]
    pub auth_token: Option<String>,

    /// Sending number (E.164 format)
    #[serde(default)]
    pub from_number: Option<String>,
}

// ============================================================================
// ALARM CONFIGURATION
// ============================================================================

/// Alarm evaluation and polling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmsConfig {
    /// Highest priority number that still notifies (1 = most urgent)
    #[serde(default = "default_priority_threshold")]
    pub priority_threshold: i64,

    /// How far back each poll looks, in minutes
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u64,

    /// Priorities requested from the alarm source
    #[serde(default = "default_priority_filter")]
    pub priority_filter: Vec<i64>,

    /// How long a notified alarm id is remembered; `null` keeps ids forever
    #[serde(default = "default_dedup_ttl_minutes")]
    pub dedup_ttl_minutes: Option<u64>,

    /// Scheduler period in seconds
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    /// Maximum SMS sends in flight per cycle
    #[serde(default = "default_send_concurrency")]
    pub send_concurrency: usize,
}

impl Default for AlarmsConfig {
    fn default() -> Self {
        Self {
            priority_threshold: default_priority_threshold(),
            window_minutes: default_window_minutes(),
            priority_filter: default_priority_filter(),
            dedup_ttl_minutes: default_dedup_ttl_minutes(),
            poll_interval_seconds: default_poll_interval_seconds(),
            send_concurrency: default_send_concurrency(),
        }
    }
}

/// Notification destination
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub number: Option<String>,
}

impl Contact {
    pub fn new(name: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            number: Some(number.into()),
        }
    }

    /// Trimmed number, `None` when missing or blank
    pub fn number(&self) -> Option<&str> {
        self.number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }

    pub fn has_number(&self) -> bool {
        self.number().is_some()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

// ============================================================================
// WEB CONFIGURATION
// ============================================================================

/// Operator web API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind_address: default_bind_address(),
        }
    }
}

// ============================================================================
// EVALUATION SNAPSHOT
// ============================================================================

/// Immutable per-cycle view of the settings the core decides with
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmSettings {
    pub priority_threshold: i64,
    pub window_minutes: u64,
    pub priority_filter: Vec<i64>,
    pub contacts: Vec<Contact>,
    pub dedup_ttl: Option<Duration>,
    pub send_concurrency: usize,
}

impl Default for AlarmSettings {
    fn default() -> Self {
        Config::default().settings()
    }
}

// ============================================================================
// LOADING
// ============================================================================

impl Config {
    /// Load a YAML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse YAML configuration text
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Defaults overlaid with the process environment
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Optional YAML file, then environment overrides, then validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay values found through `lookup` (normally `std::env::var`).
    ///
    /// Malformed numbers keep the current value; a malformed `CONTACT_LIST`
    /// clears the contact list.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = text("EDS_API_BASE_URL") {
            self.eds.base_url = Some(v);
        }
        if let Some(v) = text("EDS_API_USERNAME") {
            self.eds.username = Some(v);
        }
        if let Some(v) = text("EDS_API_PASSWORD") {
            self.eds.password = Some(v);
        }
        if let Some(v) = text("EDS_API_CLIENT_TYPE") {
            self.eds.client_type = v;
        }

        if let Some(v) = text("SMS_PROVIDER") {
            match v.parse() {
                Ok(provider) => self.sms.provider = provider,
                Err(e) => warn!("Ignoring SMS_PROVIDER: {}", e),
            }
        }
        if let Some(v) = text("TNZ_API_BASE_URL") {
            self.sms.tnz.base_url = v;
        }
        if let Some(v) = text("TNZ_API_KEY") {
            self.sms.tnz.api_key = Some(v);
        }
        if let Some(v) = text("TNZ_SENDER_ID") {
            self.sms.tnz.sender_id = Some(v);
        }
        if let Some(v) = text("TWILIO_ACCOUNT_SID") {
            self.sms.twilio.account_sid = Some(v);
        }
        if let Some(v) = text("TWILIO_AUTH_TOKEN") {
            self.sms.twilio.auth_token = Some(v);
        }
        if let Some(v) = text("TWILIO_FROM_NUMBER") {
            self.sms.twilio.from_number = Some(v);
        }

        override_number(&text, "ALARM_NOTIFICATION_THRESHOLD", &mut self.alarms.priority_threshold);
        override_number(&text, "LAST_RUN_MINUTES", &mut self.alarms.window_minutes);
        override_number(&text, "POLL_INTERVAL_SECONDS", &mut self.alarms.poll_interval_seconds);
        override_number(&text, "SMS_SEND_CONCURRENCY", &mut self.alarms.send_concurrency);

        if let Some(v) = text("DEDUP_TTL_MINUTES") {
            match v.trim().parse::<u64>() {
                Ok(0) => self.alarms.dedup_ttl_minutes = None,
                Ok(minutes) => self.alarms.dedup_ttl_minutes = Some(minutes),
                Err(_) => warn!("Ignoring DEDUP_TTL_MINUTES: '{}' is not a number", v),
            }
        }
        if let Some(v) = text("ALARM_PRIORITY_FILTER") {
            let filter = parse_priority_list(&v);
            if filter.is_empty() {
                warn!("Ignoring ALARM_PRIORITY_FILTER: no priorities in '{}'", v);
            } else {
                self.alarms.priority_filter = filter;
            }
        }

        if let Some(v) = lookup("CONTACT_LIST") {
            self.contacts = parse_contact_list(&v);
        }

        if let Some(v) = text("WEB_BIND_ADDRESS") {
            self.web.bind_address = v;
        }
    }

    /// Reject settings the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        let alarms = &self.alarms;
        if alarms.priority_threshold < 1 {
            return Err(RelayError::Config(format!(
                "priority_threshold must be at least 1, got {}",
                alarms.priority_threshold
            )));
        }
        if alarms.window_minutes == 0 {
            return Err(RelayError::Config("window_minutes must be positive".into()));
        }
        if alarms.window_minutes > MAX_WINDOW_MINUTES {
            return Err(RelayError::Config(format!(
                "window_minutes must be at most {}, got {}",
                MAX_WINDOW_MINUTES, alarms.window_minutes
            )));
        }
        if let Some(ttl) = alarms.dedup_ttl_minutes {
            if ttl > MAX_DEDUP_TTL_MINUTES {
                return Err(RelayError::Config(format!(
                    "dedup_ttl_minutes must be at most {}, got {}",
                    MAX_DEDUP_TTL_MINUTES, ttl
                )));
            }
            if ttl < alarms.window_minutes {
                return Err(RelayError::Config(format!(
                    "dedup_ttl_minutes ({}) must cover window_minutes ({})",
                    ttl, alarms.window_minutes
                )));
            }
        }
        if alarms.poll_interval_seconds == 0 {
            return Err(RelayError::Config("poll_interval_seconds must be positive".into()));
        }
        if alarms.send_concurrency == 0 {
            return Err(RelayError::Config("send_concurrency must be positive".into()));
        }
        if self.web.enabled {
            self.web_bind_address()?;
        }
        if let Some(missing) = self.unfetched_priorities() {
            warn!(
                "priority_threshold {} exceeds priority_filter {:?}; priorities {} are never fetched",
                alarms.priority_threshold, alarms.priority_filter, missing
            );
        }
        Ok(())
    }

    /// Priorities that pass the threshold gate but are missing from the
    /// fetch filter, as a display range like `3..=4`
    pub fn unfetched_priorities(&self) -> Option<String> {
        let alarms = &self.alarms;
        let fetched = alarms.priority_filter.iter().copied().max()?;
        (alarms.priority_threshold > fetched)
            .then(|| format!("{}..={}", fetched + 1, alarms.priority_threshold))
    }

    pub fn web_bind_address(&self) -> Result<SocketAddr> {
        self.web.bind_address.parse().map_err(|e| {
            RelayError::Config(format!(
                "Invalid web bind address '{}': {}",
                self.web.bind_address, e
            ))
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.alarms.poll_interval_seconds)
    }

    /// Snapshot of everything the evaluator and dispatcher decide with
    pub fn settings(&self) -> AlarmSettings {
        AlarmSettings {
            priority_threshold: self.alarms.priority_threshold,
            window_minutes: self.alarms.window_minutes,
            priority_filter: self.alarms.priority_filter.clone(),
            contacts: self.contacts.clone(),
            dedup_ttl: self
                .alarms
                .dedup_ttl_minutes
                .map(|minutes| Duration::from_secs(minutes.saturating_mul(60))),
            send_concurrency: self.alarms.send_concurrency,
        }
    }

    /// Copy with passwords, API keys and tokens masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        mask(&mut copy.eds.password);
        mask(&mut copy.sms.tnz.api_key);
        mask(&mut copy.sms.twilio.auth_token);
        copy
    }
}

/// Parse `CONTACT_LIST`: a JSON array of `{"name": ..., "number": ...}`.
/// Anything unparsable yields an empty list.
pub fn parse_contact_list(text: &str) -> Vec<Contact> {
    match serde_json::from_str::<Vec<Contact>>(text) {
        Ok(contacts) => {
            info!("Loaded {} contacts for notifications", contacts.len());
            contacts
        }
        Err(e) => {
            warn!("Error loading contact list, using none: {}", e);
            Vec::new()
        }
    }
}

/// Parse a comma separated priority list, ignoring entries that are not
/// plain digits
pub fn parse_priority_list(text: &str) -> Vec<i64> {
    text.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|p| p.parse().ok())
        .collect()
}

fn override_number<T, F>(text: &F, key: &str, target: &mut T)
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = text(key) {
        match v.trim().parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!("Ignoring {}: '{}' is not a valid number", key, v),
        }
    }
}

fn mask(secret: &mut Option<String>) {
    if secret.as_deref().map_or(false, |s| !s.is_empty()) {
        *secret = Some(MASK.to_string());
    }
}

// ============================================================================
// DEFAULT VALUE FUNCTIONS
// ============================================================================

fn default_client_type() -> String { "azure_function".to_string() }
fn default_http_timeout() -> u64 { 30 }
fn default_tnz_base_url() -> String { "https://api.tnz.co.nz/api/v1".to_string() }
fn default_priority_threshold() -> i64 { 2 }
fn default_window_minutes() -> u64 { 15 }
fn default_priority_filter() -> Vec<i64> { vec![1, 2] }
fn default_dedup_ttl_minutes() -> Option<u64> { Some(60) }
fn default_poll_interval_seconds() -> u64 { 300 }
fn default_send_concurrency() -> usize { 1 }
fn default_true() -> bool { true }
fn default_bind_address() -> String { "0.0.0.0:5000".to_string() }

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.alarms.priority_threshold, 2);
        assert_eq!(config.alarms.window_minutes, 15);
        assert_eq!(config.alarms.priority_filter, vec![1, 2]);
        assert!(config.contacts.is_empty());
        assert_eq!(config.eds.client_type, "azure_function");
        assert_eq!(config.sms.tnz.base_url, "https://api.tnz.co.nz/api/v1");
        config.validate().unwrap();
    }

    #[test]
    fn test_yaml_sections_are_optional() {
        let yaml = r#"
alarms:
  priority_threshold: 1
contacts:
  - name: "Ops"
    number: "+6421000000"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.alarms.priority_threshold, 1);
        assert_eq!(config.alarms.window_minutes, 15);
        assert_eq!(config.contacts, vec![Contact::new("Ops", "+6421000000")]);
        assert_eq!(config.sms.provider, SmsProvider::Tnz);
    }

    #[test]
    fn test_null_ttl_is_unbounded() {
        let config = Config::from_yaml("alarms:\n  dedup_ttl_minutes: null\n").unwrap();
        assert_eq!(config.settings().dedup_ttl, None);
    }

    #[test]
    fn test_environment_overrides() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("EDS_API_BASE_URL", "https://eds.local"),
            ("EDS_API_USERNAME", "relay"),
            ("EDS_API_PASSWORD", "secret"),
            ("TNZ_API_KEY", "key"),
            ("SMS_PROVIDER", "twilio"),
            ("ALARM_NOTIFICATION_THRESHOLD", "3"),
            ("LAST_RUN_MINUTES", "30"),
            ("ALARM_PRIORITY_FILTER", "1, 2,x,3"),
            ("CONTACT_LIST", r#"[{"name":"A","number":"+111"}]"#),
        ]));

        assert!(config.eds.is_configured());
        assert_eq!(config.sms.provider, SmsProvider::Twilio);
        assert_eq!(config.sms.tnz.api_key.as_deref(), Some("key"));
        assert_eq!(config.alarms.priority_threshold, 3);
        assert_eq!(config.alarms.window_minutes, 30);
        assert_eq!(config.alarms.priority_filter, vec![1, 2, 3]);
        assert_eq!(config.contacts, vec![Contact::new("A", "+111")]);
    }

    #[test]
    fn test_malformed_overrides_fall_back() {
        let mut config = Config::default();
        config.contacts = vec![Contact::new("Old", "+1")];
        config.apply_overrides(lookup(&[
            ("ALARM_NOTIFICATION_THRESHOLD", "high"),
            ("SMS_PROVIDER", "carrier-pigeon"),
            ("CONTACT_LIST", "not json"),
        ]));

        assert_eq!(config.alarms.priority_threshold, 2);
        assert_eq!(config.sms.provider, SmsProvider::Tnz);
        assert!(config.contacts.is_empty());
    }

    #[test]
    fn test_contact_list_parsing() {
        assert!(parse_contact_list("[]").is_empty());
        assert!(parse_contact_list("{}").is_empty());
        let contacts = parse_contact_list(r#"[{"number":"+1"},{"name":"B"}]"#);
        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[0].display_name(), "Unknown");
        assert!(!contacts[1].has_number());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.alarms.dedup_ttl_minutes = Some(5);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.alarms.priority_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.web.bind_address = "nowhere".into();
        assert!(config.validate().is_err());
        config.web.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_oversized_windows_are_rejected() {
        let mut config = Config::default();
        config.alarms.dedup_ttl_minutes = None;
        config.alarms.window_minutes = MAX_WINDOW_MINUTES;
        assert!(config.validate().is_ok());
        config.alarms.window_minutes = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.apply_overrides(lookup(&[("DEDUP_TTL_MINUTES", "18446744073709551615")]));
        assert_eq!(config.alarms.dedup_ttl_minutes, Some(u64::MAX));
        assert!(config.validate().is_err());
        assert_eq!(
            config.settings().dedup_ttl,
            Some(Duration::from_secs(u64::MAX))
        );
    }

    #[test]
    fn test_threshold_beyond_filter() {
        let mut config = Config::default();
        assert_eq!(config.unfetched_priorities(), None);

        config.alarms.priority_threshold = 4;
        assert_eq!(config.unfetched_priorities().as_deref(), Some("3..=4"));
        assert!(config.validate().is_ok());

        config.alarms.priority_filter = vec![1, 2, 3, 4];
        assert_eq!(config.unfetched_priorities(), None);
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let mut config = Config::default();
        config.eds.password = Some("pw".into());
        config.sms.tnz.api_key = Some("key".into());

        let redacted = config.redacted();
        assert_eq!(redacted.eds.password.as_deref(), Some(MASK));
        assert_eq!(redacted.sms.tnz.api_key.as_deref(), Some(MASK));
        assert_eq!(redacted.sms.twilio.auth_token, None);
    }

    #[test]
    fn test_settings_snapshot() {
        let settings = Config::default().settings();
        assert_eq!(settings.dedup_ttl, Some(Duration::from_secs(3600)));
        assert_eq!(settings.send_concurrency, 1);
    }
}
