// src/sms.rs
// SMS delivery: the sender trait and the TNZ and Twilio gateways.

use crate::config::{SmsConfig, SmsProvider, TnzConfig, TwilioConfig};
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, error, info};

pub const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Delivers a single SMS.
///
/// `false` is an ordinary delivery failure: it has already been logged and
/// is only counted by the caller.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, recipient: &str, message: &str) -> bool;

    /// Gateway location, for status output
    fn describe(&self) -> String {
        String::from("sms gateway")
    }
}

/// Build the sender selected by `config.provider`
pub fn build_sender(config: &SmsConfig) -> Result<Arc<dyn SmsSender>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let sender: Arc<dyn SmsSender> = match config.provider {
        SmsProvider::Tnz => Arc::new(TnzSender::new(&config.tnz, timeout)?),
        SmsProvider::Twilio => Arc::new(TwilioSender::new(&config.twilio, timeout)?),
    };
    info!("Using {:?} SMS gateway at {}", config.provider, sender.describe());
    Ok(sender)
}

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RelayError::Config(format!("Failed to create HTTP client: {}", e)))
}

// ===== TNZ =====

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TnzSendRequest<'a> {
    destinations: [&'a str; 1],
    message: &'a str,
    validate_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    sender_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct TnzSendResponse {
    #[serde(rename = "Result", default)]
    result: TnzResult,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TnzResult {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    errors: Vec<String>,
}

/// TNZ REST gateway
pub struct TnzSender {
    base_url: String,
    api_key: String,
    sender_id: Option<String>,
    validate_only: bool,
    client: Client,
}

impl TnzSender {
    pub fn new(config: &TnzConfig, timeout: Duration) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| RelayError::Config("TNZ API key not configured".into()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            sender_id: config.sender_id.clone().filter(|id| !id.is_empty()),
            validate_only: false,
            client: http_client(timeout)?,
        })
    }

    /// Ask the gateway to validate messages without delivering them
    pub fn validate_only(mut self, validate_only: bool) -> Self {
        self.validate_only = validate_only;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit one message, returning the gateway message id
    pub async fn send_sms(
        &self,
        to: &str,
        message: &str,
        reference: Option<&str>,
    ) -> Result<Option<String>> {
        let request = TnzSendRequest {
            destinations: [to],
            message,
            validate_only: self.validate_only,
            sender_id: self.sender_id.as_deref(),
            reference,
        };

        let response = self
            .client
            .post(format!("{}/sms/send", self.base_url))
            .header("Authorization", format!("Basic {}", self.api_key))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: TnzSendResponse = response.json().await?;
        if body.result.success {
            Ok(body.result.message_id)
        } else {
            Err(RelayError::api("TNZ", body.result.errors.join("; ")))
        }
    }

    /// Delivery status of a previously submitted message
    pub async fn check_message_status(&self, message_id: &str) -> Result<JsonValue> {
        let response = self
            .client
            .get(format!("{}/sms/status/{}", self.base_url, message_id))
            .header("Authorization", format!("Basic {}", self.api_key))
            .send()
            .await?
            .error_for_status()?;

        let status: JsonValue = response.json().await?;
        debug!("Status for message {}: {}", message_id, status);
        Ok(status)
    }
}

#[async_trait]
impl SmsSender for TnzSender {
    async fn send(&self, recipient: &str, message: &str) -> bool {
        match self.send_sms(recipient, message, None).await {
            Ok(message_id) => {
                info!(
                    "SMS sent successfully to {}. Message ID: {}",
                    recipient,
                    message_id.as_deref().unwrap_or("unknown")
                );
                true
            }
            Err(e) => {
                error!("Failed to send SMS to {}: {}", recipient, e);
                false
            }
        }
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

// ===== TWILIO =====

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
    status: String,
}

/// Twilio Programmable Messaging gateway
pub struct TwilioSender {
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    client: Client,
}

impl TwilioSender {
    pub fn new(config: &TwilioConfig, timeout: Duration) -> Result<Self> {
        let account_sid = config
            .account_sid
            .clone()
            .filter(|sid| !sid.is_empty())
            .ok_or_else(|| RelayError::Config("TWILIO_ACCOUNT_SID not provided".into()))?;

        let auth_token = config
            .auth_token
            .clone()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| RelayError::Config("TWILIO_AUTH_TOKEN not provided".into()))?;

        let from_number = config
            .from_number
            .clone()
            .filter(|number| !number.is_empty())
            .ok_or_else(|| RelayError::Config("Twilio from_number is required".into()))?;

        if !from_number.starts_with('+') {
            return Err(RelayError::Config(
                "Phone numbers must be in E.164 format (e.g., +1234567890)".into(),
            ));
        }

        Ok(Self {
            api_base: TWILIO_API_BASE.to_string(),
            account_sid,
            auth_token,
            from_number,
            client: http_client(timeout)?,
        })
    }

    /// Point the sender at another API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Submit one message, returning the Twilio message SID
    pub async fn send_sms(&self, to: &str, body: &str) -> Result<String> {
        let url = format!(
            "{}/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        );
        let params = [
            ("To", to),
            ("From", self.from_number.as_str()),
            ("Body", body),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RelayError::api("Twilio", format!("{}: {}", status, text)));
        }

        let msg: MessageResponse = serde_json::from_str(&text)?;
        debug!("Twilio accepted message {} with status {}", msg.sid, msg.status);
        Ok(msg.sid)
    }
}

#[async_trait]
impl SmsSender for TwilioSender {
    async fn send(&self, recipient: &str, message: &str) -> bool {
        match self.send_sms(recipient, message).await {
            Ok(sid) => {
                info!("SMS sent successfully to {}. Message SID: {}", recipient, sid);
                true
            }
            Err(e) => {
                error!("Failed to send SMS to {}: {}", recipient, e);
                false
            }
        }
    }

    fn describe(&self) -> String {
        self.api_base.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn twilio() -> TwilioConfig {
        TwilioConfig {
            account_sid: Some("AC123".into()),
            auth_token: Some("token".into()),
            from_number: Some("+15550001".into()),
        }
    }

    #[test]
    fn test_tnz_requires_api_key() {
        let config = TnzConfig::default();
        assert!(matches!(
            TnzSender::new(&config, Duration::from_secs(5)),
            Err(RelayError::Config(_))
        ));
    }

    #[test]
    fn test_tnz_request_shape() {
        let request = TnzSendRequest {
            destinations: ["+64211234567"],
            message: "hello",
            validate_only: false,
            sender_id: Some("PLANT"),
            reference: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["Destinations"][0], "+64211234567");
        assert_eq!(json["Message"], "hello");
        assert_eq!(json["ValidateOnly"], false);
        assert_eq!(json["SenderId"], "PLANT");
        assert!(json.get("Reference").is_none());
    }

    #[test]
    fn test_tnz_response_errors() {
        let body: TnzSendResponse = serde_json::from_str(
            r#"{"Result": {"Success": false, "Errors": ["bad number", "no credit"]}}"#,
        )
        .unwrap();
        assert!(!body.result.success);
        assert_eq!(body.result.errors.join("; "), "bad number; no credit");

        let empty: TnzSendResponse = serde_json::from_str("{}").unwrap();
        assert!(!empty.result.success);
    }

    #[test]
    fn test_twilio_requires_e164_sender() {
        let mut config = twilio();
        config.from_number = Some("5550001".into());
        assert!(TwilioSender::new(&config, Duration::from_secs(5)).is_err());

        config.from_number = None;
        assert!(TwilioSender::new(&config, Duration::from_secs(5)).is_err());

        assert!(TwilioSender::new(&twilio(), Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_build_sender_follows_provider() {
        let mut config = SmsConfig::default();
        assert!(build_sender(&config).is_err());

        config.provider = SmsProvider::Twilio;
        config.twilio = twilio();
        let sender = build_sender(&config).unwrap();
        assert_eq!(sender.describe(), TWILIO_API_BASE);
    }
}
