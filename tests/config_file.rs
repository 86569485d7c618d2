use alarm_relay::{Config, RelayError, SmsProvider};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_full_file() {
    let file = write_config(
        r#"
eds:
  base_url: "https://eds.plant.local"
  username: "relay"
  password: "secret"
sms:
  provider: twilio
  twilio:
    account_sid: "AC1"
    auth_token: "token"
    from_number: "+15550001"
alarms:
  priority_threshold: 1
  window_minutes: 10
  priority_filter: [1]
  dedup_ttl_minutes: 30
  poll_interval_seconds: 60
  send_concurrency: 2
contacts:
  - name: "Operator"
    number: "+6421000"
web:
  enabled: false
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    config.validate().unwrap();

    assert!(config.eds.is_configured());
    assert_eq!(config.sms.provider, SmsProvider::Twilio);
    assert_eq!(config.contacts.len(), 1);
    assert!(!config.web.enabled);

    let settings = config.settings();
    assert_eq!(settings.priority_threshold, 1);
    assert_eq!(settings.window_minutes, 10);
    assert_eq!(settings.priority_filter, vec![1]);
    assert_eq!(settings.dedup_ttl, Some(Duration::from_secs(30 * 60)));
    assert_eq!(settings.send_concurrency, 2);
    assert_eq!(config.poll_interval(), Duration::from_secs(60));
}

#[test]
fn test_empty_file_gives_defaults() {
    let file = write_config("{}\n");
    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_invalid_yaml_is_reported() {
    let file = write_config("alarms: [not, a, map]\n");
    assert!(matches!(
        Config::from_file(file.path()),
        Err(RelayError::Yaml(_))
    ));
}

#[test]
fn test_missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.yaml");
    assert!(matches!(
        Config::from_file(&missing),
        Err(RelayError::Config(_))
    ));
}

#[test]
fn test_ttl_shorter_than_window_is_rejected() {
    let file = write_config(
        r#"
alarms:
  window_minutes: 30
  dedup_ttl_minutes: 10
"#,
    );
    let config = Config::from_file(file.path()).unwrap();
    assert!(config.validate().is_err());
}
