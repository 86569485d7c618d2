//! alarm-relay - Polls an alarm-management API and relays urgent alarms by SMS
//!
//! Every cycle fetches recent alarms from the alarm source, decides which of
//! them warrant a notification, and hands the resulting messages to an SMS
//! gateway. Alarms that have already been notified are remembered for a
//! configurable time so each alarm is announced once.
//!
//! # Feature Flags
//!
//! - `web` (default): operator HTTP API (`/health`, `/api/status`,
//!   `/api/alarms`, `/api/check-alarms`, `/api/config`)
//! - `metrics`: Prometheus counters on `/metrics`
//!
//! # Examples
//!
//! ```rust,no_run
//! use alarm_relay::{Config, Delivery, Dispatcher, EdsClient};
//!
//! # async fn run() -> alarm_relay::Result<()> {
//! alarm_relay::init_logging();
//!
//! let config = Config::load(Some(std::path::Path::new("relay.yaml")))?;
//! let dispatcher = Dispatcher::new(config.settings());
//! let mut source = EdsClient::new(&config.eds)?;
//! let report = dispatcher.run_cycle(&mut source, Delivery::DryRun).await;
//! println!("{} notifications decided", report.notifications_generated);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// CORE MODULES
// ============================================================================

/// Crate error type
pub mod error;

/// Alarm records as decoded from the alarm source
pub mod alarm;

/// Notification records and SMS message formatting
pub mod notification;

/// Time-bounded store of already notified alarm ids
pub mod dedup;

/// Priority gating and recipient resolution
pub mod evaluator;

/// YAML and environment configuration
pub mod config;

// ============================================================================
// COLLABORATORS AND DRIVERS
// ============================================================================

pub mod source;
pub mod eds;
pub mod sms;

/// One fetch, evaluate, send cycle
pub mod dispatch;

pub mod scheduler;

#[cfg(feature = "web")]
pub mod web;

#[cfg(feature = "metrics")]
pub mod metrics;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use alarm::{AlarmId, AlarmRecord};
pub use config::{AlarmSettings, Config, Contact, SmsProvider};
pub use dedup::DedupStore;
pub use dispatch::{CycleReport, Delivery, Dispatcher};
pub use eds::EdsClient;
pub use error::{RelayError, Result};
pub use evaluator::{Evaluator, RecipientPolicy};
pub use notification::NotificationRecord;
pub use scheduler::Scheduler;
pub use sms::{build_sender, SmsSender, TnzSender, TwilioSender};
pub use source::{AlarmSource, SourceFactory};

// ============================================================================
// VERSION INFORMATION
// ============================================================================

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// INITIALIZATION
// ============================================================================

/// Install the tracing subscriber.
///
/// `RUST_LOG` overrides the default `alarm_relay=info` filter. Calling this
/// when a subscriber is already installed does nothing.
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("alarm_relay=info"));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false));

    if subscriber.try_init().is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
