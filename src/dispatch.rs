//! One fetch, evaluate, send cycle.
//!
//! The dispatcher owns the dedup store. Its lock is held for the whole
//! cycle, so a scheduled cycle and a manually triggered one never
//! interleave. Delivery is best effort: ids are committed to the store when
//! the notification is decided, and a failed send is counted, not retried.

use crate::config::AlarmSettings;
use crate::dedup::DedupStore;
use crate::evaluator::Evaluator;
use crate::notification::NotificationRecord;
use crate::sms::SmsSender;
use crate::source::AlarmSource;
use chrono::{DateTime, Utc};
use futures::{stream, FutureExt, StreamExt};
use serde::Serialize;
use std::panic::{resume_unwind, AssertUnwindSafe};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// What to do with decided notifications
#[derive(Clone, Copy)]
pub enum Delivery<'a> {
    /// Hand every notification to the sender
    Send(&'a dyn SmsSender),
    /// Decide and record, but send nothing
    DryRun,
}

impl Delivery<'_> {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, Delivery::DryRun)
    }
}

/// Outcome of one cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub alarms_fetched: usize,
    pub notifications_generated: usize,
    pub sms_sent: usize,
    pub sms_failed: usize,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

pub struct Dispatcher {
    settings: AlarmSettings,
    evaluator: Evaluator,
    seen: Mutex<DedupStore>,
}

impl Dispatcher {
    pub fn new(settings: AlarmSettings) -> Self {
        let store = match settings.dedup_ttl {
            Some(ttl) => DedupStore::with_ttl(ttl),
            None => DedupStore::unbounded(),
        };
        Self::with_store(settings, store)
    }

    /// Start from an existing dedup store
    pub fn with_store(settings: AlarmSettings, store: DedupStore) -> Self {
        Self {
            evaluator: Evaluator::from_settings(&settings),
            settings,
            seen: Mutex::new(store),
        }
    }

    pub fn settings(&self) -> &AlarmSettings {
        &self.settings
    }

    /// Ids currently held in the dedup store
    pub async fn seen_count(&self) -> usize {
        self.seen.lock().await.len()
    }

    /// Run one cycle against `source`.
    ///
    /// The source is signed off before this returns, also when fetching or
    /// evaluating panics; the panic is then resumed.
    pub async fn run_cycle(
        &self,
        source: &mut dyn AlarmSource,
        delivery: Delivery<'_>,
    ) -> CycleReport {
        let mut seen = self.seen.lock().await;
        let started_at = Utc::now();
        let clock = Instant::now();

        seen.purge_expired();

        let decided = AssertUnwindSafe(async {
            let alarms = source
                .fetch_recent_alarms(self.settings.window_minutes, &self.settings.priority_filter)
                .await;
            let notifications = self.evaluator.evaluate(&alarms, &mut seen);
            (alarms.len(), notifications)
        })
        .catch_unwind()
        .await;

        source.sign_off().await;

        let (alarms_fetched, notifications) = match decided {
            Ok(decided) => decided,
            Err(panic) => {
                error!("Alarm cycle aborted after signing off the alarm source");
                resume_unwind(panic)
            }
        };
        drop(seen);

        let mut report = CycleReport {
            alarms_fetched,
            notifications_generated: notifications.len(),
            dry_run: delivery.is_dry_run(),
            started_at,
            ..Default::default()
        };

        match delivery {
            Delivery::Send(sender) => {
                let (sent, failed) = self.deliver(sender, &notifications).await;
                report.sms_sent = sent;
                report.sms_failed = failed;
            }
            Delivery::DryRun => {
                for n in &notifications {
                    info!("Dry run, not sending to {}", n.recipient);
                }
            }
        }

        report.duration_ms = clock.elapsed().as_millis() as u64;
        info!(
            "Cycle complete: {} alarms fetched, {} notifications, {} sent, {} failed",
            report.alarms_fetched, report.notifications_generated, report.sms_sent, report.sms_failed
        );

        #[cfg(feature = "metrics")]
        crate::metrics::record_cycle(&report);

        report
    }

    async fn deliver(
        &self,
        sender: &dyn SmsSender,
        notifications: &[NotificationRecord],
    ) -> (usize, usize) {
        let sends: Vec<_> = notifications
            .iter()
            .map(|n| sender.send(&n.recipient, &n.message))
            .collect();
        let outcomes: Vec<bool> = stream::iter(sends)
            .buffered(self.settings.send_concurrency.max(1))
            .collect()
            .await;

        let sent = outcomes.iter().filter(|ok| **ok).count();
        let failed = outcomes.len() - sent;
        if failed > 0 {
            warn!("{} of {} SMS notifications failed", failed, outcomes.len());
        }
        (sent, failed)
    }
}
