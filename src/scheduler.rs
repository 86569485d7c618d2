// src/scheduler.rs
// Timer trigger: one dispatch cycle per poll interval.

use crate::dispatch::{CycleReport, Delivery, Dispatcher};
use crate::sms::SmsSender;
use crate::source::SourceFactory;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

pub struct Scheduler {
    dispatcher: Arc<Dispatcher>,
    sources: SourceFactory,
    /// `None` runs every cycle dry
    sender: Option<Arc<dyn SmsSender>>,
    period: Duration,
}

impl Scheduler {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        sources: SourceFactory,
        sender: Option<Arc<dyn SmsSender>>,
        period: Duration,
    ) -> Self {
        Self {
            dispatcher,
            sources,
            sender,
            period,
        }
    }

    /// Run until `shutdown` becomes true or its sender is dropped.
    /// The first cycle starts immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Alarm scheduler started, polling every {:?}", self.period);

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if AssertUnwindSafe(self.tick()).catch_unwind().await.is_err() {
                        error!("Alarm cycle panicked; continuing with the next tick");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Alarm scheduler stopped");
    }

    /// One cycle with a fresh alarm source session
    pub async fn tick(&self) -> Option<CycleReport> {
        let mut source = match (self.sources)() {
            Ok(source) => source,
            Err(e) => {
                error!("Cannot create alarm source: {}", e);
                return None;
            }
        };

        let delivery = match &self.sender {
            Some(sender) => Delivery::Send(sender.as_ref()),
            None => Delivery::DryRun,
        };

        Some(self.dispatcher.run_cycle(source.as_mut(), delivery).await)
    }
}
