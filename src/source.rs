//! The alarm source collaborator.

use crate::alarm::AlarmRecord;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Where alarms come from.
///
/// Implementations own their session handling. Fetch failures are logged and
/// reported as an empty batch: the dispatcher treats "no alarms" and "source
/// unavailable" alike. Only `open` surfaces an error.
#[async_trait]
pub trait AlarmSource: Send {
    /// Alarms raised within the last `window_minutes` with one of the
    /// given priorities
    async fn fetch_recent_alarms(
        &mut self,
        window_minutes: u64,
        priorities: &[i64],
    ) -> Vec<AlarmRecord>;

    /// Establish a session up front so callers can report a failure.
    /// `fetch_recent_alarms` opens lazily when this was not called.
    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release any session held against the source
    async fn sign_off(&mut self);

    /// Whether the source currently accepts a session
    async fn is_reachable(&mut self) -> bool {
        true
    }

    /// Human readable location, for status output
    fn describe(&self) -> String {
        String::from("alarm source")
    }
}

/// Builds a fresh alarm source for each cycle or request
pub type SourceFactory = Arc<dyn Fn() -> Result<Box<dyn AlarmSource>> + Send + Sync>;
