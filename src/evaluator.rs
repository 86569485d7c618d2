//! Alarm evaluation: which alarms become which SMS notifications.
//!
//! For every alarm, in input order, the evaluator applies
//!
//! 1. the dedup gate (already notified alarms are skipped),
//! 2. the priority gate (missing priority or priority above the threshold is
//!    skipped; the threshold is inclusive),
//! 3. recipient resolution, and
//! 4. the dedup commit, recording the alarm id once at least one
//!    notification was produced for it.
//!
//! Recipient resolution broadcasts to every configured contact that has a
//! number. With no contact list configured it falls back to a single
//! recipient embedded in the alarm's `aux` field as `contact:<number>;`.
//! An alarm that resolves to nobody is not recorded and is evaluated again
//! on the next cycle.

use crate::alarm::AlarmRecord;
use crate::config::{AlarmSettings, Contact};
use crate::dedup::DedupStore;
use crate::notification::{format_message, NotificationRecord};
use std::time::Instant;
use tracing::{debug, info, warn};

const AUX_CONTACT_KEY: &str = "contact:";

/// How recipients are chosen for a qualifying alarm
#[derive(Debug, Clone, PartialEq)]
pub enum RecipientPolicy {
    /// Every alarm goes to every contact with a number
    Broadcast(Vec<Contact>),
    /// No contact list: read the recipient from the alarm's `aux` field
    AuxContact,
}

/// Stateless decision component; the dedup store is passed in per call
#[derive(Debug, Clone)]
pub struct Evaluator {
    priority_threshold: i64,
    policy: RecipientPolicy,
}

impl Evaluator {
    pub fn new(priority_threshold: i64, contacts: Vec<Contact>) -> Self {
        let policy = if contacts.is_empty() {
            RecipientPolicy::AuxContact
        } else {
            if !contacts.iter().any(|c| c.has_number()) {
                warn!(
                    "{} contacts configured but none has a number; no SMS will be sent",
                    contacts.len()
                );
            }
            RecipientPolicy::Broadcast(contacts)
        };

        Self {
            priority_threshold,
            policy,
        }
    }

    pub fn from_settings(settings: &AlarmSettings) -> Self {
        Self::new(settings.priority_threshold, settings.contacts.clone())
    }

    pub fn priority_threshold(&self) -> i64 {
        self.priority_threshold
    }

    pub fn policy(&self) -> &RecipientPolicy {
        &self.policy
    }

    /// Decide the notifications for a batch of alarms and record the
    /// notified alarm ids in `seen`.
    pub fn evaluate(
        &self,
        alarms: &[AlarmRecord],
        seen: &mut DedupStore,
    ) -> Vec<NotificationRecord> {
        let now = Instant::now();
        let mut notifications = Vec::new();

        for alarm in alarms {
            if let Some(id) = &alarm.id {
                if seen.contains_at(id, now) {
                    debug!("Alarm {} already notified, skipping", id);
                    continue;
                }
            }

            if !self.qualifies(alarm) {
                continue;
            }

            let produced = match &self.policy {
                RecipientPolicy::Broadcast(contacts) => broadcast(alarm, contacts),
                RecipientPolicy::AuxContact => aux_notification(alarm).into_iter().collect(),
            };

            if produced.is_empty() {
                continue;
            }

            if let Some(id) = &alarm.id {
                seen.insert_at(id.clone(), now);
            }
            notifications.extend(produced);
        }

        notifications
    }

    fn qualifies(&self, alarm: &AlarmRecord) -> bool {
        match alarm.priority {
            Some(priority) => priority <= self.priority_threshold,
            None => false,
        }
    }
}

fn broadcast(alarm: &AlarmRecord, contacts: &[Contact]) -> Vec<NotificationRecord> {
    let message = format_message(alarm);

    contacts
        .iter()
        .filter_map(|contact| {
            let number = contact.number()?;
            Some(NotificationRecord {
                recipient: number.to_string(),
                message: message.clone(),
                alarm_id: alarm.id.clone(),
                priority: alarm.priority,
                timestamp: alarm.timestamp,
                contact_name: Some(contact.display_name().to_string()),
            })
        })
        .collect()
}

fn aux_notification(alarm: &AlarmRecord) -> Option<NotificationRecord> {
    let recipient = match alarm.aux.as_deref().and_then(extract_aux_contact) {
        Some(recipient) => recipient,
        None => {
            warn!(
                "No contacts configured and no contact in alarm {} aux data",
                alarm
                    .id
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "<no id>".to_string())
            );
            return None;
        }
    };
    info!("Using aux contact {} for alarm notification", recipient);

    Some(NotificationRecord {
        recipient,
        message: format_message(alarm),
        alarm_id: alarm.id.clone(),
        priority: alarm.priority,
        timestamp: alarm.timestamp,
        contact_name: None,
    })
}

/// Extract `<value>` from `...contact:<value>;...`, trimmed.
///
/// The value ends at the next `;` or at the end of the string. An empty
/// value counts as no contact.
pub fn extract_aux_contact(aux: &str) -> Option<String> {
    let start = aux.find(AUX_CONTACT_KEY)? + AUX_CONTACT_KEY.len();
    let rest = &aux[start..];
    let value = rest.split(';').next().unwrap_or_default().trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
