//! New-message notifications
//!
//! One banner per refresh cycle, whatever the number of flagged threads.
//! A new banner replaces a visible one and takes over its dismiss timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use super::events::{EventSink, SyncEvent};
use super::tasks::TaskSet;
use crate::model::{CaseNumber, MessageSnapshot};

/// A visible notification banner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub id: u64,
    pub message: String,
}

/// Case numbers whose thread carries the backend's new-message flag
pub fn flagged_cases(messages: &MessageSnapshot) -> Vec<CaseNumber> {
    messages
        .iter()
        .filter(|(_, thread)| thread.has_new_message)
        .map(|(case_number, _)| case_number.clone())
        .collect()
}

pub fn notification_text(count: usize) -> String {
    format!("You have new messages in {} task(s)!", count)
}

pub struct MessageNotificationTracker {
    sink: EventSink,
    tasks: TaskSet,
    ttl: Duration,
    next_id: AtomicU64,
    /// Live banner id and its dismiss timer
    live: Mutex<Option<(u64, AbortHandle)>>,
}

impl MessageNotificationTracker {
    pub fn new(sink: EventSink, tasks: TaskSet, ttl: Duration) -> Self {
        Self {
            sink,
            tasks,
            ttl,
            next_id: AtomicU64::new(1),
            live: Mutex::new(None),
        }
    }

    /// Inspect a freshly applied message snapshot and raise at most one
    /// notification for it
    pub fn observe(
        &self,
        messages: &MessageSnapshot,
        cancel: &CancellationToken,
    ) -> Option<NotificationEvent> {
        if cancel.is_cancelled() {
            return None;
        }
        let flagged = flagged_cases(messages);
        if flagged.is_empty() {
            return None;
        }

        let event = NotificationEvent {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            message: notification_text(flagged.len()),
        };
        tracing::info!(tasks = flagged.len(), id = event.id, "New messages");

        let mut live = self.live.lock();
        if let Some((_, timer)) = live.take() {
            timer.abort();
        }
        self.sink.emit(SyncEvent::NotificationRaised {
            id: event.id,
            message: event.message.clone(),
        });

        let sink = self.sink.clone();
        let ttl = self.ttl;
        let id = event.id;
        let cancel = cancel.clone();
        let timer = self.tasks.spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(ttl) => {
                    sink.emit(SyncEvent::NotificationDismissed { id });
                }
            }
        });
        *live = Some((id, timer));

        Some(event)
    }

    /// Id of the banner whose timer is still pending
    pub fn live_id(&self) -> Option<u64> {
        self.live
            .lock()
            .as_ref()
            .filter(|(_, timer)| !timer.is_finished())
            .map(|(id, _)| *id)
    }

    /// Drop the live banner timer
    pub fn clear(&self) {
        if let Some((_, timer)) = self.live.lock().take() {
            timer.abort();
        }
    }
}
