//! Sync events - what the engine reports to the dashboard

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::assign::TaskAssignment;
use crate::model::{BoardSnapshot, CaseNumber, MessageSnapshot};

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Seconds until the next scheduled refresh
    Countdown(u64),
    CycleStarted {
        trigger: RefreshTrigger,
    },
    /// A cycle resolved; both snapshots replace the previous ones wholesale
    SnapshotApplied {
        trigger: RefreshTrigger,
        board: BoardSnapshot,
        messages: MessageSnapshot,
    },
    WorkersLoaded(Vec<String>),
    BootstrapFinished(BootstrapOutcome),
    NotificationRaised {
        id: u64,
        message: String,
    },
    NotificationDismissed {
        id: u64,
    },
    UploadStateChanged {
        case_number: CaseNumber,
        state: UploadState,
    },
    AssignmentChanged {
        case_number: CaseNumber,
        assignment: TaskAssignment,
    },
    Alert(Alert),
    /// The client should discard everything and start a fresh session
    ReloadRequested,
}

impl SyncEvent {
    /// Short description of the event for logging
    pub fn description(&self) -> String {
        match self {
            Self::Countdown(secs) => format!("Refresh in {}s", secs),
            Self::CycleStarted { trigger } => format!("{} refresh started", trigger),
            Self::SnapshotApplied { trigger, board, .. } => {
                format!("{} refresh applied ({} tasks)", trigger, board.total())
            }
            Self::WorkersLoaded(workers) => format!("{} workers loaded", workers.len()),
            Self::BootstrapFinished(outcome) => format!("Bootstrap {}", outcome),
            Self::NotificationRaised { message, .. } => message.clone(),
            Self::NotificationDismissed { id } => format!("Notification {} dismissed", id),
            Self::UploadStateChanged { case_number, state } => {
                format!("Upload {}: {}", case_number, state)
            }
            Self::AssignmentChanged { case_number, .. } => {
                format!("Assignment {} changed", case_number)
            }
            Self::Alert(alert) => format!("{}: {}", alert.title, alert.description),
            Self::ReloadRequested => "Reload requested".to_string(),
        }
    }
}

/// What started a refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Bootstrap,
    Scheduled,
    Manual,
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bootstrap => write!(f, "bootstrap"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// How the bootstrap loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Non-empty board observed on this attempt (1-based)
    Populated { attempts: u32 },
    /// Every attempt saw an empty board
    Exhausted { attempts: u32 },
    Cancelled { attempts: u32 },
}

impl BootstrapOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Populated { attempts }
            | Self::Exhausted { attempts }
            | Self::Cancelled { attempts } => *attempts,
        }
    }
}

impl fmt::Display for BootstrapOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Populated { attempts } => write!(f, "populated after {} attempt(s)", attempts),
            Self::Exhausted { attempts } => write!(f, "exhausted after {} attempt(s)", attempts),
            Self::Cancelled { attempts } => write!(f, "cancelled after {} attempt(s)", attempts),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Upload job state
// ─────────────────────────────────────────────────────────────────────────────

/// Client-side state of the upload job for one case
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UploadState {
    #[default]
    Idle,
    Uploading,
    Polling,
    Finished,
    Failed {
        reason: String,
    },
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed { .. })
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Uploading | Self::Polling)
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Uploading => write!(f, "UPLOADING"),
            Self::Polling => write!(f, "POLLING"),
            Self::Finished => write!(f, "FINISHED"),
            Self::Failed { reason } => write!(f, "FAILED ({})", reason),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Alerts
// ─────────────────────────────────────────────────────────────────────────────

/// User-visible outcome of a write (upload, assignment)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Error,
}

impl Alert {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Info,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Error,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == AlertLevel::Error
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event sink
// ─────────────────────────────────────────────────────────────────────────────

/// Sender that goes silent once the session is torn down
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<SyncEvent>,
    cancel: CancellationToken,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<SyncEvent>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Create a sink and the matching receiver
    pub fn channel(cancel: CancellationToken) -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx, cancel), rx)
    }

    /// Deliver an event unless the session is cancelled.
    ///
    /// Returns whether the event was delivered.
    pub fn emit(&self, event: SyncEvent) -> bool {
        if self.cancel.is_cancelled() {
            tracing::trace!(event = %event.description(), "Dropping event after teardown");
            return false;
        }
        self.tx.send(event).is_ok()
    }

    pub fn alert(&self, alert: Alert) -> bool {
        self.emit(SyncEvent::Alert(alert))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_silent_after_cancel() {
        let cancel = CancellationToken::new();
        let (sink, mut rx) = EventSink::channel(cancel.clone());

        assert!(sink.emit(SyncEvent::Countdown(3)));
        cancel.cancel();
        assert!(!sink.emit(SyncEvent::Countdown(2)));

        assert!(matches!(rx.try_recv(), Ok(SyncEvent::Countdown(3))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_upload_state_flags() {
        assert!(UploadState::Polling.is_in_flight());
        assert!(!UploadState::Idle.is_in_flight());
        assert!(UploadState::Finished.is_terminal());
        assert!(UploadState::Failed {
            reason: "x".into()
        }
        .is_terminal());
        assert_eq!(UploadState::default(), UploadState::Idle);
    }

    #[test]
    fn test_bootstrap_outcome_display() {
        let outcome = BootstrapOutcome::Exhausted { attempts: 5 };
        assert_eq!(outcome.attempts(), 5);
        assert_eq!(outcome.to_string(), "exhausted after 5 attempt(s)");
    }
}
