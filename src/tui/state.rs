//! AppState - Domain Layer
//!
//! Folds [`SyncEvent`]s into dashboard state and derives the per-card view
//! models. Snapshots are replaced wholesale; the assignment side table and
//! upload badges are merged in at render time.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::time::Instant;

use crate::model::{BoardSnapshot, CaseNumber, Column, MessageSnapshot, Task, TaskMessage};
use crate::sync::{Alert, AlertLevel, BootstrapOutcome, SyncEvent, TaskAssignment, UploadState};

// ─────────────────────────────────────────────────────────────────────────────
// Core State
// ─────────────────────────────────────────────────────────────────────────────

/// Main application state
#[derive(Debug)]
pub struct AppState {
    pub username: String,
    pub status: SyncStatus,

    // Snapshots
    pub board: BoardSnapshot,
    pub messages: MessageSnapshot,
    pub workers: Vec<String>,
    pub last_refresh: Option<Instant>,

    // Timers
    pub countdown: u64,
    pub refreshing: bool,

    // Banner
    pub notification: Option<Notification>,

    // Side tables keyed by case number
    pub uploads: HashMap<CaseNumber, UploadState>,
    pub assignments: HashMap<CaseNumber, TaskAssignment>,

    // Activity log
    pub events: VecDeque<ActivityEvent>,
    pub max_events: usize,

    // UI state
    pub focus: Column,
    pub selection: HashMap<Column, usize>,
    pub input: InputMode,
    pub should_quit: bool,
}

impl AppState {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            status: SyncStatus::Connecting,
            board: BoardSnapshot::empty(),
            messages: MessageSnapshot::new(),
            workers: Vec::new(),
            last_refresh: None,
            countdown: 0,
            refreshing: false,
            notification: None,
            uploads: HashMap::new(),
            assignments: HashMap::new(),
            events: VecDeque::new(),
            max_events: 100,
            focus: Column::New,
            selection: HashMap::new(),
            input: InputMode::Normal,
            should_quit: false,
        }
    }

    /// Fold one engine event into the state
    pub fn apply(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Countdown(secs) => self.countdown = secs,
            SyncEvent::CycleStarted { .. } => self.refreshing = true,
            SyncEvent::SnapshotApplied {
                board, messages, ..
            } => {
                self.board = board;
                self.messages = messages;
                self.refreshing = false;
                self.last_refresh = Some(Instant::now());
                self.clamp_selection();
            }
            SyncEvent::WorkersLoaded(workers) => self.workers = workers,
            SyncEvent::BootstrapFinished(outcome) => {
                self.refreshing = false;
                self.status = SyncStatus::Live;
                if let BootstrapOutcome::Exhausted { attempts } = outcome {
                    self.push_event(ActivityEvent::warning(format!(
                        "No tasks after {} attempts",
                        attempts
                    )));
                }
            }
            SyncEvent::NotificationRaised { id, message } => {
                self.push_event(ActivityEvent::message(&message));
                self.notification = Some(Notification { id, message });
            }
            SyncEvent::NotificationDismissed { id } => {
                if self.notification.as_ref().map(|n| n.id) == Some(id) {
                    self.notification = None;
                }
            }
            SyncEvent::UploadStateChanged { case_number, state } => {
                self.uploads.insert(case_number, state);
            }
            SyncEvent::AssignmentChanged {
                case_number,
                assignment,
            } => {
                if assignment == TaskAssignment::default() {
                    self.assignments.remove(&case_number);
                } else {
                    self.assignments.insert(case_number, assignment);
                }
            }
            SyncEvent::Alert(alert) => self.push_event(ActivityEvent::from_alert(&alert)),
            SyncEvent::ReloadRequested => self.status = SyncStatus::Reloading,
        }
    }

    /// Forget everything the previous engine reported
    pub fn reset_for_reload(&mut self) {
        let username = std::mem::take(&mut self.username);
        let events = std::mem::take(&mut self.events);
        *self = Self::new(username);
        self.events = events;
        self.push_event(ActivityEvent::info("Reloaded"));
    }

    /// Add an activity event
    pub fn push_event(&mut self, event: ActivityEvent) {
        self.events.push_front(event);
        if self.events.len() > self.max_events {
            self.events.pop_back();
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Selectors
    // ─────────────────────────────────────────────────────────────────────

    pub fn selected_index(&self, column: Column) -> usize {
        self.selection.get(&column).copied().unwrap_or(0)
    }

    pub fn selected_task(&self) -> Option<&Task> {
        self.board
            .tasks(self.focus)
            .get(self.selected_index(self.focus))
    }

    pub fn move_selection(&mut self, delta: i32) {
        let len = self.board.tasks(self.focus).len();
        if len == 0 {
            return;
        }
        let current = self.selected_index(self.focus) as i64;
        let next = (current + delta as i64).clamp(0, len as i64 - 1) as usize;
        self.selection.insert(self.focus, next);
    }

    fn clamp_selection(&mut self) {
        for column in Column::ALL {
            let len = self.board.tasks(column).len();
            if let Some(index) = self.selection.get_mut(&column) {
                *index = (*index).min(len.saturating_sub(1));
            }
        }
    }

    pub fn assignment(&self, case_number: &str) -> TaskAssignment {
        self.assignments
            .get(case_number)
            .cloned()
            .unwrap_or_default()
    }

    /// Worker after the currently selected one, wrapping around the roster
    pub fn next_worker(&self, case_number: &str) -> Option<String> {
        if self.workers.is_empty() {
            return None;
        }
        let current = self.assignment(case_number).selected_worker;
        let next = match current.and_then(|w| self.workers.iter().position(|x| *x == w)) {
            Some(i) => (i + 1) % self.workers.len(),
            None => 0,
        };
        Some(self.workers[next].clone())
    }

    /// Number of threads flagged with new messages
    pub fn flagged_threads(&self) -> usize {
        self.messages.values().filter(|t| t.has_new_message).count()
    }

    /// Render-time view of every card in a column
    pub fn cards(&self, column: Column) -> Vec<TaskCardView> {
        self.board
            .tasks(column)
            .iter()
            .map(|task| self.card(task))
            .collect()
    }

    pub fn card(&self, task: &Task) -> TaskCardView {
        let thread = self.messages.get(&task.case_number);
        let assignment = self.assignment(&task.case_number);
        TaskCardView {
            case_number: task.case_number.clone(),
            headline: task.headline(),
            fbg: task.fbg.clone(),
            created_by: task.created_by.clone(),
            assigned_to: task.assigned_to.clone(),
            date: task.date.clone(),
            selected_worker: assignment.selected_worker,
            is_applying: assignment.is_applying,
            upload: self
                .uploads
                .get(&task.case_number)
                .cloned()
                .unwrap_or_default(),
            has_new_message: thread.map(|t| t.has_new_message).unwrap_or(false),
            messages: thread.map(|t| t.messages.clone()).unwrap_or_default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// View models
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a task card renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCardView {
    pub case_number: CaseNumber,
    pub headline: String,
    pub fbg: String,
    pub created_by: Option<String>,
    pub assigned_to: Option<String>,
    pub date: Option<String>,
    pub selected_worker: Option<String>,
    pub is_applying: bool,
    pub upload: UploadState,
    pub has_new_message: bool,
    pub messages: Vec<TaskMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Sync Status
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Bootstrap in progress
    Connecting,
    Live,
    Reloading,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Live => write!(f, "LIVE"),
            Self::Reloading => write!(f, "RELOADING"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Input
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Typing the path of a file to upload for a case
    UploadPath { case_number: CaseNumber, buffer: String },
}

impl InputMode {
    pub fn upload_target(&self) -> Option<(CaseNumber, PathBuf)> {
        match self {
            Self::UploadPath {
                case_number,
                buffer,
            } if !buffer.trim().is_empty() => {
                Some((case_number.clone(), PathBuf::from(buffer.trim())))
            }
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Activity Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub timestamp: Instant,
    pub event_type: ActivityEventType,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEventType {
    Info,
    Message,
    Warning,
    Error,
}

impl ActivityEvent {
    fn new(event_type: ActivityEventType, message: impl Into<String>) -> Self {
        Self {
            timestamp: Instant::now(),
            event_type,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(ActivityEventType::Info, message)
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::new(ActivityEventType::Message, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(ActivityEventType::Warning, message)
    }

    pub fn from_alert(alert: &Alert) -> Self {
        let event_type = match alert.level {
            AlertLevel::Info => ActivityEventType::Info,
            AlertLevel::Error => ActivityEventType::Error,
        };
        Self::new(event_type, format!("{}: {}", alert.title, alert.description))
    }

    pub fn icon(&self) -> &'static str {
        match self.event_type {
            ActivityEventType::Info => "ℹ️",
            ActivityEventType::Message => "💬",
            ActivityEventType::Warning => "⚠️",
            ActivityEventType::Error => "❌",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageThread;
    use crate::sync::RefreshTrigger;

    fn board() -> BoardSnapshot {
        BoardSnapshot::empty()
            .with_column(
                Column::New,
                vec![Task::new("C-1", "Fiber cut"), Task::new("C-2", "Router")],
            )
            .with_column(Column::Pending, vec![Task::new("C-3", "Splice")])
    }

    fn applied(board: BoardSnapshot, messages: MessageSnapshot) -> SyncEvent {
        SyncEvent::SnapshotApplied {
            trigger: RefreshTrigger::Scheduled,
            board,
            messages,
        }
    }

    #[test]
    fn test_snapshot_replaces_board_wholesale() {
        let mut state = AppState::new("ops");
        state.apply(SyncEvent::CycleStarted {
            trigger: RefreshTrigger::Scheduled,
        });
        assert!(state.refreshing);

        state.apply(applied(board(), MessageSnapshot::new()));
        assert!(!state.refreshing);
        assert_eq!(state.cards(Column::New).len(), 2);

        state.apply(applied(BoardSnapshot::empty(), MessageSnapshot::new()));
        assert!(state.cards(Column::New).is_empty());
        assert!(state.selected_task().is_none());
    }

    #[test]
    fn test_card_merges_side_tables() {
        let mut state = AppState::new("ops");
        let mut messages = MessageSnapshot::new();
        messages.insert(
            "C-1".into(),
            MessageThread {
                has_new_message: true,
                messages: vec![],
            },
        );
        state.apply(applied(board(), messages));
        state.apply(SyncEvent::AssignmentChanged {
            case_number: "C-1".into(),
            assignment: TaskAssignment {
                selected_worker: Some("alice".into()),
                is_applying: true,
            },
        });
        state.apply(SyncEvent::UploadStateChanged {
            case_number: "C-1".into(),
            state: UploadState::Polling,
        });

        let card = &state.cards(Column::New)[0];
        assert_eq!(card.selected_worker.as_deref(), Some("alice"));
        assert!(card.is_applying);
        assert!(card.has_new_message);
        assert_eq!(card.upload, UploadState::Polling);
        // the canonical task is untouched
        assert_eq!(state.board.tasks(Column::New)[0], Task::new("C-1", "Fiber cut"));

        state.apply(SyncEvent::AssignmentChanged {
            case_number: "C-1".into(),
            assignment: TaskAssignment::default(),
        });
        assert!(state.assignments.is_empty());
    }

    #[test]
    fn test_notification_dismiss_matches_id() {
        let mut state = AppState::new("ops");
        state.apply(SyncEvent::NotificationRaised {
            id: 1,
            message: "first".into(),
        });
        state.apply(SyncEvent::NotificationRaised {
            id: 2,
            message: "second".into(),
        });
        // stale dismiss for the replaced banner is ignored
        state.apply(SyncEvent::NotificationDismissed { id: 1 });
        assert_eq!(state.notification.as_ref().map(|n| n.id), Some(2));
        state.apply(SyncEvent::NotificationDismissed { id: 2 });
        assert!(state.notification.is_none());
    }

    #[test]
    fn test_next_worker_wraps() {
        let mut state = AppState::new("ops");
        assert_eq!(state.next_worker("C-1"), None);

        state.apply(SyncEvent::WorkersLoaded(vec!["alice".into(), "bob".into()]));
        assert_eq!(state.next_worker("C-1").as_deref(), Some("alice"));
        state.assignments.insert(
            "C-1".into(),
            TaskAssignment {
                selected_worker: Some("bob".into()),
                is_applying: false,
            },
        );
        assert_eq!(state.next_worker("C-1").as_deref(), Some("alice"));
    }

    #[test]
    fn test_selection_clamped_after_shrink() {
        let mut state = AppState::new("ops");
        state.apply(applied(board(), MessageSnapshot::new()));
        state.move_selection(5);
        assert_eq!(state.selected_task().unwrap().case_number, "C-2");

        let smaller =
            BoardSnapshot::empty().with_column(Column::New, vec![Task::new("C-1", "Fiber cut")]);
        state.apply(applied(smaller, MessageSnapshot::new()));
        assert_eq!(state.selected_task().unwrap().case_number, "C-1");
    }

    #[test]
    fn test_reload_keeps_activity_only() {
        let mut state = AppState::new("ops");
        state.apply(applied(board(), MessageSnapshot::new()));
        state.apply(SyncEvent::Alert(Alert::info("Technician assigned", "ok")));
        state.apply(SyncEvent::ReloadRequested);
        assert_eq!(state.status, SyncStatus::Reloading);

        state.reset_for_reload();
        assert_eq!(state.status, SyncStatus::Connecting);
        assert!(state.board.is_empty());
        assert_eq!(state.username, "ops");
        assert_eq!(state.events.len(), 2);
    }
}
