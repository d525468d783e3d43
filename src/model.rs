//! Board and message model
//!
//! Wire types for the task backend plus the snapshot containers the sync
//! engine replaces wholesale on every cycle. Field names on the wire follow
//! the backend's scraper output (`CaseNumber`, `Title`, ...).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Case numbers identify tasks across board, message and upload endpoints.
pub type CaseNumber = String;

// ─────────────────────────────────────────────────────────────────────────────
// Columns
// ─────────────────────────────────────────────────────────────────────────────

/// One of the three fixed task-status buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Column {
    #[serde(rename = "NEW")]
    New,
    #[serde(rename = "Pending")]
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
}

impl Column {
    /// Display order on the board
    pub const ALL: [Column; 3] = [Column::New, Column::Pending, Column::InProgress];

    /// Key used by the backend for this column
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Self::New => Self::Pending,
            Self::Pending => Self::InProgress,
            Self::InProgress => Self::New,
        }
    }

    pub fn prev(&self) -> Self {
        match self {
            Self::New => Self::InProgress,
            Self::Pending => Self::New,
            Self::InProgress => Self::Pending,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tasks
// ─────────────────────────────────────────────────────────────────────────────

/// A task as reported by the board endpoint.
///
/// Transient UI fields (selected worker, applying flag) live in
/// the assignment side-table, never here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "CaseNumber")]
    pub case_number: CaseNumber,
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "FBG", default)]
    pub fbg: String,
    #[serde(rename = "CreatedBy", default)]
    pub created_by: Option<String>,
    #[serde(rename = "AssignedTo", default)]
    pub assigned_to: Option<String>,
    #[serde(rename = "Date", default)]
    pub date: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
}

impl Task {
    /// Build a task with only the identifying fields set
    pub fn new(case_number: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            case_number: case_number.into(),
            title: title.into(),
            fbg: String::new(),
            created_by: None,
            assigned_to: None,
            date: None,
            uuid: None,
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// `CASE - Title` headline used by every renderer
    pub fn headline(&self) -> String {
        format!("{} - {}", self.case_number, self.title)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Board Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Full board state for one user.
///
/// Always carries exactly the three known columns; unknown keys coming from
/// the backend are dropped and missing ones default to empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    columns: BTreeMap<Column, Vec<Task>>,
}

impl Default for BoardSnapshot {
    fn default() -> Self {
        Self {
            columns: Column::ALL.iter().map(|c| (*c, Vec::new())).collect(),
        }
    }
}

impl BoardSnapshot {
    /// The empty board: every column present, no tasks
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from the raw `columns` object of `/check_new_tasks`
    pub fn from_wire(raw: BTreeMap<String, Vec<Task>>) -> Self {
        let mut board = Self::empty();
        for column in Column::ALL {
            if let Some(tasks) = raw.get(column.wire_name()) {
                board.set(column, tasks.clone());
            }
        }
        board
    }

    pub fn with_column(mut self, column: Column, tasks: Vec<Task>) -> Self {
        self.set(column, tasks);
        self
    }

    pub fn set(&mut self, column: Column, tasks: Vec<Task>) {
        self.columns.insert(column, tasks);
    }

    pub fn tasks(&self, column: Column) -> &[Task] {
        self.columns.get(&column).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when every column is empty
    pub fn is_empty(&self) -> bool {
        self.columns.values().all(Vec::is_empty)
    }

    pub fn total(&self) -> usize {
        self.columns.values().map(Vec::len).sum()
    }

    /// Find a task anywhere on the board by case number
    pub fn find(&self, case_number: &str) -> Option<(Column, &Task)> {
        Column::ALL.iter().find_map(|column| {
            self.tasks(*column)
                .iter()
                .find(|t| t.case_number == case_number)
                .map(|t| (*column, t))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (Column, &[Task])> {
        Column::ALL.into_iter().map(move |c| (c, self.tasks(c)))
    }
}

/// `/check_new_tasks` response body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardResponse {
    #[serde(default)]
    pub columns: Option<BTreeMap<String, Vec<Task>>>,
}

impl BoardResponse {
    pub fn into_snapshot(self) -> BoardSnapshot {
        self.columns
            .map(BoardSnapshot::from_wire)
            .unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// A single chat-style message attached to a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMessage {
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub date: String,
}

/// Message thread for one case
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageThread {
    #[serde(default)]
    pub has_new_message: bool,
    #[serde(default)]
    pub messages: Vec<TaskMessage>,
}

/// Message threads keyed by case number, replaced wholesale per refresh
pub type MessageSnapshot = BTreeMap<CaseNumber, MessageThread>;

/// `/check_task_messages` response body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub messages: Option<MessageSnapshot>,
}

impl MessagesResponse {
    pub fn into_snapshot(self) -> MessageSnapshot {
        self.messages.unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mutations and job status
// ─────────────────────────────────────────────────────────────────────────────

/// Shared reply shape of `/playwright_upload` and `/add_technician`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

impl MutationResponse {
    pub fn accepted() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            output: None,
        }
    }

    /// Server-provided explanation: `error`, then `output`, then a generic text
    pub fn failure_text(&self) -> String {
        self.error
            .as_deref()
            .or(self.output.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown error.")
            .to_string()
    }
}

/// `/upload_status` response body
#[derive(Debug, Clone, Deserialize)]
pub struct UploadStatusResponse {
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Backend-side processing state of an upload job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteJobStatus {
    Pending,
    Finished,
    Error(Option<String>),
    /// Any status string the client does not know; treated like pending
    Other(String),
}

impl From<UploadStatusResponse> for RemoteJobStatus {
    fn from(resp: UploadStatusResponse) -> Self {
        match resp.status.as_str() {
            "pending" => Self::Pending,
            "finished" => Self::Finished,
            "error" => Self::Error(resp.error),
            _ => Self::Other(resp.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_board_has_all_columns() {
        let board = BoardSnapshot::empty();
        assert!(board.is_empty());
        for column in Column::ALL {
            assert!(board.tasks(column).is_empty());
        }
        assert_eq!(board.iter().count(), 3);
    }

    #[test]
    fn test_board_response_parses_wire_names() {
        let body = json!({
            "columns": {
                "NEW": [{"CaseNumber": "C-1", "Title": "Fiber cut", "FBG": "FBG-7", "uuid": "u-1"}],
                "Pending": [],
                "In Progress": [{"CaseNumber": "C-2", "Title": "Router"}],
                "Closed": [{"CaseNumber": "C-3", "Title": "ignored"}]
            }
        });
        let resp: BoardResponse = serde_json::from_value(body).unwrap();
        let board = resp.into_snapshot();

        assert_eq!(board.tasks(Column::New).len(), 1);
        assert_eq!(board.tasks(Column::New)[0].uuid.as_deref(), Some("u-1"));
        assert_eq!(board.tasks(Column::InProgress)[0].case_number, "C-2");
        assert_eq!(board.total(), 2);
        assert!(board.find("C-3").is_none());
    }

    #[test]
    fn test_missing_columns_default_to_empty() {
        let resp: BoardResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(resp.into_snapshot(), BoardSnapshot::empty());

        let resp: BoardResponse =
            serde_json::from_value(json!({"columns": {"Pending": [{"CaseNumber": "C-9"}]}}))
                .unwrap();
        let board = resp.into_snapshot();
        assert_eq!(board.tasks(Column::Pending).len(), 1);
        assert!(board.tasks(Column::New).is_empty());
    }

    #[test]
    fn test_find_reports_column() {
        let board = BoardSnapshot::empty()
            .with_column(Column::Pending, vec![Task::new("C-5", "Splice")]);
        let (column, task) = board.find("C-5").unwrap();
        assert_eq!(column, Column::Pending);
        assert_eq!(task.headline(), "C-5 - Splice");
    }

    #[test]
    fn test_messages_response_defaults_flag() {
        let body = json!({
            "messages": {
                "C-1": {"has_new_message": true, "messages": [{"sender": "ops", "message": "hi", "date": "today"}]},
                "C-2": {"messages": []}
            }
        });
        let resp: MessagesResponse = serde_json::from_value(body).unwrap();
        let snapshot = resp.into_snapshot();
        assert!(snapshot["C-1"].has_new_message);
        assert!(!snapshot["C-2"].has_new_message);
        assert_eq!(snapshot["C-1"].messages[0].sender, "ops");
    }

    #[test]
    fn test_failure_text_precedence() {
        let both = MutationResponse {
            success: false,
            error: Some("bad file".into()),
            output: Some("trace".into()),
        };
        assert_eq!(both.failure_text(), "bad file");

        let output_only = MutationResponse {
            success: false,
            error: None,
            output: Some("playwright exited 1".into()),
        };
        assert_eq!(output_only.failure_text(), "playwright exited 1");

        assert_eq!(MutationResponse::default().failure_text(), "Unknown error.");
    }

    #[test]
    fn test_remote_status_mapping() {
        let finished = UploadStatusResponse {
            status: "finished".into(),
            error: None,
        };
        assert_eq!(RemoteJobStatus::from(finished), RemoteJobStatus::Finished);

        let error = UploadStatusResponse {
            status: "error".into(),
            error: Some("timeout".into()),
        };
        assert_eq!(
            RemoteJobStatus::from(error),
            RemoteJobStatus::Error(Some("timeout".into()))
        );

        let odd = UploadStatusResponse {
            status: "queued".into(),
            error: None,
        };
        assert_eq!(RemoteJobStatus::from(odd), RemoteJobStatus::Other("queued".into()));
    }

    #[test]
    fn test_column_cycle() {
        assert_eq!(Column::New.next(), Column::Pending);
        assert_eq!(Column::New.prev(), Column::InProgress);
        assert_eq!(format!("{}", Column::InProgress), "In Progress");
    }
}
