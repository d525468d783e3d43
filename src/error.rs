//! Error types with fix suggestions
//!
//! Error code ranges:
//! - FMS-000-009: Session / configuration errors
//! - FMS-010-019: Snapshot read errors
//! - FMS-020-029: Upload errors
//! - FMS-030-039: Assignment errors
//! - FMS-090-099: IO errors

use thiserror::Error;

use crate::model::CaseNumber;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Failure talking to the task backend
#[derive(Error, Debug)]
pub enum BackendError {
    /// Network, DNS, TLS or body-read failure
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Backend answered with a non-2xx status
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Body did not match the expected shape
    #[error("malformed response: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Domain taxonomy
// ─────────────────────────────────────────────────────────────────────────────

/// A board or message read failed
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("{0}")]
    Backend(#[from] BackendError),

    /// The session's cancellation token fired mid-request
    #[error("fetch cancelled")]
    Cancelled,
}

/// Upload submission did not start a job
#[derive(Error, Debug)]
pub enum UploadSubmitError {
    #[error("cannot read '{path}': {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Transport(#[from] BackendError),

    /// Backend answered `success: false`
    #[error("{message}")]
    Rejected { message: String },
}

impl UploadSubmitError {
    /// Text surfaced to the operator
    pub fn user_message(&self) -> String {
        match self {
            Self::ReadFile { path, .. } => format!("Could not read {}.", path),
            Self::Transport(_) => "Could not reach backend. Try again.".to_string(),
            Self::Rejected { message } => message.clone(),
        }
    }
}

/// Upload status channel broke while polling
#[derive(Error, Debug)]
pub enum UploadStatusError {
    #[error("status check failed: {0}")]
    Transport(#[from] BackendError),
}

impl UploadStatusError {
    pub fn user_message(&self) -> String {
        "Could not check upload status. Try again.".to_string()
    }
}

/// Worker assignment failed
#[derive(Error, Debug)]
pub enum AssignmentError {
    #[error("no worker selected for task {case_number}")]
    NoWorkerSelected { case_number: CaseNumber },

    #[error("assignment for task {case_number} already in flight")]
    AlreadyApplying { case_number: CaseNumber },

    #[error("task {case_number} is not on the board")]
    UnknownTask { case_number: CaseNumber },

    #[error("{0}")]
    Transport(#[from] BackendError),

    #[error("{message}")]
    Rejected { message: String },
}

impl AssignmentError {
    pub fn user_message(&self) -> String {
        match self {
            Self::NoWorkerSelected { .. } => "Please select a worker before assigning.".to_string(),
            Self::AlreadyApplying { .. } => "Assignment already in progress.".to_string(),
            Self::UnknownTask { case_number } => format!("Task {} is not on the board.", case_number),
            Self::Transport(_) => "Could not reach backend. Try again.".to_string(),
            Self::Rejected { message } => message.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Top-level
// ─────────────────────────────────────────────────────────────────────────────

/// Errors surfaced by the CLI
#[derive(Error, Debug)]
pub enum FmsError {
    #[error("FMS-001: Not logged in")]
    NotLoggedIn,

    #[error("FMS-002: Invalid username or password")]
    LoginRejected,

    #[error("FMS-003: Server error during login: {0}")]
    LoginUnavailable(BackendError),

    #[error("FMS-004: Configuration error: {reason}")]
    Config { reason: String },

    #[error("FMS-010: Snapshot read failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("FMS-020: Upload failed: {0}")]
    UploadSubmit(#[from] UploadSubmitError),

    #[error("FMS-021: Upload status unavailable: {0}")]
    UploadStatus(#[from] UploadStatusError),

    #[error("FMS-022: Upload for {case_number} failed: {message}")]
    UploadJobFailed {
        case_number: CaseNumber,
        message: String,
    },

    #[error("FMS-030: Assignment failed: {0}")]
    Assignment(#[from] AssignmentError),

    #[error("FMS-090: IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FixSuggestion for FmsError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            FmsError::NotLoggedIn => Some("Run `fms login --username <name>` first"),
            FmsError::LoginRejected => Some("Check the username and password"),
            FmsError::LoginUnavailable(_) => Some("Check api_url and that the backend is running"),
            FmsError::Config { .. } => Some("Fix config.toml or set FMS_API_URL"),
            FmsError::Fetch(_) => Some("Check api_url and that the backend is running"),
            FmsError::UploadSubmit(UploadSubmitError::ReadFile { .. }) => {
                Some("Check file path and permissions")
            }
            FmsError::UploadSubmit(_) | FmsError::UploadJobFailed { .. } => {
                Some("Retry the upload; the backend job may need a fresh login")
            }
            FmsError::UploadStatus(_) => Some("The job may still be running; check the board later"),
            FmsError::Assignment(AssignmentError::NoWorkerSelected { .. }) => {
                Some("Pass --worker <name> (see `fms workers`)")
            }
            FmsError::Assignment(AssignmentError::UnknownTask { .. }) => {
                Some("Run `fms board` to list case numbers")
            }
            FmsError::Assignment(_) => None,
            FmsError::Io(_) => Some("Check file path and permissions"),
        }
    }
}
