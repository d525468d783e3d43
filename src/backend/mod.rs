//! # Backend Abstraction Layer
//!
//! Trait and implementations for the task backend.
//!
//! ## Overview
//!
//! - [`Backend`] - one async method per backend endpoint
//! - [`HttpBackend`] - production implementation over `reqwest`
//! - [`MockBackend`] - scripted replies plus a call log, for tests and demos
//!
//! | Endpoint | Method | Trait method |
//! |----------|--------|--------------|
//! | `/check_new_tasks?username=` | GET | [`Backend::fetch_board`] |
//! | `/check_task_messages?username=` | GET | [`Backend::fetch_messages`] |
//! | `/playwright_upload` | POST multipart | [`Backend::submit_upload`] |
//! | `/upload_status?case_number=` | GET | [`Backend::upload_status`] |
//! | `/add_technician` | POST JSON | [`Backend::add_technician`] |
//! | `/api/workers` | GET | [`Backend::list_workers`] |
//! | `/login` | POST JSON | [`Backend::login`] |
//!
//! Implementations are cancellation-agnostic: callers race every call
//! against the session's `CancellationToken` and drop the future on cancel.

mod http;
mod mock;

pub use http::HttpBackend;
pub use mock::{BackendCall, MockBackend, MockFailure};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::BackendError;
use crate::model::{BoardSnapshot, MessageSnapshot, MutationResponse, RemoteJobStatus};

/// Connector to the task backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Read the task board for a user
    async fn fetch_board(&self, username: &str) -> Result<BoardSnapshot, BackendError>;

    /// Read message threads for a user's tasks
    async fn fetch_messages(&self, username: &str) -> Result<MessageSnapshot, BackendError>;

    /// Submit a file for a task. A non-2xx reply that still carries a JSON
    /// body is returned as `Ok` with `success: false`.
    async fn submit_upload(&self, request: UploadRequest) -> Result<MutationResponse, BackendError>;

    /// Query the processing state of the upload job for a case
    async fn upload_status(&self, case_number: &str) -> Result<RemoteJobStatus, BackendError>;

    /// Assign a worker to a task
    async fn add_technician(&self, request: &AssignRequest)
        -> Result<MutationResponse, BackendError>;

    /// Worker roster
    async fn list_workers(&self) -> Result<Vec<String>, BackendError>;

    /// Check credentials; `Ok(false)` means rejected
    async fn login(&self, username: &str, password: &str) -> Result<bool, BackendError>;
}

/// Multipart payload for `/playwright_upload`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub username: String,
    pub password: String,
    /// Case number the backend job should target
    pub task_filter: String,
}

/// JSON body for `/add_technician`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignRequest {
    pub task_uuid: Option<String>,
    pub worker_name: String,
    pub case_number: String,
}

/// JSON body for `/login`
#[derive(Debug, Clone, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}
