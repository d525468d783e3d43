//! Mock backend for testing
//!
//! Returns scripted replies without network access and records every call.
//! Each endpoint has a FIFO queue; once it drains, the endpoint's default
//! reply is used.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AssignRequest, Backend, UploadRequest};
use crate::error::BackendError;
use crate::model::{BoardSnapshot, MessageSnapshot, MutationResponse, RemoteJobStatus};

/// Failure modes a scripted reply can simulate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Connection refused
    Network,
    /// Non-2xx status without a usable body
    Status(u16),
    /// Body that does not decode
    Malformed,
}

impl MockFailure {
    fn into_error(self) -> BackendError {
        match self {
            Self::Network => BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused (mock)",
            )),
            Self::Status(status) => BackendError::Status {
                status,
                body: "mock failure".to_string(),
            },
            Self::Malformed => BackendError::Decode("expected value at line 1 column 1".to_string()),
        }
    }
}

/// One recorded backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    FetchBoard { username: String },
    FetchMessages { username: String },
    SubmitUpload { case_number: String, file_name: String },
    UploadStatus { case_number: String },
    AddTechnician(AssignRequest),
    ListWorkers,
    Login { username: String },
}

struct Scripted<T> {
    reply: Result<T, MockFailure>,
    delay: Duration,
}

struct Endpoint<T> {
    queue: VecDeque<Scripted<T>>,
    default: Result<T, MockFailure>,
}

impl<T: Clone> Endpoint<T> {
    fn new(default: T) -> Self {
        Self {
            queue: VecDeque::new(),
            default: Ok(default),
        }
    }

    fn next(&mut self) -> (Result<T, MockFailure>, Duration) {
        match self.queue.pop_front() {
            Some(s) => (s.reply, s.delay),
            None => (self.default.clone(), Duration::ZERO),
        }
    }
}

/// Mock backend that returns predefined replies
pub struct MockBackend {
    board: Mutex<Endpoint<BoardSnapshot>>,
    messages: Mutex<Endpoint<MessageSnapshot>>,
    upload: Mutex<Endpoint<MutationResponse>>,
    status: Mutex<Endpoint<RemoteJobStatus>>,
    assign: Mutex<Endpoint<MutationResponse>>,
    workers: Mutex<Endpoint<Vec<String>>>,
    /// Accepted `(username, password)` pairs
    credentials: Mutex<Vec<(String, String)>>,
    /// Track all calls made (for assertions)
    calls: Mutex<Vec<BackendCall>>,
}

impl MockBackend {
    /// Empty board, no messages, every mutation accepted, jobs stay pending
    pub fn new() -> Self {
        Self {
            board: Mutex::new(Endpoint::new(BoardSnapshot::empty())),
            messages: Mutex::new(Endpoint::new(MessageSnapshot::new())),
            upload: Mutex::new(Endpoint::new(MutationResponse::accepted())),
            status: Mutex::new(Endpoint::new(RemoteJobStatus::Pending)),
            assign: Mutex::new(Endpoint::new(MutationResponse::accepted())),
            workers: Mutex::new(Endpoint::new(Vec::new())),
            credentials: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scripting
    // ─────────────────────────────────────────────────────────────────────

    /// Board returned once the queue is drained
    pub fn with_default_board(self, board: BoardSnapshot) -> Self {
        self.board.lock().default = Ok(board);
        self
    }

    pub fn with_default_messages(self, messages: MessageSnapshot) -> Self {
        self.messages.lock().default = Ok(messages);
        self
    }

    pub fn with_workers(self, workers: Vec<String>) -> Self {
        self.workers.lock().default = Ok(workers);
        self
    }

    pub fn with_workers_failure(self, failure: MockFailure) -> Self {
        self.workers.lock().default = Err(failure);
        self
    }

    pub fn with_credentials(self, username: &str, password: &str) -> Self {
        self.credentials
            .lock()
            .push((username.to_string(), password.to_string()));
        self
    }

    pub fn queue_board(&self, reply: Result<BoardSnapshot, MockFailure>) {
        self.queue_board_delayed(reply, Duration::ZERO);
    }

    /// Queue a board reply that resolves after `delay`
    pub fn queue_board_delayed(&self, reply: Result<BoardSnapshot, MockFailure>, delay: Duration) {
        self.board.lock().queue.push_back(Scripted { reply, delay });
    }

    pub fn queue_messages(&self, reply: Result<MessageSnapshot, MockFailure>) {
        self.messages.lock().queue.push_back(Scripted {
            reply,
            delay: Duration::ZERO,
        });
    }

    pub fn queue_upload(&self, reply: Result<MutationResponse, MockFailure>) {
        self.upload.lock().queue.push_back(Scripted {
            reply,
            delay: Duration::ZERO,
        });
    }

    pub fn queue_status(&self, reply: Result<RemoteJobStatus, MockFailure>) {
        self.status.lock().queue.push_back(Scripted {
            reply,
            delay: Duration::ZERO,
        });
    }

    pub fn queue_assign(&self, reply: Result<MutationResponse, MockFailure>) {
        self.assign.lock().queue.push_back(Scripted {
            reply,
            delay: Duration::ZERO,
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Assertions
    // ─────────────────────────────────────────────────────────────────────

    /// Get all calls made to this backend
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn board_fetches(&self) -> usize {
        self.count(|c| matches!(c, BackendCall::FetchBoard { .. }))
    }

    pub fn message_fetches(&self) -> usize {
        self.count(|c| matches!(c, BackendCall::FetchMessages { .. }))
    }

    pub fn status_polls(&self, case_number: &str) -> usize {
        self.count(|c| matches!(c, BackendCall::UploadStatus { case_number: n } if n == case_number))
    }

    pub fn assign_calls(&self) -> usize {
        self.count(|c| matches!(c, BackendCall::AddTechnician(_)))
    }

    /// Clear all recorded calls
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn count(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().push(call);
    }

    async fn resolve<T>(reply: (Result<T, MockFailure>, Duration)) -> Result<T, BackendError> {
        let (reply, delay) = reply;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        reply.map_err(MockFailure::into_error)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn fetch_board(&self, username: &str) -> Result<BoardSnapshot, BackendError> {
        self.record(BackendCall::FetchBoard {
            username: username.to_string(),
        });
        let reply = self.board.lock().next();
        Self::resolve(reply).await
    }

    async fn fetch_messages(&self, username: &str) -> Result<MessageSnapshot, BackendError> {
        self.record(BackendCall::FetchMessages {
            username: username.to_string(),
        });
        let reply = self.messages.lock().next();
        Self::resolve(reply).await
    }

    async fn submit_upload(&self, request: UploadRequest) -> Result<MutationResponse, BackendError> {
        self.record(BackendCall::SubmitUpload {
            case_number: request.task_filter.clone(),
            file_name: request.file_name.clone(),
        });
        let reply = self.upload.lock().next();
        Self::resolve(reply).await
    }

    async fn upload_status(&self, case_number: &str) -> Result<RemoteJobStatus, BackendError> {
        self.record(BackendCall::UploadStatus {
            case_number: case_number.to_string(),
        });
        let reply = self.status.lock().next();
        Self::resolve(reply).await
    }

    async fn add_technician(
        &self,
        request: &AssignRequest,
    ) -> Result<MutationResponse, BackendError> {
        self.record(BackendCall::AddTechnician(request.clone()));
        let reply = self.assign.lock().next();
        Self::resolve(reply).await
    }

    async fn list_workers(&self) -> Result<Vec<String>, BackendError> {
        self.record(BackendCall::ListWorkers);
        let reply = self.workers.lock().next();
        Self::resolve(reply).await
    }

    async fn login(&self, username: &str, password: &str) -> Result<bool, BackendError> {
        self.record(BackendCall::Login {
            username: username.to_string(),
        });
        Ok(self
            .credentials
            .lock()
            .iter()
            .any(|(u, p)| u == username && p == password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, Task};

    #[tokio::test]
    async fn test_queue_then_default() {
        let backend = MockBackend::new();
        let board = BoardSnapshot::empty().with_column(Column::New, vec![Task::new("C-1", "a")]);
        backend.queue_board(Ok(board.clone()));
        backend.queue_board(Err(MockFailure::Status(502)));

        assert_eq!(backend.fetch_board("ops").await.unwrap(), board);
        assert!(matches!(
            backend.fetch_board("ops").await,
            Err(BackendError::Status { status: 502, .. })
        ));
        assert!(backend.fetch_board("ops").await.unwrap().is_empty());
        assert_eq!(backend.board_fetches(), 3);
    }

    #[tokio::test]
    async fn test_login_checks_credentials() {
        let backend = MockBackend::new().with_credentials("ops", "secret");
        assert!(backend.login("ops", "secret").await.unwrap());
        assert!(!backend.login("ops", "wrong").await.unwrap());
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_records_status_polls_per_case() {
        let backend = MockBackend::new();
        backend.queue_status(Ok(RemoteJobStatus::Finished));
        assert_eq!(
            backend.upload_status("C-1").await.unwrap(),
            RemoteJobStatus::Finished
        );
        assert_eq!(
            backend.upload_status("C-2").await.unwrap(),
            RemoteJobStatus::Pending
        );
        assert_eq!(backend.status_polls("C-1"), 1);
        assert_eq!(backend.status_polls("C-2"), 1);

        backend.clear_calls();
        assert_eq!(backend.call_count(), 0);
    }
}
