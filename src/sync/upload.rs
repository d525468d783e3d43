//! Upload job tracking
//!
//! Per case number: `Idle -> Uploading -> Polling -> Finished | Failed`.
//! A broken status channel fails the job instead of polling forever.
//! Starting a new upload for a case replaces the tracked job; the old one
//! is aborted and any late result it produces is ignored.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use super::events::{Alert, EventSink, SyncEvent, UploadState};
use super::fetcher::until_cancelled;
use super::tasks::TaskSet;
use crate::backend::{Backend, UploadRequest};
use crate::error::{FetchError, UploadStatusError, UploadSubmitError};
use crate::model::{CaseNumber, RemoteJobStatus};
use crate::session::Session;

/// Read a file for upload, keeping only its base name for the form
pub async fn read_upload_file(path: &Path) -> Result<(String, Vec<u8>), UploadSubmitError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| UploadSubmitError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok((file_name, bytes))
}

struct TrackedJob {
    generation: u64,
    state: UploadState,
    task: Option<AbortHandle>,
}

pub struct UploadJobTracker {
    backend: Arc<dyn Backend>,
    sink: EventSink,
    session: Session,
    poll_interval: Duration,
    jobs: DashMap<CaseNumber, TrackedJob>,
    generation: AtomicU64,
}

impl UploadJobTracker {
    pub fn new(
        backend: Arc<dyn Backend>,
        sink: EventSink,
        session: Session,
        poll_interval: Duration,
    ) -> Self {
        Self {
            backend,
            sink,
            session,
            poll_interval,
            jobs: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Current state; `Idle` when no job is tracked
    pub fn state(&self, case_number: &str) -> UploadState {
        self.jobs
            .get(case_number)
            .map(|job| job.state.clone())
            .unwrap_or_default()
    }

    /// Cases with a job in flight
    pub fn active(&self) -> Vec<(CaseNumber, UploadState)> {
        self.jobs
            .iter()
            .map(|job| (job.key().clone(), job.state.clone()))
            .collect()
    }

    /// Upload and poll to a terminal state on the current task.
    ///
    /// Returns `None` when cancelled or replaced by a newer upload.
    pub async fn run(
        &self,
        case_number: &str,
        file_name: String,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Option<UploadState> {
        let generation = self.register(case_number);
        self.drive(generation, case_number, file_name, bytes, cancel)
            .await
    }

    /// Start an upload in the background
    pub fn start(
        self: &Arc<Self>,
        tasks: &TaskSet,
        case_number: &str,
        file_name: String,
        bytes: Vec<u8>,
        cancel: CancellationToken,
    ) {
        let generation = self.register(case_number);
        let this = Arc::clone(self);
        let case = case_number.to_string();
        let handle = tasks.spawn(async move {
            this.drive(generation, &case, file_name, bytes, &cancel).await;
        });
        if let Some(mut job) = self.jobs.get_mut(case_number) {
            if job.generation == generation {
                job.task = Some(handle);
            }
        }
    }

    /// Abort every tracked job
    pub fn abort_all(&self) {
        for job in self.jobs.iter() {
            if let Some(task) = &job.task {
                task.abort();
            }
        }
        self.jobs.clear();
    }

    fn register(&self, case_number: &str) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = self.jobs.insert(
            case_number.to_string(),
            TrackedJob {
                generation,
                state: UploadState::Uploading,
                task: None,
            },
        );
        if let Some(previous) = previous {
            tracing::info!(case_number, "Replacing upload job");
            if let Some(task) = previous.task {
                task.abort();
            }
        }
        self.sink.emit(SyncEvent::UploadStateChanged {
            case_number: case_number.to_string(),
            state: UploadState::Uploading,
        });
        generation
    }

    /// Move a job to `state` if it is still the current generation
    fn transition(&self, case_number: &str, generation: u64, state: UploadState) -> bool {
        match self.jobs.get_mut(case_number) {
            Some(mut job) if job.generation == generation => {
                tracing::debug!(case_number, from = %job.state, to = %state, "Upload transition");
                job.state = state.clone();
            }
            _ => return false,
        }
        self.sink.emit(SyncEvent::UploadStateChanged {
            case_number: case_number.to_string(),
            state,
        });
        true
    }

    /// Surface a terminal state, then forget the job
    fn finish(
        &self,
        case_number: &str,
        generation: u64,
        state: UploadState,
        alert: Alert,
    ) -> Option<UploadState> {
        if !self.transition(case_number, generation, state.clone()) {
            return None;
        }
        self.sink.alert(alert);
        self.jobs
            .remove_if(case_number, |_, job| job.generation == generation);
        Some(state)
    }

    fn fail(
        &self,
        case_number: &str,
        generation: u64,
        title: &str,
        reason: String,
    ) -> Option<UploadState> {
        tracing::warn!(case_number, reason = %reason, "Upload failed");
        self.finish(
            case_number,
            generation,
            UploadState::Failed {
                reason: reason.clone(),
            },
            Alert::error(title, reason),
        )
    }

    async fn drive(
        &self,
        generation: u64,
        case_number: &str,
        file_name: String,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Option<UploadState> {
        let request = UploadRequest {
            file_name,
            bytes,
            username: self.session.username.clone(),
            password: self.session.password.clone().unwrap_or_default(),
            task_filter: case_number.to_string(),
        };

        tracing::info!(case_number, file = %request.file_name, "Submitting upload");
        let submitted = match until_cancelled(cancel, self.backend.submit_upload(request)).await {
            Ok(reply) if reply.success => Ok(()),
            Ok(reply) => Err(UploadSubmitError::Rejected {
                message: reply.failure_text(),
            }),
            Err(FetchError::Cancelled) => return None,
            Err(FetchError::Backend(e)) => Err(UploadSubmitError::Transport(e)),
        };
        if let Err(e) = submitted {
            let title = match &e {
                UploadSubmitError::Transport(_) => "Network error",
                _ => "Upload failed",
            };
            return self.fail(case_number, generation, title, e.user_message());
        }

        if !self.transition(case_number, generation, UploadState::Polling) {
            return None;
        }
        self.sink.alert(Alert::info(
            "Upload started",
            format!("Processing file for task {}.", case_number),
        ));

        // First poll right away, then one per interval
        loop {
            let status = until_cancelled(cancel, self.backend.upload_status(case_number)).await;
            match status {
                Err(FetchError::Cancelled) => return None,
                Err(FetchError::Backend(e)) => {
                    let err = UploadStatusError::Transport(e);
                    tracing::warn!(case_number, error = %err, "Upload status check failed");
                    return self.fail(
                        case_number,
                        generation,
                        "Upload status error",
                        err.user_message(),
                    );
                }
                Ok(RemoteJobStatus::Finished) => {
                    tracing::info!(case_number, "Upload finished");
                    return self.finish(
                        case_number,
                        generation,
                        UploadState::Finished,
                        Alert::info(
                            "Upload complete",
                            format!("File uploaded successfully for task {}.", case_number),
                        ),
                    );
                }
                Ok(RemoteJobStatus::Error(message)) => {
                    let reason = message
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| "Unknown error during upload.".to_string());
                    return self.fail(case_number, generation, "Upload failed", reason);
                }
                Ok(RemoteJobStatus::Pending) | Ok(RemoteJobStatus::Other(_)) => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockFailure};
    use crate::model::MutationResponse;

    fn tracker(
        backend: Arc<MockBackend>,
        cancel: &CancellationToken,
    ) -> (UploadJobTracker, tokio::sync::mpsc::UnboundedReceiver<SyncEvent>) {
        let (sink, rx) = EventSink::channel(cancel.clone());
        let session = Session::new("ops").with_password("pw");
        (
            UploadJobTracker::new(backend, sink, session, Duration::from_secs(5)),
            rx,
        )
    }

    fn alerts(rx: &mut tokio::sync::mpsc::UnboundedReceiver<SyncEvent>) -> Vec<Alert> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SyncEvent::Alert(alert) = event {
                out.push(alert);
            }
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_after_one_poll() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_status(Ok(RemoteJobStatus::Finished));
        let cancel = CancellationToken::new();
        let (tracker, mut rx) = tracker(backend.clone(), &cancel);

        let state = tracker.run("C-1", "a.pdf".into(), b"x".to_vec(), &cancel).await;
        assert_eq!(state, Some(UploadState::Finished));
        assert_eq!(tracker.state("C-1"), UploadState::Idle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.status_polls("C-1"), 1);

        let titles: Vec<String> = alerts(&mut rx).into_iter().map(|a| a.title).collect();
        assert_eq!(titles, vec!["Upload started", "Upload complete"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_network_failure_fails_closed() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_status(Err(MockFailure::Network));
        let cancel = CancellationToken::new();
        let (tracker, mut rx) = tracker(backend.clone(), &cancel);

        let state = tracker.run("C-1", "a.pdf".into(), vec![], &cancel).await;
        assert!(matches!(state, Some(UploadState::Failed { .. })));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.status_polls("C-1"), 1);

        let failures: Vec<Alert> = alerts(&mut rx).into_iter().filter(Alert::is_error).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].description, "Could not check upload status. Try again.");
    }

    #[tokio::test]
    async fn test_rejected_submission_never_polls() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_upload(Ok(MutationResponse {
            success: false,
            error: None,
            output: Some("login to portal failed".into()),
        }));
        let cancel = CancellationToken::new();
        let (tracker, mut rx) = tracker(backend.clone(), &cancel);

        let state = tracker.run("C-1", "a.pdf".into(), vec![], &cancel).await;
        assert_eq!(
            state,
            Some(UploadState::Failed {
                reason: "login to portal failed".into()
            })
        );
        assert_eq!(backend.status_polls("C-1"), 0);
        assert_eq!(alerts(&mut rx)[0].title, "Upload failed");
    }

    #[tokio::test]
    async fn test_submit_network_error() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_upload(Err(MockFailure::Network));
        let cancel = CancellationToken::new();
        let (tracker, mut rx) = tracker(backend.clone(), &cancel);

        tracker.run("C-1", "a.pdf".into(), vec![], &cancel).await;
        let alert = &alerts(&mut rx)[0];
        assert_eq!(alert.title, "Network error");
        assert_eq!(alert.description, "Could not reach backend. Try again.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_status_uses_server_text() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_status(Ok(RemoteJobStatus::Pending));
        backend.queue_status(Ok(RemoteJobStatus::Error(Some("portal timeout".into()))));
        let cancel = CancellationToken::new();
        let (tracker, _rx) = tracker(backend.clone(), &cancel);

        let state = tracker.run("C-1", "a.pdf".into(), vec![], &cancel).await;
        assert_eq!(
            state,
            Some(UploadState::Failed {
                reason: "portal timeout".into()
            })
        );
        assert_eq!(backend.status_polls("C-1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_upload_replaces_inflight_job() {
        let backend = Arc::new(MockBackend::new());
        let cancel = CancellationToken::new();
        let (tracker, _rx) = tracker(backend.clone(), &cancel);
        let tracker = Arc::new(tracker);
        let tasks = TaskSet::new();

        // first job keeps polling "pending"
        tracker.start(&tasks, "C-1", "old.pdf".into(), vec![], cancel.clone());
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(tracker.state("C-1"), UploadState::Polling);
        let polls_before = backend.status_polls("C-1");

        backend.queue_status(Ok(RemoteJobStatus::Finished));
        let state = tracker.run("C-1", "new.pdf".into(), vec![], &cancel).await;
        assert_eq!(state, Some(UploadState::Finished));

        // old job was aborted: no more polls
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.status_polls("C-1"), polls_before + 1);
        assert_eq!(tracker.state("C-1"), UploadState::Idle);
    }

    #[tokio::test]
    async fn test_read_upload_file_missing() {
        let err = read_upload_file(Path::new("/definitely/not/here.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadSubmitError::ReadFile { .. }));
    }
}
