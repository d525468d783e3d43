//! # Sync Engine
//!
//! Keeps a dashboard in step with the task backend for one session.
//!
//! ## Components
//!
//! - [`SnapshotFetcher`] - board + messages read, failures degrade to empty
//! - [`BootstrapPoller`] - retries an empty first board a few times
//! - [`RefreshScheduler`] - countdown + periodic refresh after bootstrap
//! - [`MessageNotificationTracker`] - one banner per cycle with new messages
//! - [`UploadJobTracker`] - per-case upload state machine
//! - [`AssignmentMutator`] - worker assignment with reload on success
//!
//! Everything reports through [`SyncEvent`]s. Every background task is owned
//! by the engine and observes its cancellation token; after [`SyncEngine::shutdown`]
//! no request is issued, no timer fires and no event is delivered.

mod assign;
mod bootstrap;
mod events;
mod fetcher;
mod notify;
mod refresh;
mod tasks;
mod upload;

pub use assign::{AssignmentMutator, TaskAssignment};
pub use bootstrap::BootstrapPoller;
pub use events::{
    Alert, AlertLevel, BootstrapOutcome, EventSink, RefreshTrigger, SyncEvent,
    UploadState,
};
pub use fetcher::{FetchOutcome, Snapshot, SnapshotFetcher};
pub use notify::{flagged_cases, notification_text, MessageNotificationTracker, NotificationEvent};
pub use refresh::RefreshScheduler;
pub use tasks::TaskSet;
pub use upload::{read_upload_file, UploadJobTracker};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::Backend;
use crate::config::SyncTimings;
use crate::error::AssignmentError;
use crate::model::Task;
use crate::session::SessionContext;

/// Grace period for background tasks on shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared by every task the engine spawns
struct EngineCore {
    username: String,
    backend: Arc<dyn Backend>,
    timings: SyncTimings,
    sink: EventSink,
    cancel: CancellationToken,
    fetcher: SnapshotFetcher,
    scheduler: RefreshScheduler,
    notifier: MessageNotificationTracker,
    uploads: Arc<UploadJobTracker>,
    assignments: AssignmentMutator,
}

impl EngineCore {
    /// Apply a resolved snapshot. Resolution order wins: a slow cycle that
    /// resolves after a faster one replaces it.
    fn apply(&self, trigger: RefreshTrigger, snapshot: Snapshot) {
        if self.cancel.is_cancelled() {
            return;
        }
        let Snapshot { board, messages } = snapshot;
        self.notifier.observe(&messages, &self.cancel);
        self.sink.emit(SyncEvent::SnapshotApplied {
            trigger,
            board,
            messages,
        });
        self.assignments.on_board_replaced();
    }

    async fn cycle(&self, trigger: RefreshTrigger) {
        self.sink.emit(SyncEvent::CycleStarted { trigger });
        if let Ok(snapshot) = self.fetcher.fetch(&self.username, &self.cancel).await {
            self.apply(trigger, snapshot);
        }
    }

    async fn load_workers(&self) {
        let workers = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            res = self.backend.list_workers() => res,
        };
        let workers = workers.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Worker roster unavailable");
            Vec::new()
        });
        self.sink.emit(SyncEvent::WorkersLoaded(workers));
    }
}

/// One sync session
pub struct SyncEngine {
    core: Arc<EngineCore>,
    tasks: TaskSet,
    started: AtomicBool,
}

impl SyncEngine {
    /// Build an engine bound to the session. Nothing runs until [`start`](Self::start).
    pub fn new(
        backend: Arc<dyn Backend>,
        context: &SessionContext,
        timings: SyncTimings,
    ) -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let cancel = context.child_token();
        let (sink, rx) = EventSink::channel(cancel.clone());
        let tasks = TaskSet::new();

        let core = EngineCore {
            username: context.username().to_string(),
            fetcher: SnapshotFetcher::new(backend.clone()),
            scheduler: RefreshScheduler::from_timings(&timings, sink.clone()),
            notifier: MessageNotificationTracker::new(
                sink.clone(),
                tasks.clone(),
                timings.notification_ttl,
            ),
            uploads: Arc::new(UploadJobTracker::new(
                backend.clone(),
                sink.clone(),
                context.session().clone(),
                timings.upload_poll_interval,
            )),
            assignments: AssignmentMutator::new(backend.clone(), sink.clone(), timings.reload_delay),
            backend,
            timings,
            sink,
            cancel,
        };

        let engine = Self {
            core: Arc::new(core),
            tasks,
            started: AtomicBool::new(false),
        };
        (engine, rx)
    }

    /// Load the roster, bootstrap, then hand over to the refresh scheduler.
    /// Calling it twice has no effect.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(username = %self.core.username, "Sync session starting");

        let core = self.core.clone();
        let tasks = self.tasks.clone();
        self.tasks.spawn(async move {
            core.load_workers().await;

            core.sink.emit(SyncEvent::CycleStarted {
                trigger: RefreshTrigger::Bootstrap,
            });
            let poller = BootstrapPoller::from_timings(core.fetcher.clone(), &core.timings);
            let outcome = poller
                .run(&core.username, &core.cancel, |_, snapshot| {
                    core.apply(RefreshTrigger::Bootstrap, snapshot)
                })
                .await;
            tracing::info!(outcome = %outcome, "Bootstrap finished");
            core.sink.emit(SyncEvent::BootstrapFinished(outcome));

            if core.cancel.is_cancelled() {
                return;
            }

            // Countdown and refresh start together
            let countdown = core.clone();
            tasks.spawn(async move {
                countdown
                    .scheduler
                    .run_countdown(countdown.cancel.clone())
                    .await
            });
            let refresh = core.clone();
            tasks.spawn(async move {
                refresh
                    .scheduler
                    .run_refresh(refresh.cancel.clone(), || {
                        refresh.cycle(RefreshTrigger::Scheduled)
                    })
                    .await
            });
        });
    }

    /// Out-of-band refresh; the periodic timer keeps its phase
    pub fn refresh_now(&self) {
        if !self.is_running() {
            return;
        }
        let core = self.core.clone();
        self.tasks
            .spawn(async move { core.cycle(RefreshTrigger::Manual).await });
    }

    /// Upload bytes for a case in the background
    pub fn upload(&self, case_number: &str, file_name: String, bytes: Vec<u8>) {
        if !self.is_running() {
            return;
        }
        self.core.uploads.start(
            &self.tasks,
            case_number,
            file_name,
            bytes,
            self.core.cancel.clone(),
        );
    }

    /// Read a file and upload it for a case in the background
    pub fn upload_file(&self, case_number: &str, path: PathBuf) {
        if !self.is_running() {
            return;
        }
        let core = self.core.clone();
        let tasks = self.tasks.clone();
        let case_number = case_number.to_string();
        self.tasks.spawn(async move {
            match read_upload_file(&path).await {
                Ok((file_name, bytes)) => {
                    core.uploads
                        .start(&tasks, &case_number, file_name, bytes, core.cancel.clone());
                }
                Err(e) => {
                    tracing::warn!(case_number = %case_number, error = %e, "Upload file unreadable");
                    core.sink.alert(Alert::error("Upload failed", e.user_message()));
                }
            }
        });
    }

    pub fn select_worker(&self, case_number: &str, worker: impl Into<String>) {
        self.core.assignments.select_worker(case_number, worker);
    }

    /// Assign the selected worker to a task.
    ///
    /// Validation happens before returning; the request itself runs in the
    /// background. Ignored once the engine has stopped.
    pub fn assign(&self, task: &Task) -> Result<(), AssignmentError> {
        if !self.is_running() {
            return Ok(());
        }
        let request = self.core.assignments.begin(task)?;
        let core = self.core.clone();
        self.tasks.spawn(async move {
            // failures are surfaced as alerts by the mutator
            let _ = core.assignments.apply(request, &core.cancel).await;
        });
        Ok(())
    }

    pub fn assignment(&self, case_number: &str) -> TaskAssignment {
        self.core.assignments.assignment(case_number)
    }

    pub fn upload_state(&self, case_number: &str) -> UploadState {
        self.core.uploads.state(case_number)
    }

    /// Seconds until the next scheduled refresh
    pub fn countdown(&self) -> u64 {
        self.core.scheduler.remaining()
    }

    pub fn is_running(&self) -> bool {
        !self.core.cancel.is_cancelled()
    }

    /// Cancel every request and timer, then wait for all tasks to stop
    pub async fn shutdown(&self) {
        if self.is_running() {
            tracing::info!(username = %self.core.username, "Sync session stopping");
        }
        self.core.cancel.cancel();
        self.core.notifier.clear();
        self.core.uploads.abort_all();
        self.tasks.drain(SHUTDOWN_TIMEOUT).await;
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.core.cancel.cancel();
        self.tasks.abort_all();
    }
}
