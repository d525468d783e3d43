//! Worker assignment
//!
//! Selections and the applying flag live in a side table keyed by case
//! number; the board snapshot is never mutated. A successful assignment is
//! followed by a full reload after a short delay instead of a soft refresh.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use super::events::{Alert, EventSink, SyncEvent};
use super::fetcher::until_cancelled;
use crate::backend::{AssignRequest, Backend};
use crate::error::{AssignmentError, FetchError};
use crate::model::{CaseNumber, Task};

/// Transient UI state for one task card
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskAssignment {
    pub selected_worker: Option<String>,
    pub is_applying: bool,
}

pub struct AssignmentMutator {
    backend: Arc<dyn Backend>,
    sink: EventSink,
    reload_delay: Duration,
    table: DashMap<CaseNumber, TaskAssignment>,
}

impl AssignmentMutator {
    pub fn new(backend: Arc<dyn Backend>, sink: EventSink, reload_delay: Duration) -> Self {
        Self {
            backend,
            sink,
            reload_delay,
            table: DashMap::new(),
        }
    }

    pub fn assignment(&self, case_number: &str) -> TaskAssignment {
        self.table
            .get(case_number)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    pub fn select_worker(&self, case_number: &str, worker: impl Into<String>) {
        let snapshot = {
            let mut entry = self.table.entry(case_number.to_string()).or_default();
            entry.selected_worker = Some(worker.into());
            entry.clone()
        };
        self.changed(case_number, snapshot);
    }

    /// Validate and mark the task as applying.
    ///
    /// Runs before any network call; a missing worker is reported here
    /// and surfaced as an alert.
    pub fn begin(&self, task: &Task) -> Result<AssignRequest, AssignmentError> {
        let case_number = task.case_number.clone();
        let res = {
            let mut entry = self.table.entry(case_number.clone()).or_default();
            match (entry.selected_worker.clone(), entry.is_applying) {
                (_, true) => Err(AssignmentError::AlreadyApplying {
                    case_number: case_number.clone(),
                }),
                (None, _) => Err(AssignmentError::NoWorkerSelected {
                    case_number: case_number.clone(),
                }),
                (Some(worker_name), false) => {
                    let request = AssignRequest {
                        task_uuid: task.uuid.clone(),
                        worker_name,
                        case_number: case_number.clone(),
                    };
                    entry.is_applying = true;
                    Ok((request, entry.clone()))
                }
            }
        };

        match res {
            Ok((request, snapshot)) => {
                self.changed(&case_number, snapshot);
                Ok(request)
            }
            Err(e) => {
                if let AssignmentError::NoWorkerSelected { .. } = e {
                    self.sink
                        .alert(Alert::error("Worker not selected", e.user_message()));
                }
                Err(e)
            }
        }
    }

    /// Send a prepared assignment; on success schedule the reload
    pub async fn apply(
        &self,
        request: AssignRequest,
        cancel: &CancellationToken,
    ) -> Result<(), AssignmentError> {
        let case_number = request.case_number.clone();
        tracing::info!(case_number = %case_number, worker = %request.worker_name, "Assigning technician");

        let reply = match until_cancelled(cancel, self.backend.add_technician(&request)).await {
            Ok(reply) => reply,
            Err(FetchError::Cancelled) => return Ok(()),
            Err(FetchError::Backend(e)) => return Err(self.fail(&case_number, e.into())),
        };

        if !reply.success {
            let err = AssignmentError::Rejected {
                message: reply.failure_text(),
            };
            return Err(self.fail(&case_number, err));
        }

        self.sink.alert(Alert::info(
            "Technician assigned",
            format!(
                "Successfully assigned {} to task {}",
                request.worker_name, case_number
            ),
        ));

        // applying stays set until the reload replaces everything
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(self.reload_delay) => {
                self.sink.emit(SyncEvent::ReloadRequested);
            }
        }
        Ok(())
    }

    /// Validate and send in one go
    pub async fn submit(&self, task: &Task, cancel: &CancellationToken) -> Result<(), AssignmentError> {
        let request = self.begin(task)?;
        self.apply(request, cancel).await
    }

    /// Drop selections after a board replacement. In-flight assignments
    /// keep their entry until they resolve.
    pub fn on_board_replaced(&self) {
        let stale: Vec<CaseNumber> = self
            .table
            .iter()
            .filter(|entry| !entry.is_applying)
            .map(|entry| entry.key().clone())
            .collect();
        for case_number in stale {
            if self
                .table
                .remove_if(&case_number, |_, entry| !entry.is_applying)
                .is_some()
            {
                self.changed(&case_number, TaskAssignment::default());
            }
        }
    }

    fn fail(&self, case_number: &str, err: AssignmentError) -> AssignmentError {
        tracing::warn!(case_number, error = %err, "Assignment failed");
        let snapshot = self.table.get_mut(case_number).map(|mut entry| {
            entry.is_applying = false;
            entry.clone()
        });
        if let Some(snapshot) = snapshot {
            self.changed(case_number, snapshot);
        }
        self.sink
            .alert(Alert::error("Assignment failed", err.user_message()));
        err
    }

    fn changed(&self, case_number: &str, assignment: TaskAssignment) {
        self.sink.emit(SyncEvent::AssignmentChanged {
            case_number: case_number.to_string(),
            assignment,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockFailure};
    use crate::model::MutationResponse;

    fn mutator(
        backend: Arc<MockBackend>,
        cancel: &CancellationToken,
    ) -> (AssignmentMutator, tokio::sync::mpsc::UnboundedReceiver<SyncEvent>) {
        let (sink, rx) = EventSink::channel(cancel.clone());
        (
            AssignmentMutator::new(backend, sink, Duration::from_secs(3)),
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

    #[tokio::test]
    async fn test_missing_worker_never_calls_backend() {
        let backend = Arc::new(MockBackend::new());
        let cancel = CancellationToken::new();
        let (mutator, mut rx) = mutator(backend.clone(), &cancel);

        let err = mutator.begin(&Task::new("C-1", "Fiber cut")).unwrap_err();
        assert!(matches!(err, AssignmentError::NoWorkerSelected { .. }));
        assert_eq!(backend.call_count(), 0);
        assert!(!mutator.assignment("C-1").is_applying);

        let alerts = alerts(&mut rx);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "Worker not selected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_requests_reload_after_delay() {
        let backend = Arc::new(MockBackend::new());
        let cancel = CancellationToken::new();
        let (mutator, mut rx) = mutator(backend.clone(), &cancel);
        let task = Task::new("C-7", "Router").with_uuid("u-7");

        mutator.select_worker("C-7", "alice");
        let started = tokio::time::Instant::now();
        mutator.submit(&task, &cancel).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(3));

        let calls = backend.calls();
        assert!(matches!(
            &calls[0],
            crate::backend::BackendCall::AddTechnician(req)
                if req.task_uuid.as_deref() == Some("u-7") && req.worker_name == "alice"
        ));
        assert!(mutator.assignment("C-7").is_applying);

        let mut saw_reload = false;
        let mut saw_confirmation = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                SyncEvent::ReloadRequested => saw_reload = true,
                SyncEvent::Alert(alert) => {
                    saw_confirmation = alert.description == "Successfully assigned alice to task C-7"
                }
                _ => {}
            }
        }
        assert!(saw_reload && saw_confirmation);
    }

    #[tokio::test]
    async fn test_failure_clears_applying_with_server_text() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_assign(Ok(MutationResponse::rejected("worker busy")));
        backend.queue_assign(Err(MockFailure::Network));
        let cancel = CancellationToken::new();
        let (mutator, mut rx) = mutator(backend.clone(), &cancel);
        let task = Task::new("C-2", "Splice");

        mutator.select_worker("C-2", "bob");
        let err = mutator.submit(&task, &cancel).await.unwrap_err();
        assert!(matches!(err, AssignmentError::Rejected { ref message } if message == "worker busy"));
        assert!(!mutator.assignment("C-2").is_applying);

        // retry is allowed and surfaces the generic transport text
        let err = mutator.submit(&task, &cancel).await.unwrap_err();
        assert!(matches!(err, AssignmentError::Transport(_)));

        let alerts = alerts(&mut rx);
        assert_eq!(alerts[0].description, "worker busy");
        assert_eq!(alerts[1].description, "Could not reach backend. Try again.");
        assert!(alerts.iter().all(Alert::is_error));
    }

    #[tokio::test]
    async fn test_double_submit_rejected_while_applying() {
        let backend = Arc::new(MockBackend::new());
        let cancel = CancellationToken::new();
        let (mutator, _rx) = mutator(backend, &cancel);
        let task = Task::new("C-3", "Pole");

        mutator.select_worker("C-3", "carol");
        mutator.begin(&task).unwrap();
        assert!(matches!(
            mutator.begin(&task),
            Err(AssignmentError::AlreadyApplying { .. })
        ));
    }

    #[test]
    fn test_board_replacement_drops_idle_selections() {
        let cancel = CancellationToken::new();
        let (mutator, _rx) = mutator(Arc::new(MockBackend::new()), &cancel);

        mutator.select_worker("C-1", "alice");
        mutator.select_worker("C-2", "bob");
        mutator.begin(&Task::new("C-2", "x")).unwrap();

        mutator.on_board_replaced();
        assert_eq!(mutator.assignment("C-1"), TaskAssignment::default());
        assert!(mutator.assignment("C-2").is_applying);
    }
}
