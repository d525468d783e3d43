//! Snapshot fetcher
//!
//! Issues the two per-user reads (board, then messages) and degrades any
//! failed read to its empty snapshot. Stale data from an earlier cycle is
//! never carried over.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backend::Backend;
use crate::error::{BackendError, FetchError};
use crate::model::{BoardSnapshot, MessageSnapshot};

/// Board and messages from one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub board: BoardSnapshot,
    pub messages: MessageSnapshot,
}

impl Snapshot {
    pub fn new(board: BoardSnapshot, messages: MessageSnapshot) -> Self {
        Self { board, messages }
    }
}

/// Per-read results of one cycle
#[derive(Debug)]
pub struct FetchOutcome {
    pub board: Result<BoardSnapshot, FetchError>,
    pub messages: Result<MessageSnapshot, FetchError>,
}

impl FetchOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.board, Err(FetchError::Cancelled))
            || matches!(self.messages, Err(FetchError::Cancelled))
    }

    /// Collapse into a snapshot, replacing each failed read with empty state
    pub fn into_snapshot(self) -> Snapshot {
        Snapshot {
            board: self.board.unwrap_or_default(),
            messages: self.messages.unwrap_or_default(),
        }
    }
}

/// Race a backend call against cancellation
pub(crate) async fn until_cancelled<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, BackendError>>,
) -> Result<T, FetchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        res = call => res.map_err(FetchError::from),
    }
}

/// Stateless wrapper around the board and message reads
#[derive(Clone)]
pub struct SnapshotFetcher {
    backend: Arc<dyn Backend>,
}

impl SnapshotFetcher {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Run both reads. The board read is always issued first and the
    /// message read is attempted even when the board read failed.
    pub async fn fetch_outcome(&self, username: &str, cancel: &CancellationToken) -> FetchOutcome {
        let board = until_cancelled(cancel, self.backend.fetch_board(username)).await;
        if matches!(board, Err(FetchError::Cancelled)) {
            return FetchOutcome {
                board,
                messages: Err(FetchError::Cancelled),
            };
        }
        if let Err(e) = &board {
            tracing::warn!(username, error = %e, "Board read failed, showing empty board");
        }

        let messages = until_cancelled(cancel, self.backend.fetch_messages(username)).await;
        if let Err(e) = &messages {
            if !matches!(e, FetchError::Cancelled) {
                tracing::warn!(username, error = %e, "Message read failed, showing no messages");
            }
        }

        FetchOutcome { board, messages }
    }

    /// Fetch a snapshot with failed reads degraded to empty.
    ///
    /// Only cancellation is reported as an error; callers must not apply
    /// anything after it.
    pub async fn fetch(
        &self,
        username: &str,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, FetchError> {
        let outcome = self.fetch_outcome(username, cancel).await;
        if outcome.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let snapshot = outcome.into_snapshot();
        tracing::debug!(
            username,
            tasks = snapshot.board.total(),
            threads = snapshot.messages.len(),
            "Snapshot fetched"
        );
        Ok(snapshot)
    }
}
