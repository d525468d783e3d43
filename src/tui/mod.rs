//! TUI Module - Task Board Dashboard
//!
//! Terminal front end for one sync session.
//!
//! Architecture:
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        UI LAYER (widgets/)                          │
//! │  Pure rendering. No business logic. Receives TaskCardView.          │
//! └─────────────────────────────────────────────────────────────────────┘
//!                               ▲
//!                               │ TaskCardView (derived)
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      DOMAIN LAYER (state.rs)                        │
//! │  AppState + Selectors. Folds SyncEvents into dashboard state.       │
//! └─────────────────────────────────────────────────────────────────────┘
//!                               ▲
//!                               │ SyncEvent stream
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       ENGINE LAYER (crate::sync)                    │
//! │  SyncEngine. Fetch, refresh, uploads, assignments.                  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

mod app;
mod events;
mod state;
mod theme;

pub mod widgets;

use std::sync::Arc;

pub use app::TuiApp;
pub use events::{handle_key_event, Action};
pub use state::{AppState, InputMode, SyncStatus, TaskCardView};
pub use theme::DashboardTheme;

use crate::backend::Backend;
use crate::config::SyncTimings;
use crate::session::{SessionContext, SessionGuard};

/// Run the dashboard until the user quits or logs out
pub async fn run(
    backend: Arc<dyn Backend>,
    guard: SessionGuard,
    context: SessionContext,
    timings: SyncTimings,
) -> anyhow::Result<()> {
    TuiApp::new(backend, guard, context, timings).run().await
}
