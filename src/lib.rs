//! FMS Controller - task board sync engine and terminal dashboard

pub mod backend;
pub mod config;
pub mod error;
pub mod model;
pub mod session;
pub mod sync;
pub mod tui;

pub use backend::{Backend, HttpBackend, MockBackend};
pub use config::{FmsConfig, SyncTimings};
pub use error::{FixSuggestion, FmsError};
pub use model::{BoardSnapshot, Column, MessageSnapshot, Task};
pub use session::{Session, SessionContext, SessionGuard, SessionStore};
pub use sync::{Alert, SyncEngine, SyncEvent, UploadState};
