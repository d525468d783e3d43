//! Session identity and lifecycle
//!
//! The identity persists in `<config_dir>/session.toml` between runs. A
//! [`SessionContext`] is created when a dashboard session starts and owns
//! the cancellation root every sync task derives from; tearing it down
//! aborts all in-flight requests and timers.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::backend::Backend;
use crate::config::FmsConfig;
use crate::error::FmsError;

/// File name of the persisted identity
pub const SESSION_FILE: &str = "session.toml";

/// Logged-in operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
    /// Forwarded to the upload endpoint, which re-authenticates upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Session {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Persisted identity
// ─────────────────────────────────────────────────────────────────────────────

/// Reads and writes the persisted identity
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store inside a config directory
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SESSION_FILE),
        }
    }

    /// Store in [`FmsConfig::config_dir`]
    pub fn default_location() -> Self {
        Self::new(FmsConfig::config_dir())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored identity, or `None` when absent or unusable
    pub fn load(&self) -> Option<Session> {
        let content = fs::read_to_string(&self.path).ok()?;
        match toml::from_str::<Session>(&content) {
            Ok(session) if !session.username.trim().is_empty() => Some(session),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring unreadable session file");
                None
            }
        }
    }

    pub fn save(&self, session: &Session) -> Result<(), FmsError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(session).map_err(|e| FmsError::Config {
            reason: format!("Failed to serialize session: {}", e),
        })?;
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            // owner-only from the moment the file exists
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;

        // a file left by an older version keeps its mode on open
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(content.as_bytes())?;
        Ok(())
    }

    /// Remove the identity; a missing file is not an error
    pub fn clear(&self) -> Result<(), FmsError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session context
// ─────────────────────────────────────────────────────────────────────────────

/// Identity plus the cancellation root of one sync session
#[derive(Debug, Clone)]
pub struct SessionContext {
    session: Session,
    cancel: CancellationToken,
}

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            cancel: CancellationToken::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn username(&self) -> &str {
        &self.session.username
    }

    pub fn password(&self) -> &str {
        self.session.password.as_deref().unwrap_or_default()
    }

    /// Root token; fires on teardown
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Token for one dependent task, cancelled with the session
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Cancel every dependent task. Idempotent.
    pub fn teardown(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(username = %self.session.username, "Session teardown");
        }
        self.cancel.cancel();
    }

    /// Same identity, fresh cancellation root (used for reloads)
    pub fn renew(&self) -> Self {
        Self::new(self.session.clone())
    }
}

/// Gates the dashboard on a stored identity
#[derive(Debug, Clone)]
pub struct SessionGuard {
    store: SessionStore,
}

impl SessionGuard {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Start a session from the stored identity
    pub fn enter(&self) -> Result<SessionContext, FmsError> {
        self.store
            .load()
            .map(SessionContext::new)
            .ok_or(FmsError::NotLoggedIn)
    }

    /// Check credentials against the backend and persist the identity
    pub async fn login(
        &self,
        backend: &dyn Backend,
        username: &str,
        password: &str,
    ) -> Result<SessionContext, FmsError> {
        let accepted = backend
            .login(username, password)
            .await
            .map_err(FmsError::LoginUnavailable)?;
        if !accepted {
            tracing::warn!(username, "Login rejected");
            return Err(FmsError::LoginRejected);
        }

        let session = Session::new(username).with_password(password);
        self.store.save(&session)?;
        tracing::info!(username, "Logged in");
        Ok(SessionContext::new(session))
    }

    /// Clear the identity and cancel everything the session started
    pub fn logout(&self, context: &SessionContext) -> Result<(), FmsError> {
        context.teardown();
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use tempfile::TempDir;

    #[test]
    fn test_store_roundtrip_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(store.load().is_none());

        let session = Session::new("ops").with_password("pw");
        store.save(&session).unwrap();
        assert_eq!(store.load(), Some(session));

        store.clear().unwrap();
        assert!(store.load().is_none());
        // second clear is a no-op
        store.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_session_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        store.save(&Session::new("ops").with_password("pw")).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        // an existing world-readable file is narrowed on the next save
        fs::set_permissions(store.path(), fs::Permissions::from_mode(0o644)).unwrap();
        store.save(&Session::new("ops").with_password("pw2")).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.load().unwrap().password.as_deref(), Some("pw2"));
    }

    #[test]
    fn test_blank_username_is_not_a_session() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SESSION_FILE), "username = \"  \"\n").unwrap();
        assert!(SessionStore::new(dir.path()).load().is_none());
    }

    #[test]
    fn test_enter_without_identity_fails() {
        let dir = TempDir::new().unwrap();
        let guard = SessionGuard::new(SessionStore::new(dir.path()));
        assert!(matches!(guard.enter(), Err(FmsError::NotLoggedIn)));
    }

    #[test]
    fn test_teardown_cancels_children() {
        let ctx = SessionContext::new(Session::new("ops"));
        let child = ctx.child_token();
        assert!(ctx.is_active());

        ctx.teardown();
        assert!(child.is_cancelled());
        assert!(!ctx.is_active());

        let renewed = ctx.renew();
        assert!(renewed.is_active());
        assert_eq!(renewed.username(), "ops");
    }

    #[tokio::test]
    async fn test_login_persists_and_logout_clears() {
        let dir = TempDir::new().unwrap();
        let guard = SessionGuard::new(SessionStore::new(dir.path()));
        let backend = MockBackend::new().with_credentials("ops", "pw");

        assert!(matches!(
            guard.login(&backend, "ops", "nope").await,
            Err(FmsError::LoginRejected)
        ));
        assert!(guard.enter().is_err());

        let ctx = guard.login(&backend, "ops", "pw").await.unwrap();
        assert_eq!(ctx.password(), "pw");
        assert_eq!(guard.enter().unwrap().username(), "ops");

        guard.logout(&ctx).unwrap();
        assert!(!ctx.is_active());
        assert!(matches!(guard.enter(), Err(FmsError::NotLoggedIn)));
    }
}
