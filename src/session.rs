//! Session and authentication state
//!
//! At most one session is active. It lives in a [`SessionStore`] handed to
//! the [`AuthController`], which delegates credential checks to an
//! [`Authenticator`] and inactivity handling to an [`ActivityTracker`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{error, info, warn};

use crate::{
    config::UserCredential,
    errors::MonitorError,
    models::{AuthUser, Session},
};

/// Holder of the current session
pub trait SessionStore: Send + Sync {
    fn get(&self) -> Option<Session>;
    fn set(&self, session: Session) -> Result<(), MonitorError>;
    fn clear(&self) -> Result<(), MonitorError>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    slot: RwLock<Option<Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self) -> Option<Session> {
        self.slot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set(&self, session: Session) -> Result<(), MonitorError> {
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = Some(session);
        Ok(())
    }

    fn clear(&self) -> Result<(), MonitorError> {
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// Session persisted as JSON so it survives restarts
pub struct FileSessionStore {
    path: PathBuf,
    cache: RwLock<Option<Session>>,
}

impl FileSessionStore {
    /// Open the store, restoring a session saved at `path`
    ///
    /// An unreadable session file is ignored.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let path = path.as_ref().to_path_buf();
        let restored = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Session>(&contents) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!("Ignoring unreadable session file {}: {}", path.display(), e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            path,
            cache: RwLock::new(restored),
        })
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Option<Session> {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set(&self, session: Session) -> Result<(), MonitorError> {
        std::fs::write(&self.path, serde_json::to_vec_pretty(&session)?)?;
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = Some(session);
        Ok(())
    }

    fn clear(&self) -> Result<(), MonitorError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// Verifies credentials
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str)
        -> Result<AuthUser, MonitorError>;
}

/// Checks passwords against configured bcrypt hashes
pub struct CredentialAuthenticator {
    users: Vec<UserCredential>,
}

impl CredentialAuthenticator {
    pub fn new(users: Vec<UserCredential>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Authenticator for CredentialAuthenticator {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthUser, MonitorError> {
        if username.is_empty() || password.is_empty() {
            return Err(MonitorError::InvalidCredentials);
        }

        let user = self
            .users
            .iter()
            .find(|u| u.username == username)
            .ok_or(MonitorError::InvalidCredentials)?;

        if !bcrypt::verify(password, &user.password_hash)? {
            return Err(MonitorError::InvalidCredentials);
        }

        Ok(AuthUser {
            username: user.username.clone(),
            role: user.role.clone(),
        })
    }
}

/// Lifecycle hooks of an inactivity tracker
pub trait ActivityTracker: Send + Sync {
    fn start(&self);
    fn stop(&self);

    /// Record user activity
    fn touch(&self) {}
}

/// Clears the session when no activity is recorded for `timeout`
pub struct InactivityTracker {
    store: Arc<dyn SessionStore>,
    timeout: Duration,
    last_activity: Arc<Mutex<Instant>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl InactivityTracker {
    pub fn new(store: Arc<dyn SessionStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            last_activity: Arc::new(Mutex::new(Instant::now())),
            handle: Mutex::new(None),
        }
    }

    async fn watch(store: Arc<dyn SessionStore>, timeout: Duration, last: Arc<Mutex<Instant>>) {
        loop {
            let deadline = *last.lock().unwrap_or_else(|e| e.into_inner()) + timeout;
            time::sleep_until(deadline).await;

            let mut last_activity = last.lock().unwrap_or_else(|e| e.into_inner());
            if last_activity.elapsed() < timeout {
                continue;
            }
            if store.get().is_some() {
                info!("Session expired after {:?} of inactivity", timeout);
                if let Err(e) = store.clear() {
                    error!("Failed to clear expired session: {}", e);
                }
            }
            *last_activity = Instant::now();
        }
    }
}

impl ActivityTracker for InactivityTracker {
    fn start(&self) {
        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if handle.is_some() {
            return;
        }
        self.touch();
        *handle = Some(tokio::spawn(Self::watch(
            self.store.clone(),
            self.timeout,
            self.last_activity.clone(),
        )));
    }

    fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }

    fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }
}

impl Drop for InactivityTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Login, logout and session restore
pub struct AuthController {
    store: Arc<dyn SessionStore>,
    authenticator: Arc<dyn Authenticator>,
    tracker: Arc<dyn ActivityTracker>,
}

impl AuthController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        authenticator: Arc<dyn Authenticator>,
        tracker: Arc<dyn ActivityTracker>,
    ) -> Self {
        Self {
            store,
            authenticator,
            tracker,
        }
    }

    /// Adopt a previously stored session and start the activity tracker
    pub fn init(&self) -> Option<AuthUser> {
        let restored = self.store.get().map(|session| session.user);
        if let Some(user) = &restored {
            info!("Restored session for {}", user.username);
        }
        self.tracker.start();
        restored
    }

    /// Returns `true` and replaces the session on success; on failure the
    /// existing session is kept. A successful login counts as activity.
    pub async fn login(&self, username: &str, password: &str) -> bool {
        let user = match self.authenticator.authenticate(username, password).await {
            Ok(user) => user,
            Err(e) => {
                error!("Login failed for {}: {}", username, e);
                return false;
            }
        };

        match self.store.set(Session::new(user)) {
            Ok(()) => {
                self.tracker.touch();
                info!("User {} logged in", username);
                true
            }
            Err(e) => {
                error!("Could not store session for {}: {}", username, e);
                false
            }
        }
    }

    pub fn logout(&self) {
        if let Err(e) = self.store.clear() {
            error!("Failed to clear session: {}", e);
        }
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.store.get().map(|session| session.user)
    }

    pub fn user_role(&self) -> Option<String> {
        self.current_user().and_then(|user| user.role)
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.get().is_some()
    }

    /// Stop the activity tracker
    pub fn shutdown(&self) {
        self.tracker.stop();
    }
}
