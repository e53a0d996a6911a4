//! Session lifecycle gating application access.
//!
//! ```text
//!  LoggedOut --login--> Authenticated --------------------------+
//!                 |                                             |
//!                 +--(first login)--> PasswordChangeRequired    |
//!                                        | change_password      |
//!                                        v                      |
//!                                     Authenticated --logout / force_logout--> LoggedOut
//! ```

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::application::scheduler::ScheduledTask;
use crate::config::SessionConfig;
use crate::domain::models::{AppUser, UserId, UserRole};
use crate::error::AppError;
use crate::infrastructure::notifier::ChangeHub;
use crate::infrastructure::repository::UserRepository;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    LoggedOut,
    Authenticated,
    /// Blocking: nothing but `change_password` and logout is allowed.
    PasswordChangeRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    Explicit,
    Forced,
    Inactivity,
    TokenMissing,
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: UserId,
    pub full_name: String,
    pub role: UserRole,
    pub first_login: bool,
}

impl From<AppUser> for Session {
    fn from(user: AppUser) -> Self {
        Self {
            user_id: user.id,
            full_name: user.full_name,
            role: user.role,
            first_login: user.first_login,
        }
    }
}

/// Where the client keeps its session token between checks.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, token: String);
    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore(Mutex<Option<String>>);

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set(&self, token: String) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = Some(token);
    }

    fn clear(&self) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

struct Current {
    state: SessionState,
    session: Option<Session>,
    /// Bumped on every login and logout; timers armed for an older epoch are ignored.
    epoch: u64,
    inactivity: Option<ScheduledTask>,
    tasks: Vec<ScheduledTask>,
    last_logout: Option<LogoutReason>,
}

struct Inner {
    users: Arc<dyn UserRepository>,
    tokens: Arc<dyn TokenStore>,
    hub: ChangeHub,
    config: SessionConfig,
    current: Mutex<Current>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Current> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ends the session only if it is still the one `epoch` refers to.
    fn end_if_epoch(&self, epoch: u64, reason: LogoutReason) -> bool {
        let mut current = self.lock();
        if current.epoch != epoch {
            debug!(?reason, "stale timer ignored");
            return false;
        }
        self.end(&mut current, reason)
    }

    fn end(&self, current: &mut Current, reason: LogoutReason) -> bool {
        // timers go first so none of them can fire into the next session
        if let Some(task) = current.inactivity.take() {
            task.cancel();
        }
        for task in current.tasks.drain(..) {
            task.cancel();
        }

        if current.state == SessionState::LoggedOut {
            return false;
        }

        let user_id = current.session.as_ref().map(|s| s.user_id);
        current.state = SessionState::LoggedOut;
        current.session = None;
        current.epoch += 1;
        current.last_logout = Some(reason);
        self.tokens.clear();

        match reason {
            LogoutReason::Explicit => info!(?user_id, "logged out"),
            _ => warn!(?user_id, ?reason, "session ended"),
        }
        true
    }
}

fn inactivity_timer(inner: &Arc<Inner>, epoch: u64) -> Option<ScheduledTask> {
    let timeout = inner.config.inactivity_timeout.duration()?;
    let weak: Weak<Inner> = Arc::downgrade(inner);
    Some(ScheduledTask::once("session-inactivity", timeout, move || {
        if let Some(inner) = weak.upgrade() {
            inner.end_if_epoch(epoch, LogoutReason::Inactivity);
        }
    }))
}

fn liveness_check(inner: &Arc<Inner>, epoch: u64) -> Option<ScheduledTask> {
    let period = inner.config.liveness_check.duration()?;
    let weak: Weak<Inner> = Arc::downgrade(inner);
    Some(ScheduledTask::every("session-liveness", period, move || {
        let Some(inner) = weak.upgrade() else {
            return ControlFlow::Break(());
        };
        if inner.tokens.get().is_some() {
            return ControlFlow::Continue(());
        }
        inner.end_if_epoch(epoch, LogoutReason::TokenMissing);
        ControlFlow::Break(())
    }))
}

fn revocation_watch(inner: &Arc<Inner>, epoch: u64, user_id: UserId) -> ScheduledTask {
    let mut rx = inner.hub.subscribe_force_logout();
    let weak: Weak<Inner> = Arc::downgrade(inner);
    ScheduledTask::watch("session-revocation", async move {
        loop {
            match rx.recv().await {
                Ok(signal) if signal.user_id.map_or(true, |id| id == user_id) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.end_if_epoch(epoch, LogoutReason::Revoked);
                    }
                    break;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Session state machine. Clones share the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn TokenStore>,
        hub: ChangeHub,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                users,
                tokens,
                hub,
                config,
                current: Mutex::new(Current {
                    state: SessionState::LoggedOut,
                    session: None,
                    epoch: 0,
                    inactivity: None,
                    tasks: Vec::new(),
                    last_logout: None,
                }),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.lock().session.clone()
    }

    pub fn last_logout_reason(&self) -> Option<LogoutReason> {
        self.inner.lock().last_logout
    }

    /// Number of live timers / watchers owned by the current session.
    pub fn pending_tasks(&self) -> usize {
        let current = self.inner.lock();
        current.tasks.iter().filter(|t| !t.is_cancelled()).count()
            + current.inactivity.iter().filter(|t| !t.is_cancelled()).count()
    }

    /// Checks credentials and opens a session. A first-login user lands
    /// directly in `PasswordChangeRequired`, never in `Authenticated`.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionState> {
        if self.state() != SessionState::LoggedOut {
            return Err(AppError::state("a session is already open"));
        }

        let user = self
            .inner
            .users
            .find_by_credentials(username, password)
            .await?
            .ok_or_else(|| AppError::auth("invalid credentials"))?;

        let mut current = self.inner.lock();
        if current.state != SessionState::LoggedOut {
            return Err(AppError::state("a session is already open"));
        }

        let session = Session::from(user);
        current.epoch += 1;
        current.state = if session.first_login {
            SessionState::PasswordChangeRequired
        } else {
            SessionState::Authenticated
        };
        self.inner.tokens.set(uuid::Uuid::new_v4().to_string());

        let epoch = current.epoch;
        current.inactivity = inactivity_timer(&self.inner, epoch);
        current.tasks.extend(liveness_check(&self.inner, epoch));
        current
            .tasks
            .push(revocation_watch(&self.inner, epoch, session.user_id));

        info!(user_id = session.user_id, state = ?current.state, "logged in");
        current.session = Some(session);
        current.last_logout = None;
        Ok(current.state)
    }

    /// Changes the password. On success the first-login flag is cleared and
    /// the session stays (or becomes) `Authenticated`.
    pub async fn change_password(&self, current_pw: &str, new_pw: &str, confirm: &str) -> Result<()> {
        let (user_id, epoch) = {
            let current = self.inner.lock();
            match &current.session {
                Some(session) => (session.user_id, current.epoch),
                None => return Err(AppError::auth("no active session")),
            }
        };

        if new_pw == current_pw {
            return Err(AppError::validation(
                "the new password must differ from the current one",
            ));
        }
        let min = self.inner.config.min_password_length;
        if new_pw.chars().count() < min {
            return Err(AppError::validation(format!(
                "the new password must have at least {min} characters"
            )));
        }
        if new_pw != confirm {
            return Err(AppError::validation("the confirmation does not match"));
        }

        let changed = self
            .inner
            .users
            .change_password(user_id, current_pw, new_pw)
            .await?;
        if !changed {
            return Err(AppError::validation("the current password is incorrect"));
        }

        let mut current = self.inner.lock();
        if current.epoch != epoch {
            return Err(AppError::state(
                "the session ended while the password was being changed",
            ));
        }
        if let Some(session) = current.session.as_mut() {
            session.first_login = false;
        }
        current.state = SessionState::Authenticated;
        info!(user_id, "password changed");
        Ok(())
    }

    pub fn logout(&self) -> bool {
        let mut current = self.inner.lock();
        self.inner.end(&mut current, LogoutReason::Explicit)
    }

    /// Ends the session from outside the UI flow (revocation, auth failure).
    pub fn force_logout(&self) -> bool {
        let mut current = self.inner.lock();
        self.inner.end(&mut current, LogoutReason::Forced)
    }

    /// A qualifying input event: restarts the inactivity countdown.
    pub fn record_activity(&self) {
        let mut current = self.inner.lock();
        if current.state == SessionState::LoggedOut {
            return;
        }
        let epoch = current.epoch;
        // replacing the old task drops and cancels it
        current.inactivity = inactivity_timer(&self.inner, epoch);
    }

    /// The session, if the UI may be used freely right now.
    pub fn require_interactive(&self) -> Result<Session> {
        let current = self.inner.lock();
        match (current.state, &current.session) {
            (SessionState::Authenticated, Some(session)) => Ok(session.clone()),
            (SessionState::PasswordChangeRequired, _) => {
                Err(AppError::state("a password change is required first"))
            }
            _ => Err(AppError::auth("not logged in")),
        }
    }

    pub fn require_admin(&self) -> Result<Session> {
        let session = self.require_interactive()?;
        if session.role != UserRole::Admin {
            return Err(AppError::state("this action needs an administrator"));
        }
        Ok(session)
    }

    /// Applies the auth-failure rule to the result of an authenticated
    /// operation: an `Auth` error ends the session.
    pub fn guard<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(AppError::Auth(reason)) = &result {
            warn!(%reason, "auth failure during an authenticated operation");
            self.force_logout();
        }
        result
    }
}
