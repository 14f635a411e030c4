//! Owner of the single ephemeral session: creation, explicit clearing, and passive expiry.

use crate::clock::Clock;
use crate::gateway::RemoteGateway;
use crate::session::types::{Session, SessionError, SessionSnapshot, SourceType};
use crate::storage::SessionStorage;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Default)]
struct SessionSlot {
    session: Option<Session>,
    last_error: Option<String>,
    persisted_id: Option<String>,
}

/// Single writer of the session identity.
///
/// Readers (pipeline, chat, consumers) go through [`SessionController::current_id`] or
/// [`SessionController::snapshot`] and must re-read after every `.await`: the session can be
/// cleared or expire while a request is in flight.
pub struct SessionController {
    gateway: Arc<dyn RemoteGateway>,
    storage: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock>,
    slot: Mutex<SessionSlot>,
}

impl SessionController {
    /// Build the controller. A session id found in storage is remembered but not adopted.
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        storage: Arc<dyn SessionStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let persisted_id = match storage.get_session_id() {
            Ok(id) => id,
            Err(error) => {
                tracing::warn!(error = %error, "Failed to read persisted session id");
                None
            }
        };
        if let Some(id) = &persisted_id {
            tracing::debug!(session_id = %id, "Found persisted session id; not revalidated");
        }

        Self {
            gateway,
            storage,
            clock,
            slot: Mutex::new(SessionSlot {
                persisted_id,
                ..SessionSlot::default()
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a new session for `source_type`, replacing any existing one, and return its id.
    ///
    /// The replaced session is left to expire on the backend.
    pub async fn create_session(&self, source_type: SourceType) -> Result<String, SessionError> {
        let record = match self.gateway.create_session(source_type).await {
            Ok(record) => record,
            Err(error) => {
                let error = SessionError::create_failed(error);
                tracing::error!(%source_type, error = %error.gateway_error(), "Failed to create session");
                self.slot().last_error = Some(error.to_string());
                return Err(error);
            }
        };

        if record.local_time && record.created_at.is_none() {
            tracing::warn!(session_id = %record.id, "Session expiry has no UTC offset; reading it as UTC");
        }
        let (expires_at, created_at) = record.resolve_at(self.clock.now());
        let session = Session {
            id: record.id,
            expires_at,
            source_type,
            created_at,
        };
        let id = session.id.clone();

        let superseded = {
            let mut slot = self.slot();
            slot.last_error = None;
            slot.persisted_id = Some(id.clone());
            slot.session.replace(session).map(|old| old.id)
        };
        if let Some(old_id) = superseded {
            tracing::debug!(old_session_id = %old_id, new_session_id = %id, "Replaced existing session");
        }

        if let Err(error) = self.storage.set_session_id(&id) {
            tracing::warn!(error = %error, "Failed to persist session id");
        }
        tracing::info!(session_id = %id, %source_type, "Session created");
        Ok(id)
    }

    /// Create a session only when none is active; return the active id.
    pub async fn ensure_session(&self, source_type: SourceType) -> Result<String, SessionError> {
        match self.current_id() {
            Some(id) => Ok(id),
            None => self.create_session(source_type).await,
        }
    }

    /// Clear the current session. Returns `false` (and does nothing) when there is none.
    ///
    /// The remote deletion is fired on the runtime and not awaited; local state is cleared
    /// regardless of its outcome.
    pub fn clear_session(&self) -> bool {
        let Some(session) = self.take_session() else {
            return false;
        };
        self.spawn_remote_delete(session.id.clone());
        tracing::info!(session_id = %session.id, "Session cleared");
        true
    }

    /// Like [`Self::clear_session`], but waits for the remote deletion attempt to finish.
    ///
    /// For short-lived processes that would otherwise exit before the request is sent.
    pub async fn clear_session_and_wait(&self) -> bool {
        let Some(session) = self.take_session() else {
            return false;
        };
        tracing::info!(session_id = %session.id, "Session cleared");
        if let Some(handle) = self.spawn_remote_delete(session.id)
            && let Err(error) = handle.await
        {
            tracing::warn!(error = %error, "Remote session deletion task failed");
        }
        true
    }

    /// Clear the session locally if it has expired. Returns whether it did.
    ///
    /// Expiry relies on the backend's own TTL; no remote deletion is attempted.
    pub fn check_expiration(&self) -> bool {
        let now = self.clock.now();
        let expired = {
            let mut slot = self.slot();
            let lapsed = slot
                .session
                .as_ref()
                .is_some_and(|session| !session.is_active_at(now));
            if lapsed {
                slot.persisted_id = None;
                slot.session.take()
            } else {
                None
            }
        };

        let Some(session) = expired else {
            return false;
        };
        self.forget_persisted();
        tracing::info!(session_id = %session.id, expires_at = %session.expires_at, "Session expired");
        true
    }

    /// Run [`Self::check_expiration`] every `every` until the controller is dropped.
    pub fn spawn_expiry_watcher(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let controller: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(controller) = controller.upgrade() else {
                    tracing::debug!("Session controller dropped; stopping expiry watcher");
                    break;
                };
                controller.check_expiration();
            }
        })
    }

    /// Id of the active session, if any.
    pub fn current_id(&self) -> Option<String> {
        let now = self.clock.now();
        self.slot()
            .session
            .as_ref()
            .filter(|session| session.is_active_at(now))
            .map(|session| session.id.clone())
    }

    /// Whether `session_id` is still the active session.
    pub fn is_current(&self, session_id: &str) -> bool {
        self.current_id().as_deref() == Some(session_id)
    }

    /// Whether a session exists and has not expired.
    pub fn is_active(&self) -> bool {
        self.current_id().is_some()
    }

    /// Point-in-time view of the session with derived fields computed against the clock.
    pub fn snapshot(&self) -> SessionSnapshot {
        let now = self.clock.now();
        let session = self.slot().session.clone();
        let (is_active, time_remaining) = match &session {
            Some(session) => (session.is_active_at(now), session.time_remaining_at(now)),
            None => (false, Duration::ZERO),
        };
        SessionSnapshot {
            session,
            is_active,
            time_remaining,
        }
    }

    /// Last session-creation error, cleared by the next successful creation.
    pub fn last_error(&self) -> Option<String> {
        self.slot().last_error.clone()
    }

    /// Session id found in storage (or written by this controller), whether or not it is live.
    pub fn persisted_session_id(&self) -> Option<String> {
        self.slot().persisted_id.clone()
    }

    /// Adopt the persisted session if the backend confirms it is still live.
    ///
    /// Never called implicitly. Returns the adopted id, or `None` when nothing is stored or the
    /// backend no longer knows the session (the stored id is then forgotten). A session created
    /// while the lookup was in flight wins over the stored one.
    pub async fn revalidate_persisted(
        &self,
        fallback_source: SourceType,
    ) -> Result<Option<String>, SessionError> {
        if let Some(id) = self.current_id() {
            return Ok(Some(id));
        }
        let Some(stored) = self.persisted_session_id() else {
            return Ok(None);
        };

        let record = match self.gateway.get_session(&stored).await {
            Ok(record) => Some(record),
            Err(error) if error.is_not_found() => None,
            Err(error) => return Err(SessionError::Revalidate(error)),
        };

        let now = self.clock.now();
        let Some(record) = record.filter(|record| record.id == stored) else {
            tracing::info!(session_id = %stored, "Persisted session is no longer live");
            self.forget_if_persisted(&stored);
            return Ok(None);
        };
        let (expires_at, created_at) = record.resolve_at(now);
        if expires_at <= now {
            tracing::info!(session_id = %stored, %expires_at, "Persisted session has expired");
            self.forget_if_persisted(&stored);
            return Ok(None);
        }

        let session = Session {
            id: record.id,
            expires_at,
            source_type: record.source_type.unwrap_or(fallback_source),
            created_at,
        };
        let mut slot = self.slot();
        if let Some(current) = slot.session.as_ref().filter(|current| current.is_active_at(now)) {
            tracing::debug!(
                stored_session_id = %stored,
                session_id = %current.id,
                "Newer session created during revalidation; keeping it"
            );
            return Ok(Some(current.id.clone()));
        }
        let id = session.id.clone();
        slot.session = Some(session);
        drop(slot);
        tracing::info!(session_id = %id, "Adopted persisted session");
        Ok(Some(id))
    }

    fn take_session(&self) -> Option<Session> {
        let session = {
            let mut slot = self.slot();
            let session = slot.session.take();
            if session.is_some() {
                slot.persisted_id = None;
            }
            session
        }?;
        self.forget_persisted();
        Some(session)
    }

    /// Forget `session_id` unless a newer session has been persisted since it was read.
    fn forget_if_persisted(&self, session_id: &str) {
        let matches = {
            let mut slot = self.slot();
            let matches = slot.persisted_id.as_deref() == Some(session_id);
            if matches {
                slot.persisted_id = None;
            }
            matches
        };
        if matches {
            self.forget_persisted();
        }
    }

    fn forget_persisted(&self) {
        if let Err(error) = self.storage.clear_session_id() {
            tracing::warn!(error = %error, "Failed to clear persisted session id");
        }
    }

    fn spawn_remote_delete(&self, session_id: String) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(%session_id, "No async runtime; skipping remote session deletion");
            return None;
        };
        let gateway = Arc::clone(&self.gateway);
        Some(runtime.spawn(async move {
            match gateway.delete_session(&session_id).await {
                Ok(()) => tracing::debug!(%session_id, "Remote session deleted"),
                Err(error) => {
                    tracing::warn!(%session_id, error = %error, "Remote session deletion failed")
                }
            }
        }))
    }
}
