//! Session tracking for operator and privileged-execution subjects.
//!
//! Sessions expire purely on their timeout, measured from the last access.
//! Reading a session never renews it; callers renew explicitly with
//! [`SessionRegistry::touch`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::security::PrincipalCollection;

/// Default session timeout (30 minutes).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30 * 60;

/// Session-related errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session has expired.
    #[error("session expired")]
    Expired,

    /// Session not found.
    #[error("session not found")]
    NotFound,
}

/// A subject session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session id (UUID v4).
    pub id: String,
    /// Principals the session was created for; `None` for anonymous sessions.
    pub principals: Option<PrincipalCollection>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Wall-clock time of the last access.
    pub last_access_at: DateTime<Utc>,
    /// `None` means the session never expires.
    timeout: Option<Duration>,
    last_access: Instant,
}

impl Session {
    fn new(principals: Option<PrincipalCollection>, timeout: Option<Duration>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            principals,
            created_at: now,
            last_access_at: now,
            timeout,
            last_access: Instant::now(),
        }
    }

    /// The session timeout, `None` if it never expires.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Check whether the timeout has elapsed since the last access.
    pub fn is_expired(&self) -> bool {
        match self.timeout {
            Some(timeout) => self.last_access.elapsed() >= timeout,
            None => false,
        }
    }

    fn touch(&mut self) {
        self.last_access = Instant::now();
        self.last_access_at = Utc::now();
    }
}

/// Registry of active sessions keyed by id.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Session>>,
    default_timeout: Option<Duration>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Some(Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS)))
    }
}

impl SessionRegistry {
    /// Create a registry whose new sessions use `default_timeout`.
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            default_timeout,
        }
    }

    /// The timeout applied to sessions created with [`create`](Self::create).
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Start a session with the registry's default timeout.
    pub fn create(&self, principals: Option<PrincipalCollection>) -> Session {
        self.create_with_timeout(principals, self.default_timeout)
    }

    /// Start a session with an explicit timeout (`None` = never expires).
    pub fn create_with_timeout(
        &self,
        principals: Option<PrincipalCollection>,
        timeout: Option<Duration>,
    ) -> Session {
        let session = Session::new(principals, timeout);
        self.sessions
            .lock()
            .insert(session.id.clone(), session.clone());
        debug!(session_id = %session.id, "Session created");
        session
    }

    /// Look up a session. Expired sessions are removed and reported.
    pub fn get(&self, id: &str) -> Result<Session, SessionError> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get(id).ok_or(SessionError::NotFound)?;
        if session.is_expired() {
            sessions.remove(id);
            debug!(session_id = %id, "Session expired");
            return Err(SessionError::Expired);
        }
        Ok(session.clone())
    }

    /// Renew a session's last-access time.
    pub fn touch(&self, id: &str) -> Result<Session, SessionError> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        if session.is_expired() {
            sessions.remove(id);
            return Err(SessionError::Expired);
        }
        session.touch();
        Ok(session.clone())
    }

    /// Change a session's timeout (`None` disables expiry).
    pub fn set_timeout(&self, id: &str, timeout: Option<Duration>) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        if session.is_expired() {
            sessions.remove(id);
            return Err(SessionError::Expired);
        }
        session.timeout = timeout;
        Ok(())
    }

    /// Stop a session. Returns `false` if it did not exist.
    pub fn stop(&self, id: &str) -> bool {
        let removed = self.sessions.lock().remove(id).is_some();
        if removed {
            debug!(session_id = %id, "Session stopped");
        }
        removed
    }

    /// Drop every expired session.
    pub fn cleanup(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "Cleaned up expired sessions");
        }
        removed
    }

    /// Number of tracked sessions, expired ones included until cleanup.
    pub fn count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_create_and_get() {
        let registry = SessionRegistry::default();
        let session = registry.create(None);

        assert!(!session.id.is_empty());
        assert_eq!(
            session.timeout(),
            Some(Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS))
        );
        assert_eq!(registry.get(&session.id).unwrap().id, session.id);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_unknown_session() {
        let registry = SessionRegistry::default();
        assert_eq!(registry.get("missing").unwrap_err(), SessionError::NotFound);
        assert!(!registry.stop("missing"));
    }

    #[test]
    fn test_session_ids_unique() {
        let registry = SessionRegistry::default();
        let a = registry.create(None);
        let b = registry.create(None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_expired_session_is_reported_and_removed() {
        let registry = SessionRegistry::new(Some(Duration::from_millis(5)));
        let session = registry.create(None);

        sleep(Duration::from_millis(20));

        assert_eq!(registry.get(&session.id).unwrap_err(), SessionError::Expired);
        assert_eq!(registry.get(&session.id).unwrap_err(), SessionError::NotFound);
    }

    #[test]
    fn test_never_expiring_session() {
        let registry = SessionRegistry::new(Some(Duration::from_millis(5)));
        let session = registry.create_with_timeout(None, None);

        sleep(Duration::from_millis(20));

        assert!(registry.get(&session.id).is_ok());
    }

    #[test]
    fn test_set_timeout_disables_expiry() {
        let registry = SessionRegistry::new(Some(Duration::from_millis(30)));
        let session = registry.create(None);
        registry.set_timeout(&session.id, None).unwrap();

        sleep(Duration::from_millis(50));

        assert_eq!(registry.get(&session.id).unwrap().timeout(), None);
    }

    #[test]
    fn test_get_does_not_renew() {
        let registry = SessionRegistry::new(Some(Duration::from_millis(40)));
        let session = registry.create(None);

        sleep(Duration::from_millis(25));
        assert!(registry.get(&session.id).is_ok());
        sleep(Duration::from_millis(25));

        assert_eq!(registry.get(&session.id).unwrap_err(), SessionError::Expired);
    }

    #[test]
    fn test_touch_renews() {
        let registry = SessionRegistry::new(Some(Duration::from_secs(10)));
        let session = registry.create(None);

        sleep(Duration::from_millis(20));
        let touched = registry.touch(&session.id).unwrap();

        assert!(touched.last_access_at > session.last_access_at);
        assert_eq!(touched.created_at, session.created_at);
    }

    #[test]
    fn test_stop_and_cleanup() {
        let registry = SessionRegistry::new(Some(Duration::from_millis(5)));
        let keep = registry.create_with_timeout(None, None);
        let stopped = registry.create_with_timeout(None, None);
        registry.create(None);

        assert!(registry.stop(&stopped.id));
        sleep(Duration::from_millis(20));

        assert_eq!(registry.cleanup(), 1);
        assert_eq!(registry.count(), 1);
        assert!(registry.get(&keep.id).is_ok());
    }

    #[test]
    fn test_session_error_display() {
        assert_eq!(SessionError::Expired.to_string(), "session expired");
        assert_eq!(SessionError::NotFound.to_string(), "session not found");
    }
}
