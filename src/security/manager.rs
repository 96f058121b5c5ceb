//! Security manager: authentication and authorization across realms.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{PrincipalCollection, Subject};
use crate::auth::{
    LimitResult, LoginLimiter, Session, SessionError, SessionRegistry, WildcardPermission,
};
use crate::realm::{implies_any, Account, AuthError, AuthenticationToken, RealmRegistry};

/// Aggregates the realm registry, the session registry and the login limiter.
#[derive(Debug)]
pub struct SecurityManager {
    realms: Arc<RealmRegistry>,
    sessions: SessionRegistry,
    limiter: Mutex<LoginLimiter>,
}

impl SecurityManager {
    /// Create a manager over `realms`.
    pub fn new(
        realms: Arc<RealmRegistry>,
        sessions: SessionRegistry,
        limiter: LoginLimiter,
    ) -> Self {
        Self {
            realms,
            sessions,
            limiter: Mutex::new(limiter),
        }
    }

    /// The realms consulted by this manager.
    pub fn realms(&self) -> &Arc<RealmRegistry> {
        &self.realms
    }

    /// Active sessions.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Try every realm that knows the account, in registry order.
    ///
    /// The first realm that accepts the credential wins. If no realm knows
    /// the account the result is [`AuthError::UnknownAccount`]; otherwise the
    /// last realm error is returned.
    pub fn authenticate(&self, token: &AuthenticationToken) -> Result<Account, AuthError> {
        let mut last_error = None;
        for realm in self.realms.snapshot() {
            if !realm.account_exists(&token.username) {
                continue;
            }
            match realm.authenticate(token) {
                Ok(account) => return Ok(account),
                Err(e) => {
                    debug!(
                        realm = %realm.name(),
                        username = %token.username,
                        error = %e,
                        "Realm rejected credential"
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| AuthError::UnknownAccount(token.username.clone())))
    }

    /// Authenticate and open a session that never expires.
    pub fn login(&self, token: &AuthenticationToken) -> Result<Subject, AuthError> {
        if let LimitResult::Locked(remaining) = self.limiter.lock().check(&token.username) {
            warn!(
                username = %token.username,
                remaining_secs = remaining.as_secs(),
                "Login attempt blocked: account locked"
            );
            return Err(AuthError::AccountLocked(remaining.as_secs()));
        }

        let account = match self.authenticate(token) {
            Ok(account) => account,
            Err(e) => {
                self.limiter.lock().record_failure(&token.username);
                return Err(e);
            }
        };
        self.limiter.lock().clear(&token.username);

        // Operator sessions stay open until logout.
        let session = self
            .sessions
            .create_with_timeout(Some(account.principals.clone()), None);

        info!(
            username = %token.username,
            realm = %account.principals.primary().realm,
            session_id = %session.id,
            "Login successful"
        );
        Ok(Subject::authenticated(account.principals, session.id))
    }

    /// Stop the subject's session, if any.
    pub fn logout(&self, subject: &Subject) {
        if let Some(id) = subject.session_id() {
            if self.sessions.stop(id) {
                info!(subject = %subject, session_id = %id, "Logged out");
            }
        }
    }

    /// Build a subject bound to `principals` with its own session.
    pub fn create_subject(
        &self,
        principals: PrincipalCollection,
        timeout: Option<Duration>,
    ) -> Subject {
        let session = self
            .sessions
            .create_with_timeout(Some(principals.clone()), timeout);
        Subject::with_principals(principals).with_session(session.id)
    }

    /// Session of `subject`, `None` if it has none.
    pub fn session_of(&self, subject: &Subject) -> Result<Option<Session>, SessionError> {
        subject
            .session_id()
            .map(|id| self.sessions.get(id))
            .transpose()
    }

    /// Evaluate `permission` for `principals`.
    ///
    /// Each principal is looked up in the realm that owns it. Anonymous
    /// subjects and unparsable permissions are denied.
    pub fn is_permitted(&self, principals: Option<&PrincipalCollection>, permission: &str) -> bool {
        let Some(principals) = principals else {
            return false;
        };
        let requested = match WildcardPermission::parse(permission) {
            Ok(p) => p,
            Err(e) => {
                debug!(permission = %permission, error = %e, "Unparsable permission denied");
                return false;
            }
        };

        principals.iter().any(|principal| {
            self.realms
                .get(&principal.realm)
                .map(|realm| implies_any(&realm.permissions_of(&principal.id), &requested))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::{MemoryRealm, Realm, PLUGIN_REALM_NAME};

    fn manager() -> (SecurityManager, Arc<MemoryRealm>) {
        let plugins = Arc::new(MemoryRealm::new());
        let plugin_realm: Arc<dyn Realm> = plugins.clone();
        let extra: Arc<dyn Realm> = Arc::new(MemoryRealm::named("extra"));
        let realms = Arc::new(RealmRegistry::new(vec![plugin_realm, extra]));
        let manager = SecurityManager::new(
            realms,
            SessionRegistry::default(),
            LoginLimiter::new(2, Duration::from_secs(60)),
        );
        (manager, plugins)
    }

    #[test]
    fn test_login_opens_never_expiring_session() {
        let (manager, plugins) = manager();
        plugins.add_role("r", "devices:read").unwrap();
        plugins.add_account("Weather", "secret", &["r"]).unwrap();

        let subject = manager
            .login(&AuthenticationToken::new("Weather", "secret"))
            .unwrap();
        assert!(subject.is_authenticated());
        assert_eq!(subject.principal(), Some("Weather"));

        let session = manager.session_of(&subject).unwrap().unwrap();
        assert_eq!(session.timeout(), None);

        manager.logout(&subject);
        assert!(matches!(
            manager.session_of(&subject),
            Err(SessionError::NotFound)
        ));
    }

    #[test]
    fn test_unknown_account() {
        let (manager, _) = manager();
        assert!(matches!(
            manager.login(&AuthenticationToken::new("ghost", "x")),
            Err(AuthError::UnknownAccount(_))
        ));
    }

    #[test]
    fn test_lockout_after_failures() {
        let (manager, plugins) = manager();
        plugins.add_account("Weather", "secret", &[]).unwrap();

        for _ in 0..2 {
            assert!(matches!(
                manager.login(&AuthenticationToken::new("Weather", "bad")),
                Err(AuthError::IncorrectCredentials(_))
            ));
        }
        assert!(matches!(
            manager.login(&AuthenticationToken::new("Weather", "secret")),
            Err(AuthError::AccountLocked(_))
        ));
    }

    #[test]
    fn test_is_permitted_uses_owning_realm() {
        let (manager, plugins) = manager();
        plugins.add_role("r", "devices:read").unwrap();
        plugins.add_account("Weather", "secret", &["r"]).unwrap();

        let own = PrincipalCollection::single("Weather", PLUGIN_REALM_NAME);
        assert!(manager.is_permitted(Some(&own), "devices:read"));
        assert!(!manager.is_permitted(Some(&own), "devices:write"));

        // Same id, different realm: no grants.
        let foreign = PrincipalCollection::single("Weather", "extra");
        assert!(!manager.is_permitted(Some(&foreign), "devices:read"));

        let unknown_realm = PrincipalCollection::single("Weather", "gone");
        assert!(!manager.is_permitted(Some(&unknown_realm), "devices:read"));
    }

    #[test]
    fn test_anonymous_and_malformed_denied() {
        let (manager, plugins) = manager();
        plugins.add_role("r", "*").unwrap();
        plugins.add_account("Weather", "secret", &["r"]).unwrap();

        assert!(!manager.is_permitted(None, "devices:read"));
        let own = PrincipalCollection::single("Weather", PLUGIN_REALM_NAME);
        assert!(!manager.is_permitted(Some(&own), ""));
    }

    #[test]
    fn test_create_subject_has_session() {
        let (manager, _) = manager();
        let subject =
            manager.create_subject(PrincipalCollection::single("Weather", PLUGIN_REALM_NAME), None);
        assert!(!subject.is_authenticated());
        let session = manager.session_of(&subject).unwrap().unwrap();
        assert_eq!(session.timeout(), None);
        assert_eq!(manager.sessions().count(), 1);
    }
}
