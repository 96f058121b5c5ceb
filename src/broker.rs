//! The authorization broker.
//!
//! The broker owns the two built-in realms and, once initialized, the
//! [`SecurityManager`] that routes every authentication and permission check.
//! Until then it fails open: every check passes and privileged actions run on
//! the caller's own identity, which is how the platform runs with security
//! switched off.
//!
//! # Plugin privileges
//!
//! A plugin gets an identity in the plugin realm the first time the host asks
//! for its privileges, and only if the permission it requests matches the one
//! its manifest declares. The grant is fixed from then on. Plugin code is run
//! with [`AuthorizationBroker::execute_privileged`], which makes the plugin's
//! identity ambient for the duration of the call:
//!
//! ```
//! use plugauth::{AuthorizationBroker, PluginManifest, RegistrationOutcome};
//!
//! let broker = AuthorizationBroker::new();
//! let manifest = PluginManifest::new("Weather", "plugins.Weather")
//!     .with_permissions("devices:read");
//!
//! let outcome = broker.register_plugin_privileges(&manifest, "devices:read");
//! assert_eq!(outcome, RegistrationOutcome::Registered);
//!
//! // Not initialized: the action runs directly and every check passes.
//! let allowed =
//!     broker.plugin_execute_privileged(&manifest, || broker.is_permitted("devices:write"));
//! assert!(allowed);
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{LoginLimiter, Session, SessionRegistry};
use crate::config::SecurityConfig;
use crate::logging::AUDIT_TARGET;
use crate::plugin::PluginManifest;
use crate::realm::{AuthError, AuthenticationToken, FileRealm, MemoryRealm, Realm, RealmRegistry};
use crate::security::{
    ambient, PrincipalCollection, Scoped, SecurityManager, Subject, SubjectGuard,
};
use crate::{BrokerError, Result};

/// Required to add a realm.
pub const PERM_REALMS_CREATE: &str = "auth:realms:create";

/// Required to remove a realm.
pub const PERM_REALMS_DELETE: &str = "auth:realms:delete";

/// Required to bind an ephemeral identity to the current thread.
pub const PERM_FAKE_USER: &str = "auth:fakeUser";

/// Result of a plugin privilege registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// A new identity and grant were created.
    Registered,
    /// The plugin already had an identity; nothing changed.
    AlreadyRegistered,
    /// The request did not match the manifest; nothing was created.
    Rejected,
}

/// Stops an ephemeral session when dropped.
#[derive(Debug)]
struct SessionLease {
    manager: Arc<SecurityManager>,
    session_id: Option<String>,
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if let Some(id) = self.session_id.take() {
            self.manager.sessions().stop(&id);
        }
    }
}

/// Authentication, authorization and plugin privilege separation.
#[derive(Debug)]
pub struct AuthorizationBroker {
    base_realm: Arc<FileRealm>,
    plugin_realm: Arc<MemoryRealm>,
    realms: Arc<RealmRegistry>,
    manager: RwLock<Option<Arc<SecurityManager>>>,
}

impl Default for AuthorizationBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorizationBroker {
    /// Create an uninitialized broker.
    pub fn new() -> Self {
        let base_realm = Arc::new(FileRealm::new());
        let plugin_realm = Arc::new(MemoryRealm::new());
        let builtin: Vec<Arc<dyn Realm>> = vec![base_realm.clone(), plugin_realm.clone()];

        Self {
            base_realm,
            plugin_realm,
            realms: Arc::new(RealmRegistry::new(builtin)),
            manager: RwLock::new(None),
        }
    }

    /// The operator realm.
    pub fn base_realm(&self) -> &Arc<FileRealm> {
        &self.base_realm
    }

    /// The plugin realm.
    pub fn plugin_realm(&self) -> &Arc<MemoryRealm> {
        &self.plugin_realm
    }

    /// The realm registry.
    pub fn realms(&self) -> &Arc<RealmRegistry> {
        &self.realms
    }

    /// The installed security manager, `None` until initialized.
    pub fn security_manager(&self) -> Option<Arc<SecurityManager>> {
        self.manager.read().clone()
    }

    /// Whether [`initialize`](Self::initialize) has completed.
    pub fn is_initialized(&self) -> bool {
        self.manager.read().is_some()
    }

    /// Load the realms and install the security manager.
    ///
    /// Does nothing if already initialized or if security is disabled. A
    /// realm load failure is returned and leaves the broker uninitialized.
    pub fn initialize(&self, config: &SecurityConfig) -> Result<()> {
        if !config.enabled {
            info!("Authorization disabled; permission checks always pass");
            return Ok(());
        }

        let mut slot = self.manager.write();
        if slot.is_some() {
            return Ok(());
        }

        let path = config.realm_path()?;
        self.base_realm.set_resource_path(&path);
        self.base_realm.init()?;
        self.plugin_realm.init()?;

        let manager = SecurityManager::new(
            Arc::clone(&self.realms),
            SessionRegistry::new(config.session_timeout()),
            LoginLimiter::new(config.max_login_attempts, config.lockout()),
        );
        *slot = Some(Arc::new(manager));

        info!(
            realm_file = %path.display(),
            realms = ?self.realms.names(),
            "Authorization initialized"
        );
        Ok(())
    }

    /// Log in on the current thread. Failures are logged and reported as `false`.
    ///
    /// Refused inside a privileged action, whose identity is restored when it
    /// ends. A subject already bound to the thread is logged out first.
    pub fn login(&self, username: &str, credential: &str) -> bool {
        let Some(manager) = self.security_manager() else {
            warn!(username = %username, "Login failed: {}", AuthError::NotInitialized);
            return false;
        };
        if ambient::in_scope() {
            warn!(
                target: AUDIT_TARGET,
                username = %username,
                subject = %ambient::current(),
                "Login refused inside privileged action"
            );
            return false;
        }

        match manager.login(&AuthenticationToken::new(username, credential)) {
            Ok(subject) => {
                if let Some(previous) = ambient::bind(subject) {
                    manager.logout(&previous);
                }
                true
            }
            Err(e) => {
                warn!(username = %username, error = %e, "Login failed");
                false
            }
        }
    }

    /// Log out the current thread's subject. No-op if nobody is logged in.
    pub fn logout(&self) {
        let Some(manager) = self.security_manager() else {
            return;
        };
        let subject = ambient::current();
        if subject.is_anonymous() {
            return;
        }
        manager.logout(&subject);
        ambient::unbind();
    }

    /// Whether the ambient subject holds `permission`. Always `true` when uninitialized.
    pub fn is_permitted(&self, permission: &str) -> bool {
        match self.security_manager() {
            None => true,
            Some(manager) => {
                let subject = ambient::current();
                manager.is_permitted(subject.principals(), permission)
            }
        }
    }

    /// Fail with [`BrokerError::AuthorizationDenied`] unless the ambient
    /// subject holds `permission`.
    pub fn check_permission(&self, permission: &str) -> Result<()> {
        if self.is_permitted(permission) {
            return Ok(());
        }
        warn!(
            target: AUDIT_TARGET,
            subject = %ambient::current(),
            permission = %permission,
            "Permission denied"
        );
        Err(BrokerError::denied(permission))
    }

    /// The ambient subject, `None` when uninitialized.
    pub fn subject(&self) -> Option<Subject> {
        self.is_initialized().then(ambient::current)
    }

    /// The ambient subject's primary principal id, `None` when uninitialized
    /// or anonymous.
    pub fn principal(&self) -> Option<String> {
        self.subject()
            .and_then(|s| s.principal().map(str::to_string))
    }

    /// The ambient subject's session.
    pub fn current_session(&self) -> Result<Option<Session>> {
        let Some(manager) = self.security_manager() else {
            return Ok(None);
        };
        Ok(manager.session_of(&ambient::current())?)
    }

    /// Give a plugin its identity and permission grant.
    ///
    /// The grant is created at most once per plugin. `requested` must equal
    /// the permission declared in the manifest; otherwise the request is
    /// refused and audited.
    pub fn register_plugin_privileges(
        &self,
        manifest: &PluginManifest,
        requested: &str,
    ) -> RegistrationOutcome {
        let id = manifest.class_name.as_str();
        if self.plugin_realm.account_exists(id) {
            debug!(plugin = %manifest.name, "Plugin privileges already registered");
            return RegistrationOutcome::AlreadyRegistered;
        }

        let declared = manifest.declared_permission();
        if declared != requested {
            error!(
                target: AUDIT_TARGET,
                plugin = %manifest.name,
                class_name = %id,
                declared = %declared,
                requested = %requested,
                "Plugin tried to request incorrect privileges"
            );
            return RegistrationOutcome::Rejected;
        }

        let role = Uuid::new_v4().to_string();
        let credential = Uuid::new_v4().to_string();
        match self
            .plugin_realm
            .add_account_with_role(id, &credential, &role, requested)
        {
            Ok(()) => {
                info!(
                    plugin = %manifest.name,
                    class_name = %id,
                    permissions = %requested,
                    "Setting permissions for plugin"
                );
                RegistrationOutcome::Registered
            }
            // Lost a race with a concurrent registration.
            Err(AuthError::DuplicateAccount(_)) => RegistrationOutcome::AlreadyRegistered,
            Err(e) => {
                error!(
                    target: AUDIT_TARGET,
                    plugin = %manifest.name,
                    class_name = %id,
                    error = %e,
                    "Plugin privilege grant is invalid"
                );
                RegistrationOutcome::Rejected
            }
        }
    }

    /// Like [`register_plugin_privileges`](Self::register_plugin_privileges),
    /// but reports a rejection as [`BrokerError::PrivilegeMismatch`].
    pub fn ensure_plugin_privileges(
        &self,
        manifest: &PluginManifest,
        requested: &str,
    ) -> Result<()> {
        match self.register_plugin_privileges(manifest, requested) {
            RegistrationOutcome::Rejected => Err(BrokerError::PrivilegeMismatch {
                plugin: manifest.name.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn privileged_subject(
        &self,
        manager: &Arc<SecurityManager>,
        principal_id: &str,
    ) -> (Subject, SessionLease) {
        let principals = PrincipalCollection::single(principal_id, self.plugin_realm.name());
        let subject = manager.create_subject(principals, None);
        let lease = SessionLease {
            manager: Arc::clone(manager),
            session_id: subject.session_id().map(str::to_string),
        };
        (subject, lease)
    }

    /// Run `action` as the plugin principal `principal_id`.
    ///
    /// The previous ambient subject is restored however `action` exits,
    /// including by panic. Calls nest.
    pub fn execute_privileged<R>(&self, principal_id: &str, action: impl FnOnce() -> R) -> R {
        let Some(manager) = self.security_manager() else {
            return action();
        };
        let (subject, _lease) = self.privileged_subject(&manager, principal_id);
        let _guard = SubjectGuard::enter(subject);
        action()
    }

    /// Run `action` under the identity of the plugin described by `manifest`.
    pub fn plugin_execute_privileged<R>(
        &self,
        manifest: &PluginManifest,
        action: impl FnOnce() -> R,
    ) -> R {
        self.execute_privileged(&manifest.class_name, action)
    }

    /// Async variant of [`execute_privileged`](Self::execute_privileged).
    ///
    /// The plugin identity is ambient whenever the returned future is polled.
    pub fn execute_privileged_async<F: Future>(
        &self,
        principal_id: &str,
        future: F,
    ) -> PrivilegedFuture<F> {
        match self.security_manager() {
            None => PrivilegedFuture {
                state: PrivilegedState::Direct(Box::pin(future)),
                lease: None,
            },
            Some(manager) => {
                let (subject, lease) = self.privileged_subject(&manager, principal_id);
                PrivilegedFuture {
                    state: PrivilegedState::Scoped(Scoped::new(subject, future)),
                    lease: Some(lease),
                }
            }
        }
    }

    /// Register an additional realm. Requires [`PERM_REALMS_CREATE`].
    ///
    /// Returns `false` if a realm with that name is already registered.
    pub fn add_realm(&self, realm: Arc<dyn Realm>) -> Result<bool> {
        self.check_permission(PERM_REALMS_CREATE)?;
        Ok(self.realms.add(realm))
    }

    /// Remove a realm by name. Requires [`PERM_REALMS_DELETE`].
    ///
    /// The base and plugin realms are never removed.
    pub fn remove_realm(&self, name: &str) -> Result<bool> {
        self.check_permission(PERM_REALMS_DELETE)?;
        if self.realms.is_protected(name) {
            warn!(
                target: AUDIT_TARGET,
                subject = %ambient::current(),
                realm = %name,
                "Attempt to remove built-in realm"
            );
            return Ok(false);
        }
        Ok(self.realms.remove(name))
    }

    /// Bind an operator identity to the current thread without a credential.
    ///
    /// Requires [`PERM_FAKE_USER`]. Meant for short-lived impersonation in
    /// administrative tooling. The identity gets a session with the
    /// configured `session_timeout_secs`; the subject it replaces is logged
    /// out. The binding is not inherited by spawned threads and lasts until
    /// logout or the next binding.
    ///
    /// Returns `false` if the broker is uninitialized, the account does not
    /// exist, or the call is made inside a privileged action.
    pub fn bind_ephemeral_identity(&self, username: &str) -> Result<bool> {
        self.check_permission(PERM_FAKE_USER)?;
        let Some(manager) = self.security_manager() else {
            return Ok(false);
        };
        if !self.base_realm.account_exists(username) {
            return Ok(false);
        }
        let by = ambient::current();
        if ambient::in_scope() {
            warn!(
                target: AUDIT_TARGET,
                username = %username,
                by = %by,
                "Ephemeral identity refused inside privileged action"
            );
            return Ok(false);
        }

        let principals = PrincipalCollection::single(username, self.base_realm.name());
        let timeout = manager.sessions().default_timeout();
        if let Some(previous) = ambient::bind(manager.create_subject(principals, timeout)) {
            manager.logout(&previous);
        }
        info!(target: AUDIT_TARGET, username = %username, by = %by, "Ephemeral identity bound");
        Ok(true)
    }
}

enum PrivilegedState<F> {
    Direct(Pin<Box<F>>),
    Scoped(Scoped<F>),
}

/// Future returned by [`AuthorizationBroker::execute_privileged_async`].
pub struct PrivilegedFuture<F> {
    state: PrivilegedState<F>,
    lease: Option<SessionLease>,
}

impl<F: Future> Future for PrivilegedFuture<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let poll = match &mut self.state {
            PrivilegedState::Direct(future) => future.as_mut().poll(cx),
            PrivilegedState::Scoped(scoped) => Pin::new(scoped).poll(cx),
        };
        if poll.is_ready() {
            self.lease = None;
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::{BASE_REALM_NAME, PLUGIN_REALM_NAME};

    #[test]
    fn test_new_broker_is_uninitialized() {
        let broker = AuthorizationBroker::new();
        assert!(!broker.is_initialized());
        assert!(broker.security_manager().is_none());
        assert_eq!(broker.subject(), None);
        assert_eq!(broker.principal(), None);
        assert!(broker.current_session().unwrap().is_none());
        assert_eq!(broker.realms().names(), vec![BASE_REALM_NAME, PLUGIN_REALM_NAME]);
    }

    #[test]
    fn test_uninitialized_permits_everything() {
        let broker = AuthorizationBroker::new();
        assert!(broker.is_permitted("anything:at:all"));
        assert!(broker.is_permitted(""));
        assert!(broker.check_permission(PERM_REALMS_CREATE).is_ok());
    }

    #[test]
    fn test_uninitialized_login_fails() {
        let broker = AuthorizationBroker::new();
        assert!(!broker.login("admin", "admin-secret"));
        broker.logout();
    }

    #[test]
    fn test_disabled_config_stays_uninitialized() {
        let broker = AuthorizationBroker::new();
        let config = SecurityConfig {
            enabled: false,
            ..SecurityConfig::default()
        };
        broker.initialize(&config).unwrap();
        assert!(!broker.is_initialized());
    }

    #[test]
    fn test_initialize_with_missing_realm_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let broker = AuthorizationBroker::new();
        let config = SecurityConfig {
            realm_file: dir.path().join("absent.toml").display().to_string(),
            ..SecurityConfig::default()
        };
        assert!(broker.initialize(&config).is_err());
        assert!(!broker.is_initialized());
    }

    #[test]
    fn test_uninitialized_execute_keeps_caller_identity() {
        let broker = AuthorizationBroker::new();
        let before = ambient::current();
        let inside = broker.execute_privileged("plugins.Weather", ambient::current);
        assert_eq!(inside, before);
    }

    #[test]
    fn test_registration_outcomes() {
        let broker = AuthorizationBroker::new();
        let manifest =
            PluginManifest::new("Weather", "plugins.Weather").with_permissions("read,write");

        assert_eq!(
            broker.register_plugin_privileges(&manifest, "read,write"),
            RegistrationOutcome::Registered
        );
        assert_eq!(
            broker.register_plugin_privileges(&manifest, "read,write"),
            RegistrationOutcome::AlreadyRegistered
        );
        assert_eq!(
            broker.register_plugin_privileges(&manifest, "read,write,admin"),
            RegistrationOutcome::AlreadyRegistered
        );
        assert_eq!(
            broker.plugin_realm().grant_of("plugins.Weather").as_deref(),
            Some("read,write")
        );
    }

    #[test]
    fn test_ensure_plugin_privileges_reports_mismatch() {
        let broker = AuthorizationBroker::new();
        let manifest = PluginManifest::new("Weather", "plugins.Weather").with_permissions("read");

        let err = broker
            .ensure_plugin_privileges(&manifest, "read,write")
            .unwrap_err();
        assert!(matches!(
            err,
            BrokerError::PrivilegeMismatch { ref plugin } if plugin == "Weather"
        ));
        assert!(!broker.plugin_realm().account_exists("plugins.Weather"));

        assert!(broker.ensure_plugin_privileges(&manifest, "read").is_ok());
    }

    #[test]
    fn test_invalid_grant_is_rejected() {
        let broker = AuthorizationBroker::new();
        let manifest = PluginManifest::new("Broken", "plugins.Broken").with_permissions("a::b");
        assert_eq!(
            broker.register_plugin_privileges(&manifest, "a::b"),
            RegistrationOutcome::Rejected
        );
        assert!(!broker.plugin_realm().account_exists("plugins.Broken"));
    }
}
