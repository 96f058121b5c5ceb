//! plugauth - authorization broker for plugin-hosting platforms
//!
//! Operators authenticate against a realm resource, plugins receive a fixed
//! permission grant from their manifest, and plugin code runs under its own
//! identity so every permission check is made against the right subject.

pub mod auth;
pub mod broker;
pub mod config;
pub mod error;
pub mod logging;
pub mod plugin;
pub mod realm;
pub mod security;

pub use auth::{
    hash_password, validate_password, verify_password, LimitResult, LoginLimiter, PasswordError,
    PermissionError, Session, SessionError, SessionRegistry, WildcardPermission,
};
pub use broker::{
    AuthorizationBroker, PrivilegedFuture, RegistrationOutcome, PERM_FAKE_USER,
    PERM_REALMS_CREATE, PERM_REALMS_DELETE,
};
pub use config::{Config, LoggingConfig, SecurityConfig};
pub use error::{BrokerError, Result};
pub use plugin::PluginManifest;
pub use realm::{
    Account, AuthError, AuthenticationToken, FileRealm, MemoryRealm, Realm, RealmFile,
    RealmRegistry, UserEntry, BASE_REALM_NAME, PLUGIN_REALM_NAME,
};
pub use security::{Principal, PrincipalCollection, SecurityManager, Subject};
