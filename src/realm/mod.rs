//! Realms: named stores of accounts, credentials, and role grants.
//!
//! The broker ships two realms. [`FileRealm`] holds operator accounts loaded
//! from a TOML resource, [`MemoryRealm`] holds the plugin identities created
//! at runtime. Further realms can be registered through the broker.

mod file;
mod memory;
mod registry;

use std::fmt;

use thiserror::Error;

use crate::auth::{PasswordError, PermissionError, WildcardPermission};
use crate::security::PrincipalCollection;

pub use file::{FileRealm, RealmFile, UserEntry};
pub use memory::MemoryRealm;
pub use registry::RealmRegistry;

/// Name of the operator realm.
pub const BASE_REALM_NAME: &str = "plugauth.base";

/// Name of the plugin realm.
pub const PLUGIN_REALM_NAME: &str = "plugauth.plugins";

/// Authentication and realm errors.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No realm knows the account.
    #[error("unknown account: {0}")]
    UnknownAccount(String),

    /// The credential does not match.
    #[error("incorrect credentials for account {0}")]
    IncorrectCredentials(String),

    /// Too many failed attempts.
    #[error("account locked for {0} seconds")]
    AccountLocked(u64),

    /// The account already exists.
    #[error("account already exists: {0}")]
    DuplicateAccount(String),

    /// The realm's backing resource could not be read or written.
    #[error("realm resource error: {0}")]
    Resource(String),

    /// A credential could not be hashed or checked.
    #[error(transparent)]
    Credential(#[from] PasswordError),

    /// A role grant string could not be parsed.
    #[error("invalid grant: {0}")]
    InvalidGrant(#[from] PermissionError),

    /// Authentication was attempted before the broker was initialized.
    #[error("security manager is not initialized")]
    NotInitialized,
}

/// Username/credential pair presented at login.
#[derive(Clone)]
pub struct AuthenticationToken {
    /// Account identifier.
    pub username: String,
    credential: String,
}

impl AuthenticationToken {
    /// Create a token.
    pub fn new(username: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            credential: credential.into(),
        }
    }

    /// The presented credential.
    pub fn credential(&self) -> &str {
        &self.credential
    }
}

impl fmt::Debug for AuthenticationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationToken")
            .field("username", &self.username)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// An authenticated account as reported by a realm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Principals of the account, scoped to the realm that owns it.
    pub principals: PrincipalCollection,
    /// Role names assigned to the account.
    pub roles: Vec<String>,
}

/// Capability set every realm provides.
pub trait Realm: Send + Sync + fmt::Debug {
    /// Unique realm name; principals are scoped to it.
    fn name(&self) -> &str;

    /// Prepare the realm (load its resource). Called again to reload.
    fn init(&self) -> Result<(), AuthError> {
        Ok(())
    }

    /// Whether the realm holds an account for `id`.
    fn account_exists(&self, id: &str) -> bool;

    /// Check the token's credential.
    fn authenticate(&self, token: &AuthenticationToken) -> Result<Account, AuthError>;

    /// All permissions granted to `id` through its roles.
    fn permissions_of(&self, id: &str) -> Vec<WildcardPermission>;

    /// Add an account bound to `roles`.
    fn add_account(&self, id: &str, credential: &str, roles: &[&str]) -> Result<(), AuthError>;

    /// Bind `role` to a comma-separated permission grant.
    fn add_role(&self, role: &str, grant: &str) -> Result<(), AuthError>;
}

/// Whether any permission in `granted` implies `requested`.
pub(crate) fn implies_any(granted: &[WildcardPermission], requested: &WildcardPermission) -> bool {
    granted.iter().any(|g| g.implies(requested))
}
