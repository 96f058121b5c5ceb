//! Operator realm backed by a TOML resource.
//!
//! ```toml
//! [users.admin]
//! password = "$argon2id$v=19$m=19456,t=2,p=1$..."
//! roles = ["admin"]
//!
//! [roles]
//! admin = "*"
//! viewer = "devices:read, plugins:read"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Account, AuthError, AuthenticationToken, Realm, BASE_REALM_NAME};
use crate::auth::permission::parse_grant;
use crate::auth::{hash_password, verify_password, PasswordError, WildcardPermission};
use crate::security::PrincipalCollection;

/// One account of the realm file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntry {
    /// Argon2id PHC hash of the credential.
    pub password: String,
    /// Assigned role names.
    #[serde(default)]
    pub roles: Vec<String>,
}

/// On-disk layout of the realm resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RealmFile {
    /// Accounts by username.
    #[serde(default)]
    pub users: BTreeMap<String, UserEntry>,
    /// Permission grant strings by role name.
    #[serde(default)]
    pub roles: BTreeMap<String, String>,
}

impl RealmFile {
    /// Parse a realm resource.
    pub fn parse(s: &str) -> Result<Self, AuthError> {
        toml::from_str(s).map_err(|e| AuthError::Resource(format!("realm file parse error: {e}")))
    }
}

#[derive(Debug, Default)]
struct State {
    path: Option<PathBuf>,
    file: RealmFile,
    grants: BTreeMap<String, Vec<WildcardPermission>>,
}

/// Persistent-credential realm.
#[derive(Debug)]
pub struct FileRealm {
    name: String,
    state: RwLock<State>,
}

impl Default for FileRealm {
    fn default() -> Self {
        Self::new()
    }
}

impl FileRealm {
    /// The operator realm, without a resource path yet.
    pub fn new() -> Self {
        Self::named(BASE_REALM_NAME)
    }

    /// A file realm with a custom name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(State::default()),
        }
    }

    /// Set where [`init`](Realm::init) loads from and [`persist`](Self::persist) writes to.
    pub fn set_resource_path(&self, path: impl AsRef<Path>) {
        self.state.write().path = Some(path.as_ref().to_path_buf());
    }

    /// The configured resource path.
    pub fn resource_path(&self) -> Option<PathBuf> {
        self.state.read().path.clone()
    }

    /// Write the current accounts and roles back to the resource.
    pub fn persist(&self) -> Result<(), AuthError> {
        let state = self.state.read();
        let path = state.path.as_ref().ok_or_else(no_path)?;
        let content = toml::to_string_pretty(&state.file)
            .map_err(|e| AuthError::Resource(format!("realm file encode error: {e}")))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| io_error(path, e))?;
            }
        }
        fs::write(path, content).map_err(|e| io_error(path, e))?;

        info!(realm = %self.name, path = %path.display(), "Realm persisted");
        Ok(())
    }

    /// Number of accounts.
    pub fn account_count(&self) -> usize {
        self.state.read().file.users.len()
    }
}

fn no_path() -> AuthError {
    AuthError::Resource("no resource path configured".to_string())
}

fn io_error(path: &Path, e: std::io::Error) -> AuthError {
    AuthError::Resource(format!("{}: {e}", path.display()))
}

fn compile_grants(
    roles: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, Vec<WildcardPermission>>, AuthError> {
    roles
        .iter()
        .map(|(role, grant)| {
            parse_grant(grant)
                .map(|perms| (role.clone(), perms))
                .map_err(|e| AuthError::Resource(format!("role {role}: {e}")))
        })
        .collect()
}

impl Realm for FileRealm {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self) -> Result<(), AuthError> {
        let path = self.resource_path().ok_or_else(no_path)?;
        let content = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
        let file = RealmFile::parse(&content)?;
        let grants = compile_grants(&file.roles)?;

        for (username, user) in &file.users {
            for role in &user.roles {
                if !grants.contains_key(role) {
                    warn!(
                        realm = %self.name,
                        username = %username,
                        role = %role,
                        "Account references undefined role"
                    );
                }
            }
        }

        let mut state = self.state.write();
        info!(
            realm = %self.name,
            path = %path.display(),
            accounts = file.users.len(),
            roles = file.roles.len(),
            "Realm loaded"
        );
        state.file = file;
        state.grants = grants;
        Ok(())
    }

    fn account_exists(&self, id: &str) -> bool {
        self.state.read().file.users.contains_key(id)
    }

    fn authenticate(&self, token: &AuthenticationToken) -> Result<Account, AuthError> {
        // Hash verification is slow; keep it outside the lock.
        let user = self
            .state
            .read()
            .file
            .users
            .get(&token.username)
            .cloned()
            .ok_or_else(|| AuthError::UnknownAccount(token.username.clone()))?;

        match verify_password(token.credential(), &user.password) {
            Ok(()) => {
                debug!(realm = %self.name, username = %token.username, "Credential verified");
                Ok(Account {
                    principals: PrincipalCollection::single(&token.username, &self.name),
                    roles: user.roles,
                })
            }
            Err(PasswordError::VerificationFailed) => {
                Err(AuthError::IncorrectCredentials(token.username.clone()))
            }
            Err(e) => Err(AuthError::Credential(e)),
        }
    }

    fn permissions_of(&self, id: &str) -> Vec<WildcardPermission> {
        let state = self.state.read();
        let Some(user) = state.file.users.get(id) else {
            return Vec::new();
        };
        user.roles
            .iter()
            .filter_map(|role| state.grants.get(role))
            .flatten()
            .cloned()
            .collect()
    }

    fn add_account(&self, id: &str, credential: &str, roles: &[&str]) -> Result<(), AuthError> {
        if self.account_exists(id) {
            return Err(AuthError::DuplicateAccount(id.to_string()));
        }
        let password = hash_password(credential)?;

        let mut state = self.state.write();
        if state.file.users.contains_key(id) {
            return Err(AuthError::DuplicateAccount(id.to_string()));
        }
        state.file.users.insert(
            id.to_string(),
            UserEntry {
                password,
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
        );
        Ok(())
    }

    fn add_role(&self, role: &str, grant: &str) -> Result<(), AuthError> {
        let permissions = parse_grant(grant)?;
        let mut state = self.state.write();
        state.file.roles.insert(role.to_string(), grant.to_string());
        state.grants.insert(role.to_string(), permissions);
        Ok(())
    }
}
