//! In-memory realm for plugin identities.

use std::collections::HashMap;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use super::{Account, AuthError, AuthenticationToken, Realm, PLUGIN_REALM_NAME};
use crate::auth::permission::parse_grant;
use crate::auth::WildcardPermission;
use crate::security::PrincipalCollection;

#[derive(Debug)]
struct MemoryAccount {
    credential_digest: [u8; 32],
    roles: Vec<String>,
}

#[derive(Debug)]
struct RoleGrant {
    grant: String,
    permissions: Vec<WildcardPermission>,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<String, MemoryAccount>,
    roles: HashMap<String, RoleGrant>,
}

/// Realm that starts empty and lives only in memory.
#[derive(Debug)]
pub struct MemoryRealm {
    name: String,
    state: RwLock<State>,
}

impl Default for MemoryRealm {
    fn default() -> Self {
        Self::new()
    }
}

fn digest(credential: &str) -> [u8; 32] {
    Sha256::digest(credential.as_bytes()).into()
}

impl MemoryRealm {
    /// The plugin realm.
    pub fn new() -> Self {
        Self::named(PLUGIN_REALM_NAME)
    }

    /// A memory realm with a custom name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(State::default()),
        }
    }

    /// Create an account and its single role in one step.
    ///
    /// Fails with [`AuthError::DuplicateAccount`] if `id` exists; nothing is
    /// changed in that case.
    pub fn add_account_with_role(
        &self,
        id: &str,
        credential: &str,
        role: &str,
        grant: &str,
    ) -> Result<(), AuthError> {
        let permissions = parse_grant(grant)?;
        let mut state = self.state.write();
        if state.accounts.contains_key(id) {
            return Err(AuthError::DuplicateAccount(id.to_string()));
        }
        state.roles.insert(
            role.to_string(),
            RoleGrant {
                grant: grant.to_string(),
                permissions,
            },
        );
        state.accounts.insert(
            id.to_string(),
            MemoryAccount {
                credential_digest: digest(credential),
                roles: vec![role.to_string()],
            },
        );
        Ok(())
    }

    /// The raw grant strings bound to `id`, joined with commas.
    pub fn grant_of(&self, id: &str) -> Option<String> {
        let state = self.state.read();
        let account = state.accounts.get(id)?;
        let grants: Vec<&str> = account
            .roles
            .iter()
            .filter_map(|r| state.roles.get(r))
            .map(|g| g.grant.as_str())
            .collect();
        Some(grants.join(","))
    }

    /// Number of accounts.
    pub fn account_count(&self) -> usize {
        self.state.read().accounts.len()
    }
}

impl Realm for MemoryRealm {
    fn name(&self) -> &str {
        &self.name
    }

    fn account_exists(&self, id: &str) -> bool {
        self.state.read().accounts.contains_key(id)
    }

    fn authenticate(&self, token: &AuthenticationToken) -> Result<Account, AuthError> {
        let state = self.state.read();
        let account = state
            .accounts
            .get(&token.username)
            .ok_or_else(|| AuthError::UnknownAccount(token.username.clone()))?;
        if account.credential_digest != digest(token.credential()) {
            return Err(AuthError::IncorrectCredentials(token.username.clone()));
        }
        Ok(Account {
            principals: PrincipalCollection::single(&token.username, &self.name),
            roles: account.roles.clone(),
        })
    }

    fn permissions_of(&self, id: &str) -> Vec<WildcardPermission> {
        let state = self.state.read();
        let Some(account) = state.accounts.get(id) else {
            return Vec::new();
        };
        account
            .roles
            .iter()
            .filter_map(|r| state.roles.get(r))
            .flat_map(|g| g.permissions.iter().cloned())
            .collect()
    }

    fn add_account(&self, id: &str, credential: &str, roles: &[&str]) -> Result<(), AuthError> {
        let mut state = self.state.write();
        if state.accounts.contains_key(id) {
            return Err(AuthError::DuplicateAccount(id.to_string()));
        }
        state.accounts.insert(
            id.to_string(),
            MemoryAccount {
                credential_digest: digest(credential),
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
        );
        Ok(())
    }

    fn add_role(&self, role: &str, grant: &str) -> Result<(), AuthError> {
        let permissions = parse_grant(grant)?;
        self.state.write().roles.insert(
            role.to_string(),
            RoleGrant {
                grant: grant.to_string(),
                permissions,
            },
        );
        Ok(())
    }
}
