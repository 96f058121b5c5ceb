//! Ordered realm registry.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use super::Realm;

/// Ordered set of realms, unique by name.
///
/// Realms named at construction are protected and can never be removed.
#[derive(Debug)]
pub struct RealmRegistry {
    realms: RwLock<Vec<Arc<dyn Realm>>>,
    protected: Vec<String>,
}

impl RealmRegistry {
    /// Create a registry whose initial realms are all protected.
    pub fn new(builtin: Vec<Arc<dyn Realm>>) -> Self {
        let protected = builtin.iter().map(|r| r.name().to_string()).collect();
        Self {
            realms: RwLock::new(builtin),
            protected,
        }
    }

    /// Append a realm. Returns `false` if one with the same name exists.
    pub fn add(&self, realm: Arc<dyn Realm>) -> bool {
        let mut realms = self.realms.write();
        if realms.iter().any(|r| r.name() == realm.name()) {
            return false;
        }
        info!(realm = %realm.name(), "Realm added");
        realms.push(realm);
        true
    }

    /// Remove a realm by name. Protected realms are never removed.
    pub fn remove(&self, name: &str) -> bool {
        if self.is_protected(name) {
            warn!(realm = %name, "Refusing to remove built-in realm");
            return false;
        }
        let mut realms = self.realms.write();
        let before = realms.len();
        realms.retain(|r| r.name() != name);
        let removed = realms.len() != before;
        if removed {
            info!(realm = %name, "Realm removed");
        }
        removed
    }

    /// Whether `name` is a built-in realm.
    pub fn is_protected(&self, name: &str) -> bool {
        self.protected.iter().any(|p| p == name)
    }

    /// Look up a realm by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Realm>> {
        self.realms.read().iter().find(|r| r.name() == name).cloned()
    }

    /// Snapshot of the realms in consultation order.
    pub fn snapshot(&self) -> Vec<Arc<dyn Realm>> {
        self.realms.read().clone()
    }

    /// Realm names in order.
    pub fn names(&self) -> Vec<String> {
        self.realms
            .read()
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }

    /// Number of registered realms.
    pub fn len(&self) -> usize {
        self.realms.read().len()
    }

    /// Whether no realm is registered.
    pub fn is_empty(&self) -> bool {
        self.realms.read().is_empty()
    }
}
