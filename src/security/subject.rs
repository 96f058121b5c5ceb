//! Principals and subjects.

use std::fmt;

/// An identity scoped to a realm. Unique by `(realm, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    /// Name of the realm that owns the identity.
    pub realm: String,
    /// Identifier inside the realm.
    pub id: String,
}

impl Principal {
    /// Create a principal.
    pub fn new(id: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.realm)
    }
}

/// Ordered, non-empty set of principals. The first one is primary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalCollection {
    principals: Vec<Principal>,
}

impl PrincipalCollection {
    /// A collection holding a single principal.
    pub fn single(id: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            principals: vec![Principal::new(id, realm)],
        }
    }

    /// Append another principal unless already present.
    pub fn add(&mut self, principal: Principal) {
        if !self.principals.contains(&principal) {
            self.principals.push(principal);
        }
    }

    /// The primary principal.
    pub fn primary(&self) -> &Principal {
        // Constructors guarantee at least one entry.
        &self.principals[0]
    }

    /// Iterate over all principals.
    pub fn iter(&self) -> impl Iterator<Item = &Principal> {
        self.principals.iter()
    }
}

/// The acting identity of an execution context.
///
/// A subject without principals is anonymous.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Subject {
    principals: Option<PrincipalCollection>,
    session_id: Option<String>,
    authenticated: bool,
}

impl Subject {
    /// The anonymous subject.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A subject carrying exactly `principals`, without a session.
    pub fn with_principals(principals: PrincipalCollection) -> Self {
        Self {
            principals: Some(principals),
            session_id: None,
            authenticated: false,
        }
    }

    /// A subject that proved its identity with a credential.
    pub(crate) fn authenticated(principals: PrincipalCollection, session_id: String) -> Self {
        Self {
            principals: Some(principals),
            session_id: Some(session_id),
            authenticated: true,
        }
    }

    /// Attach a session id.
    pub(crate) fn with_session(mut self, session_id: String) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Principals of the subject, `None` if anonymous.
    pub fn principals(&self) -> Option<&PrincipalCollection> {
        self.principals.as_ref()
    }

    /// Primary principal id, `None` if anonymous.
    pub fn principal(&self) -> Option<&str> {
        self.principals.as_ref().map(|p| p.primary().id.as_str())
    }

    /// Id of the session bound to this subject.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Whether the subject logged in with a credential.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Whether the subject has no principals.
    pub fn is_anonymous(&self) -> bool {
        self.principals.is_none()
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.principals {
            Some(p) => write!(f, "{}", p.primary()),
            None => write!(f, "anonymous"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_subject() {
        let subject = Subject::anonymous();
        assert!(subject.is_anonymous());
        assert!(!subject.is_authenticated());
        assert_eq!(subject.principal(), None);
        assert_eq!(subject.to_string(), "anonymous");
    }

    #[test]
    fn test_subject_with_principals() {
        let subject = Subject::with_principals(PrincipalCollection::single("Weather", "plugins"));
        assert_eq!(subject.principal(), Some("Weather"));
        assert!(!subject.is_authenticated());
        assert_eq!(subject.session_id(), None);
        assert_eq!(subject.to_string(), "Weather@plugins");
    }

    #[test]
    fn test_collection_dedup_and_realms() {
        let mut principals = PrincipalCollection::single("admin", "base");
        principals.add(Principal::new("admin", "base"));
        principals.add(Principal::new("admin", "ldap"));

        assert_eq!(principals.iter().count(), 2);
        assert_eq!(principals.iter().filter(|p| p.realm == "ldap").count(), 1);
        assert_eq!(principals.primary().realm, "base");
    }

    #[test]
    fn test_principal_identity_is_realm_scoped() {
        assert_ne!(Principal::new("x", "base"), Principal::new("x", "plugins"));
    }
}
