//! Wildcard permission strings.
//!
//! A permission is a list of `:`-separated parts, each part a set of
//! `,`-separated tokens:
//!
//! ```text
//! devices:read            one token per part
//! devices:read,write:*    any instance of read or write on devices
//! *                       everything
//! ```
//!
//! A granted permission implies a requested one when every granted part is a
//! superset of the corresponding requested part (or contains `*`). Missing
//! trailing parts on the granted side act as `*`; extra trailing parts on the
//! granted side must be `*`. Tokens are compared case-insensitively.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// The wildcard token.
pub const WILDCARD_TOKEN: &str = "*";

const PART_DIVIDER: char = ':';
const SUBPART_DIVIDER: char = ',';

/// Permission parsing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    /// The permission string is empty.
    #[error("permission string is empty")]
    Empty,

    /// A part of the permission string holds no tokens.
    #[error("permission '{0}' contains an empty part")]
    EmptyPart(String),

    /// A grant string has an unterminated quote.
    #[error("unterminated quote in grant '{0}'")]
    UnterminatedQuote(String),
}

/// A parsed wildcard permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPermission {
    parts: Vec<BTreeSet<String>>,
}

impl WildcardPermission {
    /// Parse a permission string.
    pub fn parse(s: &str) -> Result<Self, PermissionError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PermissionError::Empty);
        }

        let mut parts = Vec::new();
        for part in trimmed.split(PART_DIVIDER) {
            let tokens: BTreeSet<String> = part
                .split(SUBPART_DIVIDER)
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
            if tokens.is_empty() {
                return Err(PermissionError::EmptyPart(trimmed.to_string()));
            }
            parts.push(tokens);
        }

        Ok(Self { parts })
    }

    /// The permission that implies every other permission.
    pub fn all() -> Self {
        Self {
            parts: vec![BTreeSet::from([WILDCARD_TOKEN.to_string()])],
        }
    }

    /// Whether holding `self` grants `requested`.
    pub fn implies(&self, requested: &WildcardPermission) -> bool {
        for (i, wanted) in requested.parts.iter().enumerate() {
            // A shorter grant covers everything below its last part.
            let Some(granted) = self.parts.get(i) else {
                return true;
            };
            if !granted.contains(WILDCARD_TOKEN) && !granted.is_superset(wanted) {
                return false;
            }
        }

        self.parts
            .iter()
            .skip(requested.parts.len())
            .all(|granted| granted.contains(WILDCARD_TOKEN))
    }
}

impl FromStr for WildcardPermission {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for WildcardPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .parts
            .iter()
            .map(|tokens| tokens.iter().cloned().collect::<Vec<_>>().join(","))
            .collect();
        write!(f, "{}", rendered.join(":"))
    }
}

/// Split a role grant string into individual permission strings.
///
/// Permissions are separated by commas; a permission containing commas of
/// its own must be wrapped in double quotes.
///
/// ```
/// use plugauth::auth::permission::split_grant;
///
/// let perms = split_grant(r#"devices:read, "auth:realms:create,delete""#).unwrap();
/// assert_eq!(perms, vec!["devices:read", "auth:realms:create,delete"]);
/// ```
pub fn split_grant(grant: &str) -> Result<Vec<String>, PermissionError> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in grant.chars() {
        match c {
            '"' => quoted = !quoted,
            SUBPART_DIVIDER if !quoted => {
                push_trimmed(&mut out, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if quoted {
        return Err(PermissionError::UnterminatedQuote(grant.to_string()));
    }
    push_trimmed(&mut out, &current);

    Ok(out)
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let s = s.trim();
    if !s.is_empty() {
        out.push(s.to_string());
    }
}

/// Parse a role grant string into permissions.
pub fn parse_grant(grant: &str) -> Result<Vec<WildcardPermission>, PermissionError> {
    split_grant(grant)?
        .iter()
        .map(|p| WildcardPermission::parse(p))
        .collect()
}
