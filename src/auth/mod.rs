//! Credential, permission and session primitives.

mod limiter;
mod password;
pub mod permission;
mod session;

pub use limiter::{LimitResult, LoginLimiter, LOCKOUT_DURATION_SECS, MAX_LOGIN_ATTEMPTS};
pub use password::{
    hash_password, validate_password, verify_password, PasswordError, MAX_PASSWORD_LENGTH,
    MIN_PASSWORD_LENGTH,
};
pub use permission::{PermissionError, WildcardPermission, WILDCARD_TOKEN};
pub use session::{Session, SessionError, SessionRegistry, DEFAULT_SESSION_TIMEOUT_SECS};
