//! Subjects, the ambient subject slot and the security manager.

pub mod ambient;
mod manager;
mod subject;

pub use ambient::{Scoped, SubjectGuard};
pub use manager::SecurityManager;
pub use subject::{Principal, PrincipalCollection, Subject};
