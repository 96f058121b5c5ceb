//! Test helpers for broker integration tests.
//!
//! Provides a realm resource in a temporary directory and a broker
//! initialized against it.

#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;

use plugauth::{hash_password, AuthorizationBroker, SecurityConfig};

pub const ADMIN: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-secret";
pub const OPERATOR: &str = "operator";
pub const OPERATOR_PASSWORD: &str = "operator-secret";
pub const AUDITOR: &str = "auditor";
pub const AUDITOR_PASSWORD: &str = "auditor-secret";

/// Write a realm file with three operators.
///
/// - `admin` holds `*`
/// - `operator` may read devices
/// - `auditor` may read devices and impersonate (`auth:fakeUser`)
pub fn write_realm_file(dir: &TempDir) -> PathBuf {
    let content = format!(
        r#"
[users.{ADMIN}]
password = "{}"
roles = ["admin"]

[users.{OPERATOR}]
password = "{}"
roles = ["viewer"]

[users.{AUDITOR}]
password = "{}"
roles = ["viewer", "impersonator"]

[roles]
admin = "*"
viewer = "devices:read"
impersonator = "auth:fakeUser"
"#,
        hash_password(ADMIN_PASSWORD).unwrap(),
        hash_password(OPERATOR_PASSWORD).unwrap(),
        hash_password(AUDITOR_PASSWORD).unwrap(),
    );
    let path = dir.path().join("security.toml");
    std::fs::write(&path, content).unwrap();
    path
}

/// Security configuration pointing at a fresh realm file.
pub fn test_config(dir: &TempDir) -> SecurityConfig {
    SecurityConfig {
        realm_file: write_realm_file(dir).display().to_string(),
        max_login_attempts: 3,
        lockout_secs: 60,
        ..SecurityConfig::default()
    }
}

/// An initialized broker. Keep the directory alive as long as the broker.
pub fn initialized_broker() -> (TempDir, AuthorizationBroker) {
    let dir = TempDir::new().unwrap();
    let broker = AuthorizationBroker::new();
    broker.initialize(&test_config(&dir)).unwrap();
    assert!(broker.is_initialized());
    (dir, broker)
}
