//! Configuration module for plugauth.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{BrokerError, Result};

/// Security configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Whether authorization is enforced at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Path of the base realm resource.
    #[serde(default = "default_realm_file")]
    pub realm_file: String,
    /// Timeout of impersonation sessions in seconds (0 = never expire).
    /// Login sessions last until logout.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
    /// Failed logins before an account is locked (0 = never lock).
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: u32,
    /// Lockout duration in seconds.
    #[serde(default = "default_lockout")]
    pub lockout_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_realm_file() -> String {
    "config/security.toml".to_string()
}

fn default_session_timeout() -> u64 {
    30 * 60 // 30 minutes
}

fn default_max_login_attempts() -> u32 {
    5
}

fn default_lockout() -> u64 {
    5 * 60 // 5 minutes
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            realm_file: default_realm_file(),
            session_timeout_secs: default_session_timeout(),
            max_login_attempts: default_max_login_attempts(),
            lockout_secs: default_lockout(),
        }
    }
}

impl SecurityConfig {
    /// Impersonation session timeout, `None` when they never expire.
    pub fn session_timeout(&self) -> Option<Duration> {
        match self.session_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Lockout duration.
    pub fn lockout(&self) -> Duration {
        Duration::from_secs(self.lockout_secs)
    }

    /// The realm resource path, made absolute against the working directory.
    pub fn realm_path(&self) -> Result<PathBuf> {
        let path = Path::new(&self.realm_file);
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(std::env::current_dir()?.join(path))
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/plugauth.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Security configuration.
    #[serde(default)]
    pub security: SecurityConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(BrokerError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BrokerError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `PLUGAUTH_SECURITY_ENABLED`: `true`/`false` (also `1`/`0`)
    /// - `PLUGAUTH_REALM_FILE`: path of the base realm resource
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("PLUGAUTH_SECURITY_ENABLED") {
            self.security.enabled = parse_bool(&value).ok_or_else(|| {
                BrokerError::Config(format!("PLUGAUTH_SECURITY_ENABLED: invalid value '{value}'"))
            })?;
        }
        if let Ok(path) = std::env::var("PLUGAUTH_REALM_FILE") {
            if !path.is_empty() {
                self.security.realm_file = path;
            }
        }
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// Returns an error if security is enabled without a realm file.
    pub fn validate(&self) -> Result<()> {
        if self.security.enabled && self.security.realm_file.trim().is_empty() {
            return Err(BrokerError::Config(
                "security is enabled but realm_file is not set. \
                 Set it in config.toml or via PLUGAUTH_REALM_FILE."
                    .to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
