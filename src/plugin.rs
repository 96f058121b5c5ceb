//! Plugin manifests as handed over by the host's plugin loader.
//!
//! The broker trusts the manifest, not the plugin: the permission a plugin
//! asks for at runtime is only granted if it equals the one its manifest
//! declares.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::{BrokerError, Result};

/// Manifest key holding the declared permission grant.
pub const PERMISSIONS_KEY: &str = "permissions";

/// Grant assumed when a manifest declares none.
pub const DEFAULT_PLUGIN_PERMISSION: &str = "*";

/// A plugin's manifest.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PluginManifest {
    /// Human readable plugin name, used in logs.
    pub name: String,
    /// Class identifier; becomes the plugin's principal id.
    pub class_name: String,
    /// Free-form configuration properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl PluginManifest {
    /// Create a manifest without properties.
    pub fn new(name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class_name: class_name.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Set a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Declare the permission grant.
    pub fn with_permissions(self, grant: impl Into<String>) -> Self {
        self.with_property(PERMISSIONS_KEY, grant)
    }

    /// Parse a manifest from TOML.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BrokerError::Config(format!("manifest parse error: {e}")))
    }

    /// Load a manifest from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// A property value, or `default` if absent.
    pub fn string_property<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.properties.get(key).map(String::as_str).unwrap_or(default)
    }

    /// The permission grant the manifest declares.
    pub fn declared_permission(&self) -> &str {
        self.string_property(PERMISSIONS_KEY, DEFAULT_PLUGIN_PERMISSION)
    }
}
