//! Filtered object index configuration.
//!
//! Describes the index groups to build, which named store each one uses,
//! and the lock and temporary key tunables.
//!
//! # Priority (highest to lowest)
//!
//! 1. Environment variables (`FOI_*`, nested keys separated by `__`,
//!    e.g. `FOI_LOCK__WAIT_TIMEOUT_SECS=1`)
//! 2. Configuration file (`foi.toml`)
//! 3. Default values
//!
//! ```toml
//! tenant_namespace = "acme"
//! temporary_key_ttl_secs = 180
//!
//! [lock]
//! wait_timeout_secs = 3
//! poll_interval_ms = 10
//!
//! [index_groups.food]
//! store = "default"
//! object_lock_ttl = 5
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::index::{IndexGroupOptions, LockWait, DEFAULT_OBJECT_LOCK_TTL};
use crate::set::TEMPORARY_KEY_TTL;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// Object lock section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Seconds a mutation waits for an object lock (0 = one attempt).
    pub wait_timeout_secs: i64,
    /// Milliseconds between two lock attempts.
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: 3,
            poll_interval_ms: 10,
        }
    }
}

/// One index group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Name of the store the group uses, resolved in a `StoreRegistry`.
    pub store: String,
    /// Seconds before an unreleased object lock expires.
    #[serde(default = "default_object_lock_ttl")]
    pub object_lock_ttl: u64,
}

fn default_object_lock_ttl() -> u64 {
    DEFAULT_OBJECT_LOCK_TTL
}

impl GroupConfig {
    /// Group using `store` with default lock TTL.
    #[must_use]
    pub fn new(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            object_lock_ttl: DEFAULT_OBJECT_LOCK_TTL,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoiConfig {
    /// Tenant segment inserted after the key root, if any.
    pub tenant_namespace: Option<String>,
    /// Safety-net TTL of temporary calculation keys, in seconds.
    pub temporary_key_ttl_secs: u64,
    /// Object lock section.
    pub lock: LockConfig,
    /// Index groups by name.
    pub index_groups: BTreeMap<String, GroupConfig>,
}

impl Default for FoiConfig {
    fn default() -> Self {
        Self {
            tenant_namespace: None,
            temporary_key_ttl_secs: TEMPORARY_KEY_TTL,
            lock: LockConfig::default(),
            index_groups: BTreeMap::new(),
        }
    }
}

impl FoiConfig {
    /// Loads configuration from `foi.toml` and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("foi.toml")
    }

    /// Loads configuration from a specific file path, then the environment.
    ///
    /// A missing file leaves the defaults in place.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("FOI_").split("__"));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Creates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index_groups.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "index_groups".to_string(),
                message: "at least one index group is required".to_string(),
            });
        }

        if let Some(tenant) = &self.tenant_namespace {
            if tenant.contains('*') {
                return Err(ConfigError::InvalidValue {
                    key: "tenant_namespace".to_string(),
                    message: format!("value '{tenant}' must not contain '*'"),
                });
            }
        }

        if self.lock.wait_timeout_secs < 0 {
            return Err(ConfigError::InvalidValue {
                key: "lock.wait_timeout_secs".to_string(),
                message: format!("value {} must be >= 0", self.lock.wait_timeout_secs),
            });
        }

        if self.temporary_key_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "temporary_key_ttl_secs".to_string(),
                message: "value must be > 0".to_string(),
            });
        }

        for (name, group) in &self.index_groups {
            if let Err(e) = crate::index::validate_group_name(name) {
                return Err(ConfigError::InvalidValue {
                    key: format!("index_groups.{name}"),
                    message: e.to_string(),
                });
            }
            if group.store.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("index_groups.{name}.store"),
                    message: "store reference must not be empty".to_string(),
                });
            }
            if group.object_lock_ttl == 0 {
                return Err(ConfigError::InvalidValue {
                    key: format!("index_groups.{name}.object_lock_ttl"),
                    message: "value must be > 0".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Default lock wait of mutations.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured timeout is negative.
    pub fn lock_wait(&self) -> Result<LockWait, ConfigError> {
        LockWait::seconds(self.lock.wait_timeout_secs).map_err(|e| ConfigError::InvalidValue {
            key: "lock.wait_timeout_secs".to_string(),
            message: e.to_string(),
        })
    }

    /// Options of the group named `name`, if configured.
    #[must_use]
    pub fn group_options(&self, name: &str) -> Option<IndexGroupOptions> {
        self.index_groups.get(name).map(|group| IndexGroupOptions {
            object_lock_ttl: group.object_lock_ttl,
            lock_poll_interval: Duration::from_millis(self.lock.poll_interval_ms),
            temporary_key_ttl: self.temporary_key_ttl_secs,
        })
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}
