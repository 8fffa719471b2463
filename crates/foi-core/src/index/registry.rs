//! Named stores and the index groups built from configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use super::IndexGroup;
use crate::config::{ConfigError, FoiConfig};
use crate::error::Result;
use crate::store::{Clock, Store, SystemClock};

/// Store connections by name, referenced from group configuration.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    stores: BTreeMap<String, Arc<dyn Store>>,
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StoreRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `store` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, store: Arc<dyn Store>) -> &mut Self {
        self.stores.insert(name.into(), store);
        self
    }

    /// Builder form of [`StoreRegistry::register`].
    #[must_use]
    pub fn with_store(mut self, name: impl Into<String>, store: Arc<dyn Store>) -> Self {
        self.register(name, store);
        self
    }

    /// Store registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Store>> {
        self.stores.get(name)
    }
}

/// Index groups built from a [`FoiConfig`], by name.
#[derive(Debug, Clone, Default)]
pub struct IndexGroupRegistry {
    groups: BTreeMap<String, IndexGroup>,
}

impl IndexGroupRegistry {
    /// Validates `config` and builds one group per configured entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the configuration is invalid or a
    /// group references an unknown store.
    pub fn from_config(config: &FoiConfig, stores: &StoreRegistry) -> Result<Self> {
        Self::from_config_with_clock(config, stores, Arc::new(SystemClock))
    }

    /// Same as [`IndexGroupRegistry::from_config`], with groups polling
    /// locks on `clock`.
    pub fn from_config_with_clock(
        config: &FoiConfig,
        stores: &StoreRegistry,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let mut groups = BTreeMap::new();
        for (name, group_config) in &config.index_groups {
            let store = stores.get(&group_config.store).ok_or_else(|| ConfigError::InvalidValue {
                key: format!("index_groups.{name}.store"),
                message: format!("unknown store '{}'", group_config.store),
            })?;
            let options = config.group_options(name).unwrap_or_default();
            let group = IndexGroup::new(name.clone(), store.clone(), options)?
                .with_tenant(config.tenant_namespace.clone())
                .with_clock(clock.clone());
            groups.insert(name.clone(), group);
        }

        info!(groups = groups.len(), "Built index groups from configuration");
        Ok(Self { groups })
    }

    /// Group named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&IndexGroup> {
        self.groups.get(name)
    }

    /// Group names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if no group is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Iterates groups by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexGroup)> {
        self.groups.iter().map(|(name, group)| (name.as_str(), group))
    }
}
