//! Configuration for granule indexes
//!
//! This module provides the settings consumed by [`crate::IndexBuilder`] and
//! re-exports the shared value types from the `granule-types` crate.
use serde::de::Error;
use std::time::Duration;

pub use granule_types::envelope::Envelope;
pub use granule_types::record::{AttributeValue, GranuleId, GranuleRecord};

/// Index configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    /// Serve queries from an in-memory R*-tree instead of the catalog
    #[serde(default = "IndexConfig::default_caching")]
    pub caching: bool,

    /// Drop a built tree once it is older than this many milliseconds
    #[serde(default)]
    pub cache_max_age_ms: Option<u64>,
}

impl IndexConfig {
    const fn default_caching() -> bool {
        true
    }

    pub fn with_caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    /// Sub-millisecond ages round down to zero and fail [`Self::validate`].
    pub fn with_cache_max_age(mut self, max_age: Duration) -> Self {
        self.cache_max_age_ms = Some(u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn cache_max_age(&self) -> Option<Duration> {
        self.cache_max_age_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.cache_max_age_ms == Some(0) {
            return Err("Cache max age must be at least one millisecond".to_string());
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: IndexConfig = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: IndexConfig = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            caching: Self::default_caching(),
            cache_max_age_ms: None,
        }
    }
}
