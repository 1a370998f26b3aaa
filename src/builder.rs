//! Index builder for choosing the catalog and caching strategy
//!
//! This module provides the single entry point used at start-up to open a
//! catalog and wrap it in the granule index implementation the configuration
//! asks for.

use crate::catalog::{MEMORY_LOCATION, PersistentGranuleCatalog};
use crate::config::IndexConfig;
use crate::error::{GranuleError, Result};
use crate::index::{GranuleIndex, SpatialTreeCache, StoreBackedIndex};

/// Builder for granule indexes with a configurable catalog and caching mode.
pub struct IndexBuilder {
    location: String,
    catalog: Option<Box<dyn PersistentGranuleCatalog>>,
    config: IndexConfig,
}

impl IndexBuilder {
    /// Create a new builder over an in-memory catalog with caching enabled.
    pub fn new() -> Self {
        Self {
            location: MEMORY_LOCATION.to_string(),
            catalog: None,
            config: IndexConfig::default(),
        }
    }

    /// Open the catalog at `location` when building. See [`crate::catalog::open_catalog`].
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self.catalog = None;
        self
    }

    /// Use a fresh in-memory catalog.
    pub fn in_memory(self) -> Self {
        self.location(MEMORY_LOCATION)
    }

    /// Use an already opened catalog. `location` only names it in logs and errors.
    pub fn catalog(
        mut self,
        location: impl Into<String>,
        catalog: Box<dyn PersistentGranuleCatalog>,
    ) -> Self {
        self.location = location.into();
        self.catalog = Some(catalog);
        self
    }

    pub fn caching(mut self, caching: bool) -> Self {
        self.config = self.config.with_caching(caching);
        self
    }

    /// Replace the whole index configuration.
    pub fn config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    /// Build an index answering every query from the catalog.
    pub fn build_store(self) -> Result<StoreBackedIndex> {
        self.config.validate().map_err(GranuleError::InvalidArgument)?;
        match self.catalog {
            Some(catalog) => StoreBackedIndex::new(self.location, catalog),
            None => StoreBackedIndex::open(&self.location),
        }
    }

    /// Build a cached index regardless of the `caching` setting.
    pub fn build_cached(self) -> Result<SpatialTreeCache> {
        let max_age = self.config.cache_max_age();
        let store = self.build_store()?;
        Ok(match max_age {
            Some(max_age) => SpatialTreeCache::with_max_age(store, max_age),
            None => SpatialTreeCache::new(store),
        })
    }

    /// Build the index selected by the configuration.
    pub fn build(self) -> Result<Box<dyn GranuleIndex>> {
        let caching = self.config.caching;
        let location = self.location.clone();

        let index: Box<dyn GranuleIndex> = if caching {
            Box::new(self.build_cached()?)
        } else {
            Box::new(self.build_store()?)
        };

        log::debug!(
            "Built {} granule index over {}",
            if caching { "cached" } else { "store-backed" },
            location
        );
        Ok(index)
    }
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Open the catalog at `location` and wrap it in a granule index.
pub fn open_index(location: &str, caching: bool) -> Result<Box<dyn GranuleIndex>> {
    IndexBuilder::new()
        .location(location)
        .caching(caching)
        .build()
}
