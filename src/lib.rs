//! Spatial index over the granule catalog of a raster mosaic.
//!
//! ```rust
//! use granule_index::prelude::*;
//!
//! let index = IndexBuilder::new().in_memory().build()?;
//!
//! let footprint = Rect::new((0.0, 0.0), (10.0, 10.0)).to_polygon();
//! index.add_granule(GranuleRecord::new("tile-a", footprint).with_attribute("location", "a.tif"))?;
//!
//! let hits = index.find_in_envelope(&Envelope::new(2.0, 2.0, 4.0, 4.0))?;
//! assert_eq!(hits.len(), 1);
//! # Ok::<(), granule_index::GranuleError>(())
//! ```

pub mod builder;
pub mod catalog;
pub mod compute;
pub mod config;
pub mod error;
pub mod index;

pub use builder::{IndexBuilder, open_index};
pub use error::{GranuleError, Result};

pub use geo::{Point, Polygon, Rect};

pub use catalog::{
    AttributeDescriptor, AttributeKind, GranuleCursor, GranuleSchema, MemoryCatalog,
    PersistentGranuleCatalog, open_catalog,
};
#[cfg(feature = "snapshot")]
pub use catalog::SnapshotCatalog;

pub use compute::extract::extract_bbox;
pub use compute::predicate::{CompareOp, Predicate};

pub use config::{AttributeValue, Envelope, GranuleId, GranuleRecord, IndexConfig};

pub use index::{CacheStats, GranuleIndex, GranuleVisitor, SpatialTreeCache, StoreBackedIndex};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{GranuleError, IndexBuilder, Result, open_index};

    pub use geo::{Point, Polygon, Rect};

    pub use crate::{AttributeValue, Envelope, GranuleId, GranuleRecord, IndexConfig};

    pub use crate::{GranuleIndex, GranuleVisitor, Predicate};

    pub use crate::{GranuleSchema, MemoryCatalog, PersistentGranuleCatalog};

    #[cfg(feature = "snapshot")]
    pub use crate::SnapshotCatalog;

    pub use std::time::Duration;
}
