//! Persistent granule catalog abstraction
//!
//! The catalog is the system of record for granule metadata. Indexes only
//! talk to it through the [`PersistentGranuleCatalog`] trait, so any store that
//! can query, append and delete records by predicate can back a mosaic.

use crate::compute::predicate::Predicate;
use crate::error::{GranuleError, Result};
use granule_types::envelope::Envelope;
use granule_types::record::GranuleRecord;

mod memory;
pub mod schema;
#[cfg(feature = "snapshot")]
mod snapshot;

pub use memory::MemoryCatalog;
pub use schema::{AttributeDescriptor, AttributeKind, GranuleSchema};
#[cfg(feature = "snapshot")]
pub use snapshot::SnapshotCatalog;

/// Location string that opens a fresh in-memory catalog.
pub const MEMORY_LOCATION: &str = ":memory:";

/// Geometry attribute of catalogs that carry no schema.
pub const DEFAULT_GEOMETRY_ATTRIBUTE: &str = "the_geom";

/// Finite, non-restartable sequence of query results.
///
/// Dropping the cursor releases whatever the catalog holds open for it.
pub type GranuleCursor<'a> = Box<dyn Iterator<Item = Result<GranuleRecord>> + 'a>;

/// Trait for granule catalog implementations
///
/// Implementations own their underlying store. Once `close` has been called,
/// every fallible method returns [`GranuleError::Disposed`].
pub trait PersistentGranuleCatalog: Send + Sync {
    /// Name of the attribute holding granule footprints
    fn geometry_attribute_name(&self) -> &str;

    /// Current schema, if one has been created
    fn schema(&self) -> Result<Option<GranuleSchema>>;

    /// Create or replace the schema
    fn create_schema(&mut self, schema: GranuleSchema) -> Result<()>;

    /// Stream every record matching `filter`
    fn query(&self, filter: &Predicate) -> Result<GranuleCursor<'_>>;

    /// Append records in order, replacing any with the same id.
    ///
    /// Not atomic: when a record fails, the records before it stay written.
    fn append(&mut self, records: &[GranuleRecord]) -> Result<usize>;

    /// Delete every record matching `filter`.
    ///
    /// Returns `None` when the store cannot tell how many records it removed.
    fn delete(&mut self, filter: &Predicate) -> Result<Option<usize>>;

    /// Union of every stored record's envelope; empty when there are none
    fn bounds(&self) -> Result<Envelope>;

    /// Number of stored records
    fn len(&self) -> Result<usize>;

    /// Check if the catalog holds no records
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Release the underlying store
    fn close(&mut self) -> Result<()>;
}

/// Open the catalog at `location`.
///
/// `":memory:"` opens an empty in-memory catalog; any other location is treated
/// as the path of a snapshot file.
pub fn open_catalog(location: &str) -> Result<Box<dyn PersistentGranuleCatalog>> {
    if location.trim().is_empty() {
        return Err(GranuleError::open(location, "empty location"));
    }

    if location == MEMORY_LOCATION {
        return Ok(Box::new(MemoryCatalog::new()));
    }

    #[cfg(feature = "snapshot")]
    {
        Ok(Box::new(SnapshotCatalog::open(location)?))
    }

    #[cfg(not(feature = "snapshot"))]
    {
        Err(GranuleError::open(
            location,
            "file catalogs require the 'snapshot' feature",
        ))
    }
}
