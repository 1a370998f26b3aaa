//! Granule index implementations.
//!
//! Two implementations share the [`GranuleIndex`] contract:
//!
//! - [`StoreBackedIndex`] answers every query straight from the catalog.
//! - [`SpatialTreeCache`] wraps a `StoreBackedIndex` and answers queries from
//!   an R*-tree bulk loaded from the catalog, rebuilding it after mutations.
//!
//! Use [`crate::IndexBuilder`] to pick one at start-up.

use crate::catalog::GranuleSchema;
use crate::compute::predicate::Predicate;
use crate::error::Result;
use granule_types::envelope::Envelope;
use granule_types::record::GranuleRecord;

mod cache;
mod rtree;
mod store;

pub use cache::{CacheStats, SpatialTreeCache};
pub use store::StoreBackedIndex;

/// Callback invoked once per matching granule by [`GranuleIndex::visit`].
///
/// An error returned from `visit` stops the traversal and is propagated to
/// the caller.
pub trait GranuleVisitor {
    fn visit(&mut self, granule: &GranuleRecord) -> Result<()>;
}

impl<F> GranuleVisitor for F
where
    F: FnMut(&GranuleRecord) -> Result<()>,
{
    fn visit(&mut self, granule: &GranuleRecord) -> Result<()> {
        self(granule)
    }
}

/// Operations a mosaic reader needs from its granule index.
///
/// Every method fails with [`crate::GranuleError::Disposed`] once
/// [`GranuleIndex::dispose`] has run, except `dispose` itself.
pub trait GranuleIndex: Send + Sync {
    /// Granules whose envelope intersects `envelope`
    fn find_in_envelope(&self, envelope: &Envelope) -> Result<Vec<GranuleRecord>>;

    /// Granules matching `predicate`
    fn find(&self, predicate: &Predicate) -> Result<Vec<GranuleRecord>>;

    /// Stream granules matching `predicate` into `visitor` without collecting them
    fn visit(&self, predicate: &Predicate, visitor: &mut dyn GranuleVisitor) -> Result<()>;

    /// Every granule within the current bounds
    fn find_all(&self) -> Result<Vec<GranuleRecord>>;

    fn add_granule(&self, granule: GranuleRecord) -> Result<()>;

    /// Add a batch of granules.
    ///
    /// Not atomic: on failure the granules written before it stay in the
    /// catalog and the bounds are refreshed to include them.
    fn add_granules(&self, granules: Vec<GranuleRecord>) -> Result<()>;

    /// Remove granules matching `predicate`.
    ///
    /// Returns `None` when the catalog cannot report how many were removed;
    /// that means "unknown", not zero.
    fn remove_granules(&self, predicate: &Predicate) -> Result<Option<usize>>;

    /// Aggregate envelope of the catalog, as of the last mutation
    fn bounds(&self) -> Result<Envelope>;

    fn create_type(&self, schema: GranuleSchema) -> Result<()>;

    fn get_type(&self) -> Result<Option<GranuleSchema>>;

    /// Release the catalog and any cached state. Safe to call more than once.
    fn dispose(&self) -> Result<()>;
}
