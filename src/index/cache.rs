//! Granule index served from a lazily built R*-tree.
//!
//! The tree is bulk loaded from the wrapped [`StoreBackedIndex`] on first use
//! and dropped whenever the catalog is mutated through this index, explicitly
//! evicted, or older than the configured maximum age. The next read rebuilds
//! it from the current catalog state.
//!
//! # Locking
//!
//! The cache lock and the store lock are distinct. A rebuild holds the cache
//! write lock and reads the granules, bounds and geometry attribute under one
//! store read lock inside it. Queries only touch the tree and the bounds
//! captured with it. Mutations take and release the store write lock first,
//! and only then take the cache write lock to invalidate. Nothing ever waits
//! for the cache lock while holding the store lock.

use super::rtree::GranuleTree;
use super::store::StoreBackedIndex;
use super::{GranuleIndex, GranuleVisitor};
use crate::catalog::GranuleSchema;
use crate::compute::extract::extract_bbox;
use crate::compute::predicate::Predicate;
use crate::error::{GranuleError, Result};
use granule_types::envelope::Envelope;
use granule_types::record::GranuleRecord;
use parking_lot::{RwLock, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Tree plus the catalog bounds and geometry attribute it was built from,
/// all taken from the same catalog state.
struct CachedTree {
    tree: GranuleTree,
    bounds: Envelope,
    geometry_attribute: String,
    built_at: Instant,
}

/// Counters describing cache activity since creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Completed tree builds
    pub builds: u64,
    /// Trees dropped because the catalog was mutated
    pub invalidations: u64,
    /// Trees dropped by `evict` or for exceeding the maximum age
    pub evictions: u64,
    /// Queries answered from the tree
    pub queries: u64,
    /// Granules in the current tree, 0 when none is built
    pub entries: usize,
}

/// Read-optimized granule index over a [`StoreBackedIndex`].
pub struct SpatialTreeCache {
    store: StoreBackedIndex,
    tree: RwLock<Option<CachedTree>>,
    max_age: Option<Duration>,
    disposed: AtomicBool,
    builds: AtomicU64,
    invalidations: AtomicU64,
    evictions: AtomicU64,
    queries: AtomicU64,
}

impl SpatialTreeCache {
    /// Wrap `store`; the tree is built on the first query.
    pub fn new(store: StoreBackedIndex) -> Self {
        Self {
            store,
            tree: RwLock::new(None),
            max_age: None,
            disposed: AtomicBool::new(false),
            builds: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            queries: AtomicU64::new(0),
        }
    }

    /// Wrap `store`, treating any tree older than `max_age` as evicted.
    pub fn with_max_age(store: StoreBackedIndex, max_age: Duration) -> Self {
        Self {
            max_age: Some(max_age),
            ..Self::new(store)
        }
    }

    /// The wrapped catalog-backed index. Mutating it directly bypasses
    /// invalidation, so it stays inside the crate.
    pub(crate) fn store(&self) -> &StoreBackedIndex {
        &self.store
    }

    /// Location of the wrapped catalog
    pub fn location(&self) -> &str {
        self.store.location()
    }

    /// Whether a usable tree is currently held.
    pub fn is_built(&self) -> bool {
        self.tree
            .read()
            .as_ref()
            .is_some_and(|cached| !self.is_expired(cached))
    }

    /// Build the tree now if it is not already built.
    ///
    /// Fails with [`GranuleError::EmptyIndex`] when the catalog holds no granules.
    pub fn rebuild(&self) -> Result<()> {
        self.with_tree(|_| Ok(()))
    }

    /// Drop the current tree, as a memory-constrained host would.
    ///
    /// Returns whether a tree was dropped.
    pub fn evict(&self) -> bool {
        let dropped = self.tree.write().take().is_some();
        if dropped {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            log::debug!("Evicted granule tree for {}", self.store.location());
        }
        dropped
    }

    /// Snapshot of the activity counters and the current tree size.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            builds: self.builds.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            entries: self
                .tree
                .read()
                .as_ref()
                .map_or(0, |cached| cached.tree.len()),
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(GranuleError::Disposed);
        }
        Ok(())
    }

    fn is_expired(&self, cached: &CachedTree) -> bool {
        self.max_age
            .is_some_and(|max_age| cached.built_at.elapsed() >= max_age)
    }

    fn invalidate(&self) {
        if self.tree.write().take().is_some() {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            log::debug!("Invalidated granule tree for {}", self.store.location());
        }
    }

    fn build(&self) -> Result<CachedTree> {
        let started = Instant::now();
        let (granules, bounds, geometry_attribute) = self.store.snapshot()?;
        if granules.is_empty() {
            log::debug!(
                "Cannot build granule tree for {}: catalog is empty",
                self.store.location()
            );
            return Err(GranuleError::EmptyIndex);
        }

        let tree = GranuleTree::bulk_load(granules);
        self.builds.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "Built granule tree for {} with {} entries in {:?}",
            self.store.location(),
            tree.len(),
            started.elapsed()
        );
        Ok(CachedTree {
            tree,
            bounds,
            geometry_attribute,
            built_at: Instant::now(),
        })
    }

    /// Run `f` against a built tree while holding the read lock, building the
    /// tree first if it is missing or expired.
    fn with_tree<R>(&self, f: impl FnOnce(&CachedTree) -> Result<R>) -> Result<R> {
        self.ensure_live()?;

        {
            let slot = self.tree.read();
            if let Some(cached) = slot.as_ref()
                && !self.is_expired(cached)
            {
                return f(cached);
            }
        }

        let mut slot = self.tree.write();
        self.ensure_live()?;

        // Another reader may have rebuilt the tree while we waited.
        let fresh = slot
            .as_ref()
            .is_some_and(|cached| !self.is_expired(cached));
        if !fresh {
            if slot.take().is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                log::debug!("Granule tree for {} aged out", self.store.location());
            }
            *slot = Some(self.build()?);
        }

        let slot = RwLockWriteGuard::downgrade(slot);
        match slot.as_ref() {
            Some(cached) => f(cached),
            None => Err(GranuleError::EmptyIndex),
        }
    }

    /// Feed every granule matching `predicate` to `sink`.
    ///
    /// Candidates come from the tree using the bounding box implied by the
    /// predicate, clipped to the catalog bounds recorded with the tree, and
    /// are then re-checked against the full predicate.
    fn query(
        &self,
        predicate: &Predicate,
        mut sink: impl FnMut(&GranuleRecord) -> Result<()>,
    ) -> Result<()> {
        predicate.validate()?;

        self.with_tree(|cached| {
            let search = match extract_bbox(predicate) {
                Some(bbox) => bbox.intersection(&cached.bounds),
                None => cached.bounds.clone(),
            };

            self.queries.fetch_add(1, Ordering::Relaxed);
            let mut candidates = 0usize;
            let mut matched = 0usize;
            for granule in cached.tree.intersecting(&search) {
                candidates += 1;
                if predicate.is_include() || predicate.evaluate(granule, &cached.geometry_attribute)
                {
                    matched += 1;
                    sink(granule)?;
                }
            }

            log::trace!(
                "Granule tree query over {}: {} candidates, {} matches",
                search,
                candidates,
                matched
            );
            Ok(())
        })
    }

    fn collect(&self, predicate: &Predicate) -> Result<Vec<GranuleRecord>> {
        let mut found = Vec::new();
        self.query(predicate, |granule| {
            found.push(granule.clone());
            Ok(())
        })?;
        Ok(found)
    }
}

impl GranuleIndex for SpatialTreeCache {
    fn find_in_envelope(&self, envelope: &Envelope) -> Result<Vec<GranuleRecord>> {
        if !envelope.is_finite() {
            return Err(GranuleError::invalid(format!(
                "query envelope must be non-empty and finite, got {}",
                envelope
            )));
        }
        let geometry_attribute = self.store.geometry_attribute()?;
        self.collect(&Predicate::bbox(geometry_attribute, envelope.clone()))
    }

    fn find(&self, predicate: &Predicate) -> Result<Vec<GranuleRecord>> {
        self.collect(predicate)
    }

    fn visit(&self, predicate: &Predicate, visitor: &mut dyn GranuleVisitor) -> Result<()> {
        self.query(predicate, |granule| visitor.visit(granule))
    }

    fn find_all(&self) -> Result<Vec<GranuleRecord>> {
        self.collect(&Predicate::Include)
    }

    fn add_granule(&self, granule: GranuleRecord) -> Result<()> {
        self.add_granules(vec![granule])
    }

    fn add_granules(&self, granules: Vec<GranuleRecord>) -> Result<()> {
        self.ensure_live()?;
        let result = self.store.add_granules(granules);
        // Partial batches may have landed even when the store reports failure.
        self.invalidate();
        result
    }

    fn remove_granules(&self, predicate: &Predicate) -> Result<Option<usize>> {
        self.ensure_live()?;
        let result = self.store.remove_granules(predicate);
        self.invalidate();
        result
    }

    fn bounds(&self) -> Result<Envelope> {
        self.ensure_live()?;
        self.store.bounds()
    }

    fn create_type(&self, schema: GranuleSchema) -> Result<()> {
        self.ensure_live()?;
        let result = self.store.create_type(schema);
        self.invalidate();
        result
    }

    fn get_type(&self) -> Result<Option<GranuleSchema>> {
        self.ensure_live()?;
        self.store.get_type()
    }

    fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.tree.write().take();
        self.store.dispose()
    }
}
