use granule_index::catalog::MEMORY_LOCATION;
use granule_index::prelude::*;
use granule_index::{GranuleCursor, SpatialTreeCache, StoreBackedIndex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

fn tile(id: &str, min: f64, max: f64) -> GranuleRecord {
    let footprint = Rect::new((min, min), (max, max)).to_polygon();
    GranuleRecord::new(id, footprint)
}

/// Cursor that reports when it is dropped
struct TrackedCursor<'a> {
    inner: GranuleCursor<'a>,
    open: Arc<AtomicUsize>,
}

impl Iterator for TrackedCursor<'_> {
    type Item = granule_index::Result<GranuleRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl Drop for TrackedCursor<'_> {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Catalog wrapper counting open cursors, with switchable failure modes
struct TrackingCatalog {
    inner: MemoryCatalog,
    open_cursors: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
    unknown_delete_count: bool,
    fail_bounds: bool,
    fail_after_delete: bool,
}

impl TrackingCatalog {
    fn new() -> Self {
        Self {
            inner: MemoryCatalog::new(),
            open_cursors: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
            unknown_delete_count: false,
            fail_bounds: false,
            fail_after_delete: false,
        }
    }
}

impl PersistentGranuleCatalog for TrackingCatalog {
    fn geometry_attribute_name(&self) -> &str {
        self.inner.geometry_attribute_name()
    }

    fn schema(&self) -> granule_index::Result<Option<GranuleSchema>> {
        self.inner.schema()
    }

    fn create_schema(&mut self, schema: GranuleSchema) -> granule_index::Result<()> {
        self.inner.create_schema(schema)
    }

    fn query(&self, filter: &Predicate) -> granule_index::Result<GranuleCursor<'_>> {
        let inner = self.inner.query(filter)?;
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackedCursor {
            inner,
            open: Arc::clone(&self.open_cursors),
        }))
    }

    fn append(&mut self, records: &[GranuleRecord]) -> granule_index::Result<usize> {
        self.inner.append(records)
    }

    fn delete(&mut self, filter: &Predicate) -> granule_index::Result<Option<usize>> {
        let removed = self.inner.delete(filter)?;
        if self.fail_after_delete {
            return Err(GranuleError::Catalog("commit failed".to_string()));
        }
        Ok(if self.unknown_delete_count { None } else { removed })
    }

    fn bounds(&self) -> granule_index::Result<Envelope> {
        if self.fail_bounds {
            return Err(GranuleError::Catalog("bounds unavailable".to_string()));
        }
        self.inner.bounds()
    }

    fn len(&self) -> granule_index::Result<usize> {
        self.inner.len()
    }

    fn close(&mut self) -> granule_index::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.inner.close()
    }
}

fn tracked_index(catalog: TrackingCatalog) -> StoreBackedIndex {
    let mut catalog = catalog;
    catalog
        .append(&[tile("a", 0.0, 10.0), tile("b", 5.0, 15.0)])
        .unwrap();
    StoreBackedIndex::new("tracking", Box::new(catalog)).unwrap()
}

#[test]
fn test_cursor_released_after_queries() {
    let catalog = TrackingCatalog::new();
    let open = Arc::clone(&catalog.open_cursors);
    let index = tracked_index(catalog);

    index.find_in_envelope(&Envelope::new(0.0, 0.0, 1.0, 1.0)).unwrap();
    index.find_all().unwrap();
    assert!(index.find_in_envelope(&Envelope::new(50.0, 50.0, 60.0, 60.0)).unwrap().is_empty());
    assert_eq!(open.load(Ordering::SeqCst), 0);
}

#[test]
fn test_cursor_released_when_visitor_fails() {
    let catalog = TrackingCatalog::new();
    let open = Arc::clone(&catalog.open_cursors);
    let index = tracked_index(catalog);

    let mut visited = 0;
    let mut stop_early = |_: &GranuleRecord| -> granule_index::Result<()> {
        visited += 1;
        Err(GranuleError::Catalog("stop".to_string()))
    };
    let result = index.visit(&Predicate::Include, &mut stop_early);

    assert!(matches!(result, Err(GranuleError::Catalog(msg)) if msg == "stop"));
    assert_eq!(visited, 1);
    assert_eq!(open.load(Ordering::SeqCst), 0);
}

#[test]
fn test_cursor_released_after_cache_build() {
    let catalog = TrackingCatalog::new();
    let open = Arc::clone(&catalog.open_cursors);
    let cache = SpatialTreeCache::new(tracked_index(catalog));

    cache.rebuild().unwrap();
    assert_eq!(open.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unknown_delete_count_is_none() {
    let mut catalog = TrackingCatalog::new();
    catalog.unknown_delete_count = true;
    let index = tracked_index(catalog);

    let removed = index.remove_granules(&Predicate::ids(["a"])).unwrap();
    assert_eq!(removed, None);
    assert_eq!(index.len().unwrap(), 1);
    assert_eq!(index.bounds().unwrap(), Envelope::new(5.0, 5.0, 15.0, 15.0));
}

#[test]
fn test_failed_delete_still_refreshes_bounds() {
    let mut catalog = TrackingCatalog::new();
    catalog.fail_after_delete = true;
    let index = tracked_index(catalog);

    let result = index.remove_granules(&Predicate::ids(["b"]));
    assert!(matches!(result, Err(GranuleError::Catalog(msg)) if msg == "commit failed"));
    assert_eq!(index.len().unwrap(), 1);
    assert_eq!(index.bounds().unwrap(), Envelope::new(0.0, 0.0, 10.0, 10.0));
}

#[test]
fn test_failed_open_closes_catalog() {
    let mut catalog = TrackingCatalog::new();
    catalog.fail_bounds = true;
    let closed = Arc::clone(&catalog.closed);

    let result = StoreBackedIndex::new("broken", Box::new(catalog));
    assert!(matches!(result, Err(GranuleError::Open { location, .. }) if location == "broken"));
    assert!(closed.load(Ordering::SeqCst));
}

#[test]
fn test_invalid_envelopes_rejected() {
    let cache = IndexBuilder::new().build_cached().unwrap();
    cache.add_granule(tile("a", 0.0, 1.0)).unwrap();
    let store = IndexBuilder::new().build_store().unwrap();
    store.add_granule(tile("a", 0.0, 1.0)).unwrap();

    for envelope in [
        Envelope::empty(),
        Envelope::new(f64::NAN, 0.0, 1.0, 1.0),
        Envelope::new(0.0, 0.0, f64::INFINITY, 1.0),
    ] {
        assert!(matches!(
            cache.find_in_envelope(&envelope),
            Err(GranuleError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.find_in_envelope(&envelope),
            Err(GranuleError::InvalidArgument(_))
        ));
    }
}

#[test]
fn test_invalid_batch_is_rejected_whole() {
    let index = StoreBackedIndex::open(MEMORY_LOCATION).unwrap();
    let result = index.add_granules(vec![tile("ok", 0.0, 1.0), tile("", 2.0, 3.0)]);

    assert!(matches!(result, Err(GranuleError::InvalidArgument(_))));
    assert!(index.is_empty().unwrap());
    assert!(index.bounds().unwrap().is_empty());
}

#[test]
fn test_touching_edges_match() {
    let touching = Envelope::new(10.0, 10.0, 20.0, 20.0);
    for caching in [true, false] {
        let index = IndexBuilder::new().caching(caching).build().unwrap();
        index.add_granule(tile("a", 0.0, 10.0)).unwrap();
        assert_eq!(index.find_in_envelope(&touching).unwrap().len(), 1);
    }
}

#[test]
fn test_replacing_granule_by_id() {
    let cache = IndexBuilder::new().build_cached().unwrap();
    cache.add_granule(tile("a", 0.0, 1.0)).unwrap();
    cache.add_granule(tile("a", 50.0, 51.0)).unwrap();

    let all = cache.find_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(cache.bounds().unwrap(), Envelope::new(50.0, 50.0, 51.0, 51.0));
}

#[test]
fn test_extreme_coordinates() {
    let cache = IndexBuilder::new().build_cached().unwrap();
    cache
        .add_granules(vec![tile("far", 1e12, 1e12 + 1.0), tile("near", -1e12, -1e12 + 1.0)])
        .unwrap();

    let found = cache
        .find_in_envelope(&Envelope::new(-1e13, -1e13, 1e13, 1e13))
        .unwrap();
    assert_eq!(found.len(), 2);
}
