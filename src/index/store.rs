//! Granule index answering every query from the catalog.

use super::{GranuleIndex, GranuleVisitor};
use crate::catalog::{GranuleSchema, PersistentGranuleCatalog, open_catalog};
use crate::compute::predicate::Predicate;
use crate::error::{GranuleError, Result};
use granule_types::envelope::Envelope;
use granule_types::record::GranuleRecord;
use parking_lot::RwLock;

struct StoreState {
    /// `None` once disposed
    catalog: Option<Box<dyn PersistentGranuleCatalog>>,
    geometry_attribute: String,
    bounds: Envelope,
}

impl StoreState {
    fn catalog(&self) -> Result<&dyn PersistentGranuleCatalog> {
        self.catalog.as_deref().ok_or(GranuleError::Disposed)
    }

    fn catalog_mut(&mut self) -> Result<&mut (dyn PersistentGranuleCatalog + 'static)> {
        self.catalog.as_deref_mut().ok_or(GranuleError::Disposed)
    }

    fn refresh_bounds(&mut self) -> Result<()> {
        let bounds = self.catalog()?.bounds()?;
        self.bounds = bounds;
        Ok(())
    }
}

/// Granule index delegating to a [`PersistentGranuleCatalog`].
///
/// Queries hold the read lock for their whole duration, including the full
/// traversal of [`GranuleIndex::visit`]. Mutations and `dispose` hold the write
/// lock, so no query observes a half-applied batch.
pub struct StoreBackedIndex {
    location: String,
    state: RwLock<StoreState>,
}

impl StoreBackedIndex {
    /// Open the catalog at `location` and wrap it.
    pub fn open(location: &str) -> Result<Self> {
        let catalog = open_catalog(location)?;
        Self::new(location, catalog)
    }

    /// Wrap an already opened catalog.
    ///
    /// If the catalog bounds cannot be read the catalog is closed and an
    /// [`GranuleError::Open`] error is returned.
    pub fn new(
        location: impl Into<String>,
        mut catalog: Box<dyn PersistentGranuleCatalog>,
    ) -> Result<Self> {
        let location = location.into();

        let bounds = match catalog.bounds() {
            Ok(bounds) => bounds,
            Err(e) => {
                if let Err(close_err) = catalog.close() {
                    log::warn!(
                        "Failed to close catalog at {} after open failure: {}",
                        location,
                        close_err
                    );
                }
                return Err(GranuleError::open(location, e));
            }
        };
        let geometry_attribute = catalog.geometry_attribute_name().to_string();

        log::info!(
            "Opened granule catalog at {} (geometry attribute '{}', bounds {})",
            location,
            geometry_attribute,
            bounds
        );

        Ok(Self {
            location,
            state: RwLock::new(StoreState {
                catalog: Some(catalog),
                geometry_attribute,
                bounds,
            }),
        })
    }

    /// Location the catalog was opened from
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Whether [`GranuleIndex::dispose`] has released the catalog
    pub fn is_disposed(&self) -> bool {
        self.state.read().catalog.is_none()
    }

    /// Name of the catalog attribute holding granule footprints
    pub fn geometry_attribute(&self) -> Result<String> {
        let state = self.state.read();
        state.catalog()?;
        Ok(state.geometry_attribute.clone())
    }

    /// Number of granules in the catalog
    pub fn len(&self) -> Result<usize> {
        self.state.read().catalog()?.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Granules intersecting `envelope` that also match `predicate`.
    pub fn find_matching(
        &self,
        envelope: &Envelope,
        predicate: &Predicate,
    ) -> Result<Vec<GranuleRecord>> {
        check_envelope(envelope)?;
        predicate.validate()?;

        let state = self.state.read();
        let filter = Predicate::bbox(state.geometry_attribute.clone(), envelope.clone())
            .and(predicate.clone());
        Self::query(&state, &filter)
    }

    /// Every granule together with the bounds and geometry attribute they
    /// were read under, taken under a single read lock.
    pub(crate) fn snapshot(&self) -> Result<(Vec<GranuleRecord>, Envelope, String)> {
        let state = self.state.read();
        let granules = Self::query(&state, &Predicate::Include)?;
        Ok((
            granules,
            state.bounds.clone(),
            state.geometry_attribute.clone(),
        ))
    }

    fn query(state: &StoreState, filter: &Predicate) -> Result<Vec<GranuleRecord>> {
        let cursor = state.catalog()?.query(filter)?;
        cursor.collect()
    }
}

fn check_envelope(envelope: &Envelope) -> Result<()> {
    if !envelope.is_finite() {
        return Err(GranuleError::invalid(format!(
            "query envelope must be non-empty and finite, got {}",
            envelope
        )));
    }
    Ok(())
}

fn check_granule(granule: &GranuleRecord) -> Result<()> {
    if granule.id().is_empty() {
        return Err(GranuleError::invalid("granule id must not be empty"));
    }
    if !granule.envelope().is_finite() {
        return Err(GranuleError::invalid(format!(
            "granule '{}' has an empty or non-finite footprint",
            granule.id()
        )));
    }
    Ok(())
}

impl GranuleIndex for StoreBackedIndex {
    fn find_in_envelope(&self, envelope: &Envelope) -> Result<Vec<GranuleRecord>> {
        check_envelope(envelope)?;

        let state = self.state.read();
        let filter = Predicate::bbox(state.geometry_attribute.clone(), envelope.clone());
        Self::query(&state, &filter)
    }

    fn find(&self, predicate: &Predicate) -> Result<Vec<GranuleRecord>> {
        predicate.validate()?;

        let state = self.state.read();
        Self::query(&state, predicate)
    }

    fn visit(&self, predicate: &Predicate, visitor: &mut dyn GranuleVisitor) -> Result<()> {
        predicate.validate()?;

        let state = self.state.read();
        let cursor = state.catalog()?.query(predicate)?;
        for granule in cursor {
            visitor.visit(&granule?)?;
        }
        Ok(())
    }

    fn find_all(&self) -> Result<Vec<GranuleRecord>> {
        let state = self.state.read();
        state.catalog()?;
        if state.bounds.is_empty() {
            return Ok(Vec::new());
        }
        let filter = Predicate::bbox(state.geometry_attribute.clone(), state.bounds.clone());
        Self::query(&state, &filter)
    }

    fn add_granule(&self, granule: GranuleRecord) -> Result<()> {
        self.add_granules(vec![granule])
    }

    fn add_granules(&self, granules: Vec<GranuleRecord>) -> Result<()> {
        granules.iter().try_for_each(check_granule)?;

        let mut state = self.state.write();
        let catalog = state.catalog_mut()?;
        if granules.is_empty() {
            return Ok(());
        }
        let appended = catalog.append(&granules);
        let refreshed = state.refresh_bounds();

        match (appended, refreshed) {
            (Ok(written), Ok(())) => {
                log::debug!(
                    "Added {} granules to {}, bounds now {}",
                    written,
                    self.location,
                    state.bounds
                );
                Ok(())
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => {
                log::warn!(
                    "Batch insert into {} failed part way, keeping written granules: {}",
                    self.location,
                    e
                );
                Err(e)
            }
            (Err(e), Err(refresh_err)) => {
                log::warn!(
                    "Failed to refresh bounds of {} after failed batch insert: {}",
                    self.location,
                    refresh_err
                );
                Err(e)
            }
        }
    }

    fn remove_granules(&self, predicate: &Predicate) -> Result<Option<usize>> {
        predicate.validate()?;

        let mut state = self.state.write();
        // Refresh even when the delete fails: some records may already be gone.
        let removed = state.catalog_mut()?.delete(predicate);
        let refreshed = state.refresh_bounds();

        match (removed, refreshed) {
            (Ok(removed), Ok(())) => {
                match removed {
                    Some(count) => {
                        log::debug!("Removed {} granules from {}", count, self.location)
                    }
                    None => log::debug!(
                        "Removed an unknown number of granules from {}",
                        self.location
                    ),
                }
                Ok(removed)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => {
                log::warn!(
                    "Delete from {} failed, bounds refreshed to {}: {}",
                    self.location,
                    state.bounds,
                    e
                );
                Err(e)
            }
            (Err(e), Err(refresh_err)) => {
                log::warn!(
                    "Failed to refresh bounds of {} after failed delete: {}",
                    self.location,
                    refresh_err
                );
                Err(e)
            }
        }
    }

    fn bounds(&self) -> Result<Envelope> {
        let state = self.state.read();
        state.catalog()?;
        Ok(state.bounds.clone())
    }

    fn create_type(&self, schema: GranuleSchema) -> Result<()> {
        let mut state = self.state.write();
        let catalog = state.catalog_mut()?;
        catalog.create_schema(schema)?;
        let geometry_attribute = catalog.geometry_attribute_name().to_string();
        state.geometry_attribute = geometry_attribute;
        state.refresh_bounds()
    }

    fn get_type(&self) -> Result<Option<GranuleSchema>> {
        self.state.read().catalog()?.schema()
    }

    fn dispose(&self) -> Result<()> {
        let mut state = self.state.write();
        if let Some(mut catalog) = state.catalog.take() {
            state.bounds = Envelope::empty();
            catalog.close()?;
            log::info!("Disposed granule index at {}", self.location);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributeKind, MEMORY_LOCATION, MemoryCatalog};
    use geo::{Rect, coord};

    fn tile(id: &str, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> GranuleRecord {
        let footprint =
            Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y }).to_polygon();
        GranuleRecord::new(id, footprint).with_attribute("location", format!("{}.tif", id))
    }

    fn ids(granules: Vec<GranuleRecord>) -> Vec<String> {
        let mut ids: Vec<_> = granules.iter().map(|g| g.id().to_string()).collect();
        ids.sort();
        ids
    }

    fn sample_index() -> StoreBackedIndex {
        let index = StoreBackedIndex::open(MEMORY_LOCATION).unwrap();
        index
            .add_granules(vec![
                tile("A", 0.0, 0.0, 10.0, 10.0),
                tile("B", 5.0, 5.0, 15.0, 15.0),
            ])
            .unwrap();
        index
    }

    #[test]
    fn test_find_in_envelope() {
        let index = sample_index();
        let find = |e| ids(index.find_in_envelope(&e).unwrap());

        assert_eq!(find(Envelope::new(0.0, 0.0, 4.0, 4.0)), vec!["A"]);
        assert_eq!(find(Envelope::new(12.0, 12.0, 20.0, 20.0)), vec!["B"]);
        assert_eq!(find(Envelope::new(6.0, 6.0, 7.0, 7.0)), vec!["A", "B"]);
    }

    #[test]
    fn test_find_matching_combines_box_and_predicate() {
        let index = sample_index();
        let found = index
            .find_matching(
                &Envelope::new(6.0, 6.0, 7.0, 7.0),
                &Predicate::equals("location", "B.tif"),
            )
            .unwrap();
        assert_eq!(ids(found), vec!["B"]);
    }

    #[test]
    fn test_remove_refreshes_bounds() {
        let index = sample_index();
        assert_eq!(index.bounds().unwrap(), Envelope::new(0.0, 0.0, 15.0, 15.0));

        let removed = index
            .remove_granules(&Predicate::equals("location", "B.tif"))
            .unwrap();
        assert_eq!(removed, Some(1));
        assert_eq!(index.bounds().unwrap(), Envelope::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_bounds_of_empty_catalog() {
        let index = StoreBackedIndex::open(MEMORY_LOCATION).unwrap();
        assert!(index.bounds().unwrap().is_empty());
        assert!(index.find_all().unwrap().is_empty());
    }

    #[test]
    fn test_bounds_track_union_of_granules() {
        let index = StoreBackedIndex::open(MEMORY_LOCATION).unwrap();
        let mut expected = Envelope::empty();
        for i in 0..20 {
            let offset = (i * 7 % 13) as f64 - 6.0;
            let granule = tile(&format!("g{}", i), offset, -offset, offset + 2.5, 3.0 - offset);
            expected = expected.union(granule.envelope());
            index.add_granule(granule).unwrap();
            assert_eq!(index.bounds().unwrap(), expected);
        }
    }

    #[test]
    fn test_partial_batch_failure_keeps_written_granules() {
        let schema =
            GranuleSchema::new("tiles", "the_geom").with_attribute("location", AttributeKind::Text);
        let index =
            StoreBackedIndex::new("partial", Box::new(MemoryCatalog::with_schema(schema))).unwrap();

        let result = index.add_granules(vec![
            tile("A", 0.0, 0.0, 10.0, 10.0),
            tile("B", 5.0, 5.0, 15.0, 15.0).with_attribute("undeclared", true),
            tile("C", 20.0, 20.0, 30.0, 30.0),
        ]);

        assert!(matches!(result, Err(GranuleError::InvalidArgument(_))));
        assert_eq!(ids(index.find(&Predicate::Include).unwrap()), vec!["A"]);
        assert_eq!(index.bounds().unwrap(), Envelope::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_malformed_arguments_rejected() {
        let index = sample_index();
        assert!(matches!(
            index.find_in_envelope(&Envelope::empty()),
            Err(GranuleError::InvalidArgument(_))
        ));
        assert!(matches!(
            index.find(&Predicate::equals("", 1)),
            Err(GranuleError::InvalidArgument(_))
        ));

        let empty_footprint = GranuleRecord::new("bad", geo::Polygon::new(geo::LineString::new(vec![]), vec![]));
        assert!(matches!(
            index.add_granule(empty_footprint),
            Err(GranuleError::InvalidArgument(_))
        ));
        assert_eq!(index.len().unwrap(), 2);
    }

    #[test]
    fn test_visit_streams_and_propagates_errors() {
        let index = sample_index();

        let mut seen = Vec::new();
        index
            .visit(&Predicate::Include, &mut |g: &GranuleRecord| {
                seen.push(g.id().to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec!["A", "B"]);

        let mut calls = 0;
        let result = index.visit(&Predicate::Include, &mut |_: &GranuleRecord| {
            calls += 1;
            Err(GranuleError::Catalog("stop".into()))
        });
        assert!(matches!(result, Err(GranuleError::Catalog(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_create_type_rederives_geometry_attribute() {
        let index = StoreBackedIndex::open(MEMORY_LOCATION).unwrap();
        assert_eq!(index.geometry_attribute().unwrap(), "the_geom");

        let schema = GranuleSchema::parse("tiles", "location:String,footprint:Polygon").unwrap();
        index.create_type(schema.clone()).unwrap();

        assert_eq!(index.geometry_attribute().unwrap(), "footprint");
        assert_eq!(index.get_type().unwrap(), Some(schema));

        index.add_granule(tile("A", 0.0, 0.0, 10.0, 10.0)).unwrap();
        assert_eq!(
            ids(index.find_in_envelope(&Envelope::new(1.0, 1.0, 2.0, 2.0)).unwrap()),
            vec!["A"]
        );
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let index = sample_index();
        index.dispose().unwrap();
        index.dispose().unwrap();

        assert!(index.is_disposed());
        assert!(matches!(index.bounds(), Err(GranuleError::Disposed)));
        assert!(matches!(
            index.find(&Predicate::Include),
            Err(GranuleError::Disposed)
        ));
        assert!(matches!(
            index.add_granule(tile("C", 0.0, 0.0, 1.0, 1.0)),
            Err(GranuleError::Disposed)
        ));
        assert!(matches!(index.get_type(), Err(GranuleError::Disposed)));
    }

    #[test]
    fn test_empty_batch_after_dispose_fails() {
        let index = sample_index();
        index.add_granules(Vec::new()).unwrap();
        index.dispose().unwrap();

        assert!(matches!(
            index.add_granules(Vec::new()),
            Err(GranuleError::Disposed)
        ));
    }

    #[test]
    fn test_snapshot_reads_granules_with_bounds() {
        let index = sample_index();
        let (granules, bounds, geometry_attribute) = index.snapshot().unwrap();

        assert_eq!(ids(granules), vec!["A", "B"]);
        assert_eq!(bounds, Envelope::new(0.0, 0.0, 15.0, 15.0));
        assert_eq!(geometry_attribute, "the_geom");
    }
}
