//! In-memory granule catalog.

use super::{DEFAULT_GEOMETRY_ATTRIBUTE, GranuleCursor, GranuleSchema, PersistentGranuleCatalog};
use crate::compute::predicate::Predicate;
use crate::error::{GranuleError, Result};
use granule_types::envelope::Envelope;
use granule_types::record::{GranuleId, GranuleRecord};
use rustc_hash::FxHashMap;

/// In-memory catalog keeping records in insertion order
pub struct MemoryCatalog {
    schema: Option<GranuleSchema>,
    records: Vec<GranuleRecord>,
    positions: FxHashMap<GranuleId, usize>,
    closed: bool,
}

impl MemoryCatalog {
    /// Create an empty catalog with no schema
    pub fn new() -> Self {
        Self {
            schema: None,
            records: Vec::new(),
            positions: FxHashMap::default(),
            closed: false,
        }
    }

    /// Create an empty catalog with the given schema
    pub fn with_schema(schema: GranuleSchema) -> Self {
        let mut catalog = Self::new();
        catalog.schema = Some(schema);
        catalog
    }

    pub(crate) fn from_parts(schema: Option<GranuleSchema>, records: Vec<GranuleRecord>) -> Self {
        let mut catalog = Self::new();
        catalog.schema = schema;
        for record in records {
            catalog.upsert(record);
        }
        catalog
    }

    pub(crate) fn records(&self) -> &[GranuleRecord] {
        &self.records
    }

    pub(crate) fn schema_ref(&self) -> Option<&GranuleSchema> {
        self.schema.as_ref()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(GranuleError::Disposed);
        }
        Ok(())
    }

    fn check_record(&self, record: &GranuleRecord) -> Result<()> {
        if record.id().is_empty() {
            return Err(GranuleError::invalid("granule id must not be empty"));
        }
        if !record.envelope().is_finite() {
            return Err(GranuleError::invalid(format!(
                "granule '{}' has an empty or non-finite footprint",
                record.id()
            )));
        }
        if let Some(schema) = &self.schema {
            schema.check_record(record)?;
        }
        Ok(())
    }

    fn upsert(&mut self, record: GranuleRecord) {
        match self.positions.get(record.id()) {
            Some(&pos) => self.records[pos] = record,
            None => {
                self.positions.insert(record.id().clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    fn reindex(&mut self) {
        self.positions = self
            .records
            .iter()
            .enumerate()
            .map(|(pos, record)| (record.id().clone(), pos))
            .collect();
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistentGranuleCatalog for MemoryCatalog {
    fn geometry_attribute_name(&self) -> &str {
        self.schema
            .as_ref()
            .map_or(DEFAULT_GEOMETRY_ATTRIBUTE, |s| s.geometry_attribute())
    }

    fn schema(&self) -> Result<Option<GranuleSchema>> {
        self.ensure_open()?;
        Ok(self.schema.clone())
    }

    fn create_schema(&mut self, schema: GranuleSchema) -> Result<()> {
        self.ensure_open()?;
        self.schema = Some(schema);
        Ok(())
    }

    fn query(&self, filter: &Predicate) -> Result<GranuleCursor<'_>> {
        self.ensure_open()?;
        let filter = filter.clone();
        let geometry_attribute = self.geometry_attribute_name().to_string();
        Ok(Box::new(
            self.records
                .iter()
                .filter(move |record| filter.evaluate(record, &geometry_attribute))
                .cloned()
                .map(Ok),
        ))
    }

    fn append(&mut self, records: &[GranuleRecord]) -> Result<usize> {
        self.ensure_open()?;
        let mut written = 0;
        for record in records {
            self.check_record(record)?;
            self.upsert(record.clone());
            written += 1;
        }
        Ok(written)
    }

    fn delete(&mut self, filter: &Predicate) -> Result<Option<usize>> {
        self.ensure_open()?;
        let geometry_attribute = self.geometry_attribute_name().to_string();
        let before = self.records.len();
        self.records
            .retain(|record| !filter.evaluate(record, &geometry_attribute));
        let removed = before - self.records.len();
        if removed > 0 {
            self.reindex();
        }
        Ok(Some(removed))
    }

    fn bounds(&self) -> Result<Envelope> {
        self.ensure_open()?;
        let bounds = self
            .records
            .iter()
            .fold(Envelope::empty(), |acc, record| acc.union(record.envelope()));
        Ok(match self.schema.as_ref().and_then(|s| s.crs()) {
            Some(crs) => bounds.with_crs(crs),
            None => bounds,
        })
    }

    fn len(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.records.len())
    }

    fn close(&mut self) -> Result<()> {
        self.records.clear();
        self.positions.clear();
        self.closed = true;
        Ok(())
    }
}
