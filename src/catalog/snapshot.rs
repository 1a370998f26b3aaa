//! Snapshot-file granule catalog.
//!
//! Keeps the catalog in memory and rewrites a snapshot of the schema and all
//! records after every mutation. Snapshots are written to a temporary file and
//! atomically renamed over the previous one.

use super::memory::MemoryCatalog;
use super::{GranuleCursor, GranuleSchema, PersistentGranuleCatalog};
use crate::compute::predicate::Predicate;
use crate::error::{GranuleError, Result};
use granule_types::envelope::Envelope;
use granule_types::record::GranuleRecord;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const SNAPSHOT_MAGIC: &[u8] = b"GRANULE_CATALOG";
const SNAPSHOT_VERSION: u8 = 1;

#[derive(Serialize)]
struct CatalogImageRef<'a> {
    schema: Option<&'a GranuleSchema>,
    records: &'a [GranuleRecord],
}

#[derive(Deserialize)]
struct CatalogImage {
    schema: Option<GranuleSchema>,
    records: Vec<GranuleRecord>,
}

/// File-backed catalog persisted as a single snapshot
pub struct SnapshotCatalog {
    path: PathBuf,
    inner: MemoryCatalog,
    closed: bool,
}

impl SnapshotCatalog {
    /// Open the snapshot at `path`, starting empty when the file does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let location = path.display().to_string();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| GranuleError::open(&location, e))?;
        }

        let inner = match Self::load(&path) {
            Ok(Some(image)) => MemoryCatalog::from_parts(image.schema, image.records),
            Ok(None) => MemoryCatalog::new(),
            Err(e) => return Err(GranuleError::open(&location, e)),
        };

        log::info!(
            "Opened snapshot catalog at {} with {} granules",
            location,
            inner.records().len()
        );

        Ok(Self {
            path,
            inner,
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<Option<CatalogImage>> {
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(None);
        }

        let mut reader = BufReader::new(file);

        let mut magic = vec![0u8; SNAPSHOT_MAGIC.len()];
        reader.read_exact(&mut magic)?;
        if magic != SNAPSHOT_MAGIC {
            return Err(GranuleError::InvalidFormat);
        }

        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != SNAPSHOT_VERSION {
            return Err(GranuleError::InvalidFormat);
        }

        let image: CatalogImage = bincode::deserialize_from(&mut reader)?;
        Ok(Some(image))
    }

    fn save(&self) -> Result<()> {
        let temp_path = self.temp_path();

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;

        let mut writer = BufWriter::new(file);
        writer.write_all(SNAPSHOT_MAGIC)?;
        writer.write_all(&[SNAPSHOT_VERSION])?;
        bincode::serialize_into(
            &mut writer,
            &CatalogImageRef {
                schema: self.inner.schema_ref(),
                records: self.inner.records(),
            },
        )?;

        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp_path, &self.path)?;
        self.sync_parent_dir()?;

        log::debug!(
            "Wrote catalog snapshot {} ({} granules)",
            self.path.display(),
            self.inner.records().len()
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        if let Some(name) = temp.file_name() {
            let mut new_name = name.to_string_lossy().into_owned();
            new_name.push_str(".tmp");
            temp.set_file_name(new_name);
        }
        temp
    }

    fn sync_parent_dir(&self) -> Result<()> {
        #[cfg(unix)]
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(GranuleError::Disposed);
        }
        Ok(())
    }
}

impl PersistentGranuleCatalog for SnapshotCatalog {
    fn geometry_attribute_name(&self) -> &str {
        self.inner.geometry_attribute_name()
    }

    fn schema(&self) -> Result<Option<GranuleSchema>> {
        self.inner.schema()
    }

    fn create_schema(&mut self, schema: GranuleSchema) -> Result<()> {
        self.inner.create_schema(schema)?;
        self.save()
    }

    fn query(&self, filter: &Predicate) -> Result<GranuleCursor<'_>> {
        self.inner.query(filter)
    }

    fn append(&mut self, records: &[GranuleRecord]) -> Result<usize> {
        self.ensure_open()?;
        // Records written before a failure stay in memory, so they are saved too.
        let appended = self.inner.append(records);
        let saved = self.save();
        let written = appended?;
        saved?;
        Ok(written)
    }

    fn delete(&mut self, filter: &Predicate) -> Result<Option<usize>> {
        let removed = self.inner.delete(filter)?;
        if removed != Some(0) {
            self.save()?;
        }
        Ok(removed)
    }

    fn bounds(&self) -> Result<Envelope> {
        self.inner.bounds()
    }

    fn len(&self) -> Result<usize> {
        self.inner.len()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        log::info!("Closed snapshot catalog at {}", self.path.display());
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Rect, coord};
    use tempfile::tempdir;

    fn tile(id: &str, min: f64, max: f64) -> GranuleRecord {
        let footprint =
            Rect::new(coord! { x: min, y: min }, coord! { x: max, y: max }).to_polygon();
        GranuleRecord::new(id, footprint).with_attribute("location", format!("{}.tif", id))
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.snap");

        {
            let mut catalog = SnapshotCatalog::open(&path).unwrap();
            catalog
                .create_schema(GranuleSchema::parse("tiles", "location:String,the_geom:Polygon").unwrap())
                .unwrap();
            catalog
                .append(&[tile("a", 0.0, 10.0), tile("b", 5.0, 15.0)])
                .unwrap();
            catalog.close().unwrap();
        }

        let catalog = SnapshotCatalog::open(&path).unwrap();
        assert_eq!(catalog.len().unwrap(), 2);
        assert_eq!(catalog.schema().unwrap().unwrap().type_name(), "tiles");
        assert_eq!(catalog.bounds().unwrap(), Envelope::new(0.0, 0.0, 15.0, 15.0));
    }

    #[test]
    fn test_delete_is_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.snap");

        let mut catalog = SnapshotCatalog::open(&path).unwrap();
        catalog.append(&[tile("a", 0.0, 1.0), tile("b", 2.0, 3.0)]).unwrap();
        assert_eq!(catalog.delete(&Predicate::ids(["a"])).unwrap(), Some(1));
        drop(catalog);

        let reopened = SnapshotCatalog::open(&path).unwrap();
        let ids: Vec<_> = reopened
            .query(&Predicate::Include)
            .unwrap()
            .map(|r| r.unwrap().id().to_string())
            .collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn test_corrupt_snapshot_fails_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.snap");
        std::fs::write(&path, b"not a catalog snapshot").unwrap();

        assert!(matches!(
            SnapshotCatalog::open(&path),
            Err(GranuleError::Open { .. })
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut catalog = SnapshotCatalog::open(dir.path().join("c.snap")).unwrap();
        catalog.close().unwrap();
        catalog.close().unwrap();
        assert!(matches!(catalog.len(), Err(GranuleError::Disposed)));
    }
}
