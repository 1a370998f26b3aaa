//! Query processing for granule indexes.
//!
//! This module holds the computation that is independent of where granules
//! are stored:
//! - Filter predicates and their evaluation against records
//! - Bounding box extraction used to prune spatial tree queries
//! - GeoJSON import and export of granule records

pub mod extract;
#[cfg(feature = "geojson")]
pub mod geojson;
pub mod predicate;
