//! # granule-types
//!
//! Value types shared by the granule spatial index:
//!
//! - **Envelope**: axis-aligned 2D bounding box with an optional CRS tag
//! - **Granule records**: `GranuleId`, `AttributeValue`, `GranuleRecord`
//!
//! All types are immutable once built, serializable with Serde and built on
//! top of the `geo` crate's geometric primitives.
//!
//! ## Examples
//!
//! ```rust
//! use granule_types::envelope::Envelope;
//! use granule_types::record::GranuleRecord;
//! use geo::{Rect, coord};
//!
//! let footprint = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 }).to_polygon();
//! let granule = GranuleRecord::new("tile_0_0", footprint);
//!
//! assert_eq!(granule.envelope(), &Envelope::new(0.0, 0.0, 10.0, 10.0));
//! ```

pub mod envelope;
pub mod record;
