use crate::envelope::Envelope;
use geo::Polygon;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Opaque identifier of a granule within its catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GranuleId(String);

impl GranuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random identifier for granules harvested without one.
    pub fn generate() -> Self {
        Self(format!("granule.{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for GranuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GranuleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for GranuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A single attribute value carried by a granule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    /// Order two values of compatible kinds.
    ///
    /// Integers and floats compare numerically with each other. Values of
    /// unrelated kinds, `Null`, and `NaN` are unordered.
    pub fn compare(&self, other: &AttributeValue) -> Option<Ordering> {
        use AttributeValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => f.write_str("null"),
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Int(v.into())
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Text(v)
    }
}

/// One tile of a raster mosaic as recorded in the catalog.
///
/// The envelope is derived from the footprint when the record is built and
/// never changes afterwards. Catalog writes replace whole records by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GranuleRecord {
    id: GranuleId,
    attributes: BTreeMap<String, AttributeValue>,
    footprint: Polygon,
    envelope: Envelope,
}

impl GranuleRecord {
    /// Create a record with no attributes.
    pub fn new(id: impl Into<GranuleId>, footprint: Polygon) -> Self {
        let envelope = Envelope::of_polygon(&footprint);
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
            footprint,
            envelope,
        }
    }

    /// Add or replace one attribute, consuming the record.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Replace the whole attribute map, consuming the record.
    pub fn with_attributes(mut self, attributes: BTreeMap<String, AttributeValue>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn id(&self) -> &GranuleId {
        &self.id
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn footprint(&self) -> &Polygon {
        &self.footprint
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }
}
