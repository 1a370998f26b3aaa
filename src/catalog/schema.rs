//! Granule catalog schemas.

use crate::error::{GranuleError, Result};
use granule_types::record::{AttributeValue, GranuleRecord};
use serde::{Deserialize, Serialize};

/// Value kind of a non-geometry attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeKind {
    Bool,
    Int,
    Float,
    Text,
}

impl AttributeKind {
    fn accepts(self, value: &AttributeValue) -> bool {
        matches!(
            (self, value),
            (_, AttributeValue::Null)
                | (AttributeKind::Bool, AttributeValue::Bool(_))
                | (AttributeKind::Int, AttributeValue::Int(_))
                | (AttributeKind::Float, AttributeValue::Float(_))
                | (AttributeKind::Float, AttributeValue::Int(_))
                | (AttributeKind::Text, AttributeValue::Text(_))
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub kind: AttributeKind,
}

/// Feature type describing the granules a catalog stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GranuleSchema {
    type_name: String,
    geometry_attribute: String,
    crs: Option<String>,
    attributes: Vec<AttributeDescriptor>,
}

impl GranuleSchema {
    pub fn new(type_name: impl Into<String>, geometry_attribute: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            geometry_attribute: geometry_attribute.into(),
            crs: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.push(AttributeDescriptor {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    /// Parse a compact type spec such as
    /// `"location:String,ingestion:Integer,the_geom:Polygon:srid=4326"`.
    ///
    /// Exactly one entry must carry a geometry type (`Polygon`,
    /// `MultiPolygon` or `Geometry`); it names the geometry attribute.
    pub fn parse(type_name: &str, spec: &str) -> Result<Self> {
        if type_name.trim().is_empty() {
            return Err(GranuleError::invalid("type name must not be empty"));
        }

        let mut geometry: Option<(String, Option<String>)> = None;
        let mut attributes = Vec::new();

        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.split(':').map(str::trim);
            let name = parts.next().unwrap_or_default();
            let type_token = parts.next().ok_or_else(|| {
                GranuleError::invalid(format!("attribute '{}' has no type", entry))
            })?;
            if name.is_empty() {
                return Err(GranuleError::invalid(format!(
                    "attribute entry '{}' has no name",
                    entry
                )));
            }

            match type_token {
                "Polygon" | "MultiPolygon" | "Geometry" => {
                    if geometry.is_some() {
                        return Err(GranuleError::invalid(format!(
                            "type spec declares more than one geometry attribute: '{}'",
                            spec
                        )));
                    }
                    let crs = parts
                        .find_map(|p| p.strip_prefix("srid="))
                        .map(|srid| format!("EPSG:{}", srid));
                    geometry = Some((name.to_string(), crs));
                }
                other => {
                    let kind = match other {
                        "String" | "Text" => AttributeKind::Text,
                        "Integer" | "Int" | "Long" => AttributeKind::Int,
                        "Double" | "Float" => AttributeKind::Float,
                        "Boolean" | "Bool" => AttributeKind::Bool,
                        unknown => {
                            return Err(GranuleError::invalid(format!(
                                "unknown attribute type '{}' for '{}'",
                                unknown, name
                            )));
                        }
                    };
                    attributes.push(AttributeDescriptor {
                        name: name.to_string(),
                        kind,
                    });
                }
            }
        }

        let (geometry_attribute, crs) = geometry.ok_or_else(|| {
            GranuleError::invalid(format!("type spec '{}' declares no geometry attribute", spec))
        })?;

        Ok(Self {
            type_name: type_name.to_string(),
            geometry_attribute,
            crs,
            attributes,
        })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn geometry_attribute(&self) -> &str {
        &self.geometry_attribute
    }

    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Check that every attribute of `record` is declared with a compatible kind.
    pub fn check_record(&self, record: &GranuleRecord) -> Result<()> {
        for (name, value) in record.attributes() {
            let descriptor = self.attribute(name).ok_or_else(|| {
                GranuleError::invalid(format!(
                    "granule '{}' carries attribute '{}' not declared by type '{}'",
                    record.id(),
                    name,
                    self.type_name
                ))
            })?;
            if !descriptor.kind.accepts(value) {
                return Err(GranuleError::invalid(format!(
                    "granule '{}' attribute '{}' expects {:?}, got {:?}",
                    record.id(),
                    name,
                    descriptor.kind,
                    value
                )));
            }
        }
        Ok(())
    }
}
