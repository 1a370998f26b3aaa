//! GeoJSON import and export of granule records.
//!
//! Each granule maps to one Feature with a Polygon geometry. Feature
//! properties become record attributes and the feature id becomes the
//! granule id.

use crate::error::{GranuleError, Result};
use geo::{Coord, LineString, Polygon};
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use granule_types::record::{AttributeValue, GranuleId, GranuleRecord};
use serde_json::Map;
use std::collections::BTreeMap;

fn ring_to_positions(ring: &LineString) -> Vec<Vec<f64>> {
    ring.coords().map(|coord| vec![coord.x, coord.y]).collect()
}

fn ring_from_positions(positions: &[Vec<f64>]) -> Result<LineString> {
    let coords = positions
        .iter()
        .map(|position| {
            if position.len() < 2 {
                return Err(GranuleError::invalid(
                    "Coordinate must have at least 2 values",
                ));
            }
            Ok(Coord {
                x: position[0],
                y: position[1],
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString::from(coords))
}

fn polygon_to_geometry(polygon: &Polygon) -> Geometry {
    let mut rings = vec![ring_to_positions(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring_to_positions));
    Geometry::new(Value::Polygon(rings))
}

fn polygon_from_geometry(geometry: &Geometry) -> Result<Polygon> {
    match &geometry.value {
        Value::Polygon(rings) => {
            let Some((exterior, interiors)) = rings.split_first() else {
                return Err(GranuleError::invalid(
                    "Polygon must have at least one ring",
                ));
            };
            let interiors = interiors
                .iter()
                .map(|ring| ring_from_positions(ring))
                .collect::<Result<Vec<_>>>()?;
            Ok(Polygon::new(ring_from_positions(exterior)?, interiors))
        }
        _ => Err(GranuleError::invalid("Granule footprint must be a Polygon")),
    }
}

fn attribute_from_json(value: &serde_json::Value) -> AttributeValue {
    match value {
        serde_json::Value::Null => AttributeValue::Null,
        serde_json::Value::Bool(b) => AttributeValue::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => n
                .as_f64()
                .map_or(AttributeValue::Null, AttributeValue::Float),
        },
        serde_json::Value::String(s) => AttributeValue::Text(s.clone()),
        // Nested values are kept as their JSON text
        nested => AttributeValue::Text(nested.to_string()),
    }
}

fn attribute_to_json(value: &AttributeValue) -> serde_json::Value {
    match value {
        AttributeValue::Null => serde_json::Value::Null,
        AttributeValue::Bool(b) => serde_json::Value::Bool(*b),
        AttributeValue::Int(i) => serde_json::Value::from(*i),
        AttributeValue::Float(f) => serde_json::Number::from_f64(*f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        AttributeValue::Text(s) => serde_json::Value::String(s.clone()),
    }
}

fn granule_id(
    feature: &Feature,
    attributes: &BTreeMap<String, AttributeValue>,
    id_property: Option<&str>,
) -> GranuleId {
    match &feature.id {
        Some(Id::String(id)) => return GranuleId::new(id.as_str()),
        Some(Id::Number(id)) => return GranuleId::new(id.to_string()),
        None => {}
    }

    if let Some(property) = id_property {
        match attributes.get(property) {
            Some(AttributeValue::Text(id)) if !id.is_empty() => return GranuleId::new(id.as_str()),
            Some(AttributeValue::Int(id)) => return GranuleId::new(id.to_string()),
            _ => {}
        }
    }

    GranuleId::generate()
}

/// Converts a granule into a GeoJSON Feature.
pub fn record_to_feature(record: &GranuleRecord) -> Feature {
    let properties: Map<String, serde_json::Value> = record
        .attributes()
        .iter()
        .map(|(name, value)| (name.clone(), attribute_to_json(value)))
        .collect();

    let envelope = record.envelope();
    let bbox = (!envelope.is_empty()).then(|| {
        vec![
            envelope.min_x(),
            envelope.min_y(),
            envelope.max_x(),
            envelope.max_y(),
        ]
    });

    Feature {
        bbox,
        geometry: Some(polygon_to_geometry(record.footprint())),
        id: Some(Id::String(record.id().to_string())),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Converts a GeoJSON Feature into a granule.
///
/// The granule id is taken from the feature id, then from the `id_property`
/// property, and is generated when neither is present.
pub fn record_from_feature(feature: &Feature, id_property: Option<&str>) -> Result<GranuleRecord> {
    let geometry = feature
        .geometry
        .as_ref()
        .ok_or_else(|| GranuleError::invalid("Feature has no geometry"))?;
    let footprint = polygon_from_geometry(geometry)?;

    let attributes: BTreeMap<String, AttributeValue> = feature
        .properties
        .iter()
        .flatten()
        .map(|(name, value)| (name.clone(), attribute_from_json(value)))
        .collect();

    let id = granule_id(feature, &attributes, id_property);
    Ok(GranuleRecord::new(id, footprint).with_attributes(attributes))
}

/// Serializes granules as a GeoJSON FeatureCollection.
pub fn records_to_geojson(records: &[GranuleRecord]) -> Result<String> {
    let collection = FeatureCollection {
        bbox: None,
        features: records.iter().map(record_to_feature).collect(),
        foreign_members: None,
    };

    serde_json::to_string(&collection).map_err(|e| {
        GranuleError::Serialization(format!("Failed to serialize granules: {}", e))
    })
}

/// Parses granules from a GeoJSON FeatureCollection or single Feature.
pub fn records_from_geojson(geojson: &str, id_property: Option<&str>) -> Result<Vec<GranuleRecord>> {
    let parsed: GeoJson = geojson
        .parse()
        .map_err(|e| GranuleError::invalid(format!("Failed to parse GeoJSON: {}", e)))?;

    match parsed {
        GeoJson::FeatureCollection(collection) => collection
            .features
            .iter()
            .map(|feature| record_from_feature(feature, id_property))
            .collect(),
        GeoJson::Feature(feature) => Ok(vec![record_from_feature(&feature, id_property)?]),
        GeoJson::Geometry(_) => Err(GranuleError::invalid(
            "GeoJSON must be a Feature or FeatureCollection",
        )),
    }
}
