//! Boolean filters over granule attributes and footprints.
//!
//! A [`Predicate`] is evaluated in two places: catalogs use it to select
//! records, and the spatial tree cache re-applies it to the candidates a
//! bounding-box lookup returns.

use crate::error::{GranuleError, Result};
use geo::{Intersects, Polygon, Within};
use granule_types::envelope::Envelope;
use granule_types::record::{AttributeValue, GranuleId, GranuleRecord};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Ordering comparison applied by [`Predicate::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Ne,
}

impl CompareOp {
    fn matches(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Ne => ordering != Ordering::Equal,
        }
    }
}

/// Filter expression over a granule's attributes and geometry.
///
/// Spatial clauses name the geometry attribute they test. A clause naming any
/// other attribute never matches, the same way a comparison against a missing
/// attribute never matches.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every granule.
    Include,
    /// Matches nothing.
    Exclude,
    Equals {
        attribute: String,
        value: AttributeValue,
    },
    Compare {
        attribute: String,
        op: CompareOp,
        value: AttributeValue,
    },
    /// Matches granules whose identifier is in the set.
    Ids(BTreeSet<GranuleId>),
    /// Granule envelope intersects the box.
    BBox {
        attribute: String,
        envelope: Envelope,
    },
    /// Granule footprint intersects the polygon.
    Intersects {
        attribute: String,
        geometry: Polygon,
    },
    /// Granule footprint lies within the polygon.
    Within {
        attribute: String,
        geometry: Polygon,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn equals(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Predicate::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn compare(
        attribute: impl Into<String>,
        op: CompareOp,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Predicate::Compare {
            attribute: attribute.into(),
            op,
            value: value.into(),
        }
    }

    pub fn ids<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<GranuleId>,
    {
        Predicate::Ids(ids.into_iter().map(Into::into).collect())
    }

    pub fn bbox(attribute: impl Into<String>, envelope: Envelope) -> Self {
        Predicate::BBox {
            attribute: attribute.into(),
            envelope,
        }
    }

    pub fn intersects(attribute: impl Into<String>, geometry: Polygon) -> Self {
        Predicate::Intersects {
            attribute: attribute.into(),
            geometry,
        }
    }

    pub fn within(attribute: impl Into<String>, geometry: Polygon) -> Self {
        Predicate::Within {
            attribute: attribute.into(),
            geometry,
        }
    }

    /// Conjunction of `self` and `other`, flattening nested `And`s and
    /// dropping `Include` operands.
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::Include, p) | (p, Predicate::Include) => p,
            (Predicate::And(mut a), Predicate::And(b)) => {
                a.extend(b);
                Predicate::And(a)
            }
            (Predicate::And(mut a), p) => {
                a.push(p);
                Predicate::And(a)
            }
            (p, Predicate::And(mut b)) => {
                b.insert(0, p);
                Predicate::And(b)
            }
            (a, b) => Predicate::And(vec![a, b]),
        }
    }

    /// Disjunction of `self` and `other`, flattening nested `Or`s.
    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::Or(mut a), Predicate::Or(b)) => {
                a.extend(b);
                Predicate::Or(a)
            }
            (Predicate::Or(mut a), p) => {
                a.push(p);
                Predicate::Or(a)
            }
            (a, b) => Predicate::Or(vec![a, b]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate {
        match self {
            Predicate::Not(inner) => *inner,
            p => Predicate::Not(Box::new(p)),
        }
    }

    pub fn is_include(&self) -> bool {
        matches!(self, Predicate::Include)
    }

    /// Evaluate against a record whose footprint is stored under
    /// `geometry_attribute`.
    pub fn evaluate(&self, record: &GranuleRecord, geometry_attribute: &str) -> bool {
        match self {
            Predicate::Include => true,
            Predicate::Exclude => false,
            Predicate::Equals { attribute, value } => {
                record.attribute(attribute).is_some_and(|actual| {
                    actual == value || actual.compare(value) == Some(Ordering::Equal)
                })
            }
            Predicate::Compare {
                attribute,
                op,
                value,
            } => record
                .attribute(attribute)
                .and_then(|actual| actual.compare(value))
                .is_some_and(|ordering| op.matches(ordering)),
            Predicate::Ids(ids) => ids.contains(record.id()),
            Predicate::BBox {
                attribute,
                envelope,
            } => attribute == geometry_attribute && record.envelope().intersects(envelope),
            Predicate::Intersects {
                attribute,
                geometry,
            } => attribute == geometry_attribute && record.footprint().intersects(geometry),
            Predicate::Within {
                attribute,
                geometry,
            } => attribute == geometry_attribute && record.footprint().is_within(geometry),
            Predicate::And(children) => children
                .iter()
                .all(|child| child.evaluate(record, geometry_attribute)),
            Predicate::Or(children) => children
                .iter()
                .any(|child| child.evaluate(record, geometry_attribute)),
            Predicate::Not(inner) => !inner.evaluate(record, geometry_attribute),
        }
    }

    /// Reject predicates no catalog could answer meaningfully.
    pub fn validate(&self) -> Result<()> {
        match self {
            Predicate::Include | Predicate::Exclude | Predicate::Ids(_) => Ok(()),
            Predicate::Equals { attribute, .. } | Predicate::Compare { attribute, .. } => {
                check_attribute(attribute)
            }
            Predicate::BBox {
                attribute,
                envelope,
            } => {
                check_attribute(attribute)?;
                if !envelope.is_finite() {
                    return Err(GranuleError::invalid(format!(
                        "bounding box filter on '{}' needs a non-empty finite envelope, got {}",
                        attribute, envelope
                    )));
                }
                Ok(())
            }
            Predicate::Intersects {
                attribute,
                geometry,
            }
            | Predicate::Within {
                attribute,
                geometry,
            } => {
                check_attribute(attribute)?;
                if !Envelope::of_polygon(geometry).is_finite() {
                    return Err(GranuleError::invalid(format!(
                        "spatial filter on '{}' needs a non-empty finite polygon",
                        attribute
                    )));
                }
                Ok(())
            }
            Predicate::And(children) | Predicate::Or(children) => {
                children.iter().try_for_each(Predicate::validate)
            }
            Predicate::Not(inner) => inner.validate(),
        }
    }
}

fn check_attribute(attribute: &str) -> Result<()> {
    if attribute.trim().is_empty() {
        return Err(GranuleError::invalid("attribute name must not be empty"));
    }
    Ok(())
}
