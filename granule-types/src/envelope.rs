use geo::{BoundingRect, Polygon, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 2D axis-aligned envelope.
///
/// Wraps a `geo::Rect` and adds two things the rectangle alone cannot carry:
/// an explicit *empty* state (the bounds of a catalog holding no granules) and
/// an optional coordinate reference system tag.
///
/// Corners passed to [`Envelope::new`] are normalized, so `min_x <= max_x` and
/// `min_y <= max_y` always hold for a non-empty envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    rect: Option<Rect>,
    crs: Option<String>,
}

impl Envelope {
    /// Create an envelope from minimum and maximum coordinates.
    ///
    /// # Examples
    ///
    /// ```
    /// use granule_types::envelope::Envelope;
    ///
    /// let env = Envelope::new(0.0, 0.0, 10.0, 5.0);
    /// assert_eq!(env.width(), 10.0);
    /// assert_eq!(env.height(), 5.0);
    /// ```
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            rect: Some(Rect::new(
                geo::coord! { x: min_x, y: min_y },
                geo::coord! { x: max_x, y: max_y },
            )),
            crs: None,
        }
    }

    /// The empty envelope. Contains nothing and intersects nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create an envelope from a `geo::Rect`.
    pub fn from_rect(rect: Rect) -> Self {
        Self {
            rect: Some(rect),
            crs: None,
        }
    }

    /// Bounding envelope of a polygon; empty when the polygon has no coordinates.
    pub fn of_polygon(polygon: &Polygon) -> Self {
        Self {
            rect: polygon.bounding_rect(),
            crs: None,
        }
    }

    /// Tag this envelope with a coordinate reference system identifier.
    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.rect.is_none()
    }

    /// True for a non-empty envelope whose four coordinates are all finite.
    pub fn is_finite(&self) -> bool {
        match self.rect {
            Some(rect) => [rect.min().x, rect.min().y, rect.max().x, rect.max().y]
                .iter()
                .all(|v| v.is_finite()),
            None => false,
        }
    }

    pub fn to_rect(&self) -> Option<Rect> {
        self.rect
    }

    pub fn to_polygon(&self) -> Option<Polygon> {
        self.rect.map(|rect| rect.to_polygon())
    }

    /// Minimum x coordinate, `NaN` when empty.
    pub fn min_x(&self) -> f64 {
        self.rect.map_or(f64::NAN, |r| r.min().x)
    }

    /// Minimum y coordinate, `NaN` when empty.
    pub fn min_y(&self) -> f64 {
        self.rect.map_or(f64::NAN, |r| r.min().y)
    }

    /// Maximum x coordinate, `NaN` when empty.
    pub fn max_x(&self) -> f64 {
        self.rect.map_or(f64::NAN, |r| r.max().x)
    }

    /// Maximum y coordinate, `NaN` when empty.
    pub fn max_y(&self) -> f64 {
        self.rect.map_or(f64::NAN, |r| r.max().y)
    }

    pub fn width(&self) -> f64 {
        self.rect.map_or(0.0, |r| r.width())
    }

    pub fn height(&self) -> f64 {
        self.rect.map_or(0.0, |r| r.height())
    }

    pub fn center(&self) -> Option<geo::Point> {
        self.rect.map(|r| r.center().into())
    }

    /// Check if this envelope intersects another. Touching edges count.
    pub fn intersects(&self, other: &Envelope) -> bool {
        match (self.rect, other.rect) {
            (Some(a), Some(b)) => {
                !(a.max().x < b.min().x
                    || a.min().x > b.max().x
                    || a.max().y < b.min().y
                    || a.min().y > b.max().y)
            }
            _ => false,
        }
    }

    /// Check if `other` lies entirely inside this envelope.
    pub fn contains(&self, other: &Envelope) -> bool {
        match (self.rect, other.rect) {
            (Some(a), Some(b)) => {
                a.min().x <= b.min().x
                    && a.min().y <= b.min().y
                    && a.max().x >= b.max().x
                    && a.max().y >= b.max().y
            }
            _ => false,
        }
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.rect.is_some_and(|r| {
            x >= r.min().x && x <= r.max().x && y >= r.min().y && y <= r.max().y
        })
    }

    /// Smallest envelope covering both inputs. Keeps `self`'s CRS tag, or
    /// `other`'s when `self` has none.
    pub fn union(&self, other: &Envelope) -> Envelope {
        let rect = match (self.rect, other.rect) {
            (Some(a), Some(b)) => Some(Rect::new(
                geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
            )),
            (Some(a), None) => Some(a),
            (None, b) => b,
        };

        Envelope {
            rect,
            crs: self.crs.clone().or_else(|| other.crs.clone()),
        }
    }

    /// Overlapping region of both inputs; empty when they do not intersect.
    pub fn intersection(&self, other: &Envelope) -> Envelope {
        let crs = self.crs.clone().or_else(|| other.crs.clone());
        if !self.intersects(other) {
            return Envelope { rect: None, crs };
        }

        let rect = match (self.rect, other.rect) {
            (Some(a), Some(b)) => Some(Rect::new(
                geo::coord! { x: a.min().x.max(b.min().x), y: a.min().y.max(b.min().y) },
                geo::coord! { x: a.max().x.min(b.max().x), y: a.max().y.min(b.max().y) },
            )),
            _ => None,
        };

        Envelope { rect, crs }
    }

    /// Expand the envelope by a given amount in all directions.
    pub fn expand(&self, amount: f64) -> Self {
        match self.rect {
            Some(r) => Envelope {
                rect: Some(Rect::new(
                    geo::coord! { x: r.min().x - amount, y: r.min().y - amount },
                    geo::coord! { x: r.max().x + amount, y: r.max().y + amount },
                )),
                crs: self.crs.clone(),
            },
            None => self.clone(),
        }
    }

    /// Compare extents only, ignoring the CRS tag.
    pub fn same_extent(&self, other: &Envelope) -> bool {
        self.rect == other.rect
    }
}

impl From<Rect> for Envelope {
    fn from(rect: Rect) -> Self {
        Self::from_rect(rect)
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rect {
            Some(r) => write!(
                f,
                "Env[{} : {}, {} : {}]",
                r.min().x,
                r.max().x,
                r.min().y,
                r.max().y
            )?,
            None => write!(f, "Env[empty]")?,
        }
        if let Some(crs) = &self.crs {
            write!(f, " ({})", crs)?;
        }
        Ok(())
    }
}
