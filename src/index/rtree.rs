//! R*-tree over granule envelopes.

use granule_types::envelope::Envelope;
use granule_types::record::GranuleRecord;
use rstar::{AABB, RTree, RTreeObject};

/// Granule entry keyed by its envelope.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IndexedGranule {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub granule: GranuleRecord,
}

impl IndexedGranule {
    /// `None` for granules with an empty envelope, which cannot be indexed.
    pub fn new(granule: GranuleRecord) -> Option<Self> {
        let env = granule.envelope();
        if env.is_empty() {
            return None;
        }
        Some(Self {
            min_x: env.min_x(),
            min_y: env.min_y(),
            max_x: env.max_x(),
            max_y: env.max_y(),
            granule,
        })
    }
}

impl RTreeObject for IndexedGranule {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.min_x, self.min_y], [self.max_x, self.max_y])
    }
}

/// Read-only tree built in a single bulk-load pass.
pub(crate) struct GranuleTree {
    tree: RTree<IndexedGranule>,
}

impl GranuleTree {
    pub fn bulk_load(granules: Vec<GranuleRecord>) -> Self {
        let entries: Vec<_> = granules
            .into_iter()
            .filter_map(IndexedGranule::new)
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Granules whose envelope intersects `envelope`. Touching edges count.
    pub fn intersecting<'a>(
        &'a self,
        envelope: &Envelope,
    ) -> Box<dyn Iterator<Item = &'a GranuleRecord> + 'a> {
        if !envelope.is_finite() {
            if !envelope.is_empty() {
                log::warn!("Rejecting granule tree query with non-finite envelope {}", envelope);
            }
            return Box::new(std::iter::empty());
        }

        let query = AABB::from_corners(
            [envelope.min_x(), envelope.min_y()],
            [envelope.max_x(), envelope.max_y()],
        );
        Box::new(
            self.tree
                .locate_in_envelope_intersecting(&query)
                .map(|entry| &entry.granule),
        )
    }
}
