//! Bounding box extraction from predicate trees.

use crate::compute::predicate::Predicate;
use granule_types::envelope::Envelope;

/// Tightest bounding box a predicate constrains matching granules to.
///
/// Returns `None` when the predicate implies no spatial constraint; callers
/// then fall back to the full catalog bounds. `Some(empty)` means no granule
/// can match.
pub fn extract_bbox(predicate: &Predicate) -> Option<Envelope> {
    match predicate {
        Predicate::BBox { envelope, .. } => Some(envelope.clone()),
        Predicate::Intersects { geometry, .. } | Predicate::Within { geometry, .. } => {
            Some(Envelope::of_polygon(geometry))
        }
        Predicate::Exclude => Some(Envelope::empty()),
        Predicate::And(children) => children
            .iter()
            .filter_map(extract_bbox)
            .reduce(|acc, env| acc.intersection(&env)),
        Predicate::Or(children) => {
            let mut boxes = children.iter().map(extract_bbox);
            let first = boxes.next()??;
            boxes.try_fold(first, |acc, env| env.map(|env| acc.union(&env)))
        }
        Predicate::Include
        | Predicate::Not(_)
        | Predicate::Ids(_)
        | Predicate::Equals { .. }
        | Predicate::Compare { .. } => None,
    }
}
