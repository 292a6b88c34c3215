//! The matcher: resolve a query tuple to the best-fitting mount point.

use std::sync::Arc;

use crate::mount::MountPoint;
use crate::query::QueryTuple;

/// Outcome of a matcher run.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// The best-fitting point, if any matched.
    pub point: Option<Arc<MountPoint>>,
    /// More than one point tied for best. Soft condition: the first found
    /// wins, callers report a warning.
    pub ambiguous: bool,
}

/// Whether a point matches a tuple.
///
/// A point matches when every `required` attr on the point is present in
/// the tuple (literal, identifier-bound, or optional-marked all count) and
/// every non-optional tag in the tuple is accepted by the point (present
/// in its attrs, or the point allows unknown attrs). Returns the number of
/// point attrs the tuple doesn't reference; lower is more specific.
pub fn query_mount_match(tuple: &QueryTuple, point: &MountPoint) -> Option<usize> {
    for (attr, config) in point.attrs() {
        if config.required && !tuple.has(attr) {
            return None;
        }
    }

    for tag in tuple.tags() {
        if tag.is_optional {
            continue;
        }
        if !point.has(&tag.attr) && !point.accepts_unknown {
            return None;
        }
    }

    let unused = point.attrs().filter(|(attr, _)| !tuple.has(attr)).count();
    Some(unused)
}

/// Pick the most specific matching point: fewest attrs not referenced by
/// the tuple. Ties keep the first found and flag ambiguity.
pub fn find_best_match(points: &[Arc<MountPoint>], tuple: &QueryTuple) -> MatchResult {
    let mut best: Option<(Arc<MountPoint>, usize)> = None;
    let mut ambiguous = false;

    for point in points {
        let Some(unused) = query_mount_match(tuple, point) else {
            continue;
        };

        match &best {
            None => best = Some((point.clone(), unused)),
            Some((_, best_unused)) => {
                if unused < *best_unused {
                    best = Some((point.clone(), unused));
                    ambiguous = false;
                } else if unused == *best_unused {
                    ambiguous = true;
                }
            }
        }
    }

    MatchResult {
        point: best.map(|(p, _)| p),
        ambiguous,
    }
}
