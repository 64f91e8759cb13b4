//! Coordinate lookup inside a datastream's `observedArea`.
//!
//! Upstream geometries arrive with varying nesting depth (points, line strings, polygons)
//! and without a reliable axis order, so the pair is located by value range rather than
//! by position.

use serde::Deserialize;

/// A nested coordinate array as found in `observedArea.coordinates`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CoordinateTree {
    Number(f64),
    Array(Vec<CoordinateTree>),
    /// Anything that is neither a number nor an array (strings, nulls, objects).
    Other(serde_json::Value),
}

impl CoordinateTree {
    /// Depth-first, first-child-first search for the first two-number leaf whose values
    /// both lie in `(0, 180]`.
    ///
    /// Returns `None` when no leaf qualifies; callers write that as "not available".
    pub fn find_pair(&self) -> Option<(f64, f64)> {
        let CoordinateTree::Array(items) = self else {
            return None;
        };
        if let [CoordinateTree::Number(x), CoordinateTree::Number(y)] = items.as_slice() {
            return (in_range(*x) && in_range(*y)).then_some((*x, *y));
        }
        items.iter().find_map(CoordinateTree::find_pair)
    }
}

fn in_range(v: f64) -> bool {
    v > 0.0 && v <= 180.0
}
