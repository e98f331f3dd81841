//! Simple polygon ring with even-odd membership testing.

use crate::{AspectError, C};
use geo::geometry::{Coord, LineString, Polygon};

/// A simple closed ring of geographic vertices (longitude `x`, latitude
/// `y`, degrees).
///
/// The closing edge from the last vertex back to the first is implied;
/// callers may pass an explicitly closed ring and the duplicate vertex is
/// dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Ring(Vec<Coord<C>>);

impl Ring {
    /// Returns a ring over `vertices`.
    ///
    /// Fails with fewer than 3 vertices after dropping an explicit closing
    /// duplicate.
    pub fn new(mut vertices: Vec<Coord<C>>) -> Result<Self, AspectError> {
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(AspectError::DegenerateGeometry(vertices.len()));
        }
        Ok(Self(vertices))
    }

    pub fn vertices(&self) -> &[Coord<C>] {
        &self.0
    }

    /// Even-odd ray-cast membership test.
    ///
    /// Casts a ray eastward from `coord` and counts edge crossings. Points
    /// exactly on a vertex or edge are implementation defined, but the
    /// answer is stable across calls.
    pub fn contains(&self, coord: Coord<C>) -> bool {
        let mut inside = false;
        let mut j = self.0.len() - 1;
        for i in 0..self.0.len() {
            let a = self.0[i];
            let b = self.0[j];
            if (a.y > coord.y) != (b.y > coord.y) {
                let cross_x = (b.x - a.x) * (coord.y - a.y) / (b.y - a.y) + a.x;
                if coord.x < cross_x {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Axis-aligned bounding box as (south-west, north-east) corners.
    pub fn bbox(&self) -> (Coord<C>, Coord<C>) {
        let mut sw = self.0[0];
        let mut ne = self.0[0];
        for &Coord { x, y } in &self.0 {
            sw.x = sw.x.min(x);
            sw.y = sw.y.min(y);
            ne.x = ne.x.max(x);
            ne.y = ne.y.max(y);
        }
        (sw, ne)
    }

    /// Mean latitude of the vertices, degrees.
    pub fn mean_lat(&self) -> C {
        #[allow(clippy::cast_precision_loss)]
        let n = self.0.len() as C;
        self.0.iter().map(|c| c.y).sum::<C>() / n
    }

    /// This ring as an explicitly closed `geo` polygon.
    pub fn to_polygon(&self) -> Polygon<C> {
        let mut coords = self.0.clone();
        coords.push(self.0[0]);
        Polygon::new(LineString::from(coords), vec![])
    }
}
