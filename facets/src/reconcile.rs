//! Facet geometry reconciliation and metric extraction.

use crate::segment::SegmentResponse;
use aspect::{math::normalize_deg, Ring};
use geo::{
    geometry::{Coord, LineString, Polygon},
    BooleanOps,
};
use log::debug;
use serde::Serialize;
use terrainrgb::C;

/// One clipped facet with its plane metrics.
#[derive(Debug, Clone, Serialize)]
pub struct FacetResult {
    pub plane_id: u32,

    /// Clipped facet boundary; explicitly closed geographic ring.
    pub ring: Vec<Coord<C>>,

    /// Contour (iso-altitude) bearing, degrees clockwise from north.
    pub contour_deg: C,

    /// Downhill direction, 90 degrees clockwise of the contour.
    pub aspect_deg: C,

    /// Tilt of the facet plane, degrees from horizontal.
    pub slope_deg: C,

    /// Labeled raster cells inside the clipped ring.
    pub sample_count: usize,

    /// Highest labeled elevation inside the clipped ring, meters; NaN
    /// when `sample_count` is 0.
    pub max_elevation: C,
}

/// Inverse-projects each seam through the raster's affine, clips it
/// against the drawn footprint, and extracts per-piece metrics.
///
/// A facet that misses the footprint entirely is dropped without failing
/// its siblings; a clip that splits into several pieces yields one result
/// per piece sharing the plane's metrics.
pub(crate) fn reconcile(drawn: &Ring, response: &SegmentResponse) -> Vec<FacetResult> {
    let drawn_poly = drawn.to_polygon();
    let affine = response.raster.affine();
    let mut results = Vec::new();

    for seam in &response.seams {
        let Some(plane) = response.planes.iter().find(|p| p.id == seam.plane_id) else {
            continue;
        };
        if seam.vertices.len() < 3 {
            continue;
        }
        let mut coords: Vec<Coord<C>> = seam
            .vertices
            .iter()
            .map(|&(px, py)| affine.pixel_to_geo(px, py))
            .collect();
        if coords.first() != coords.last() {
            let first = coords[0];
            coords.push(first);
        }
        let seam_poly = Polygon::new(LineString::from(coords), vec![]);

        let pieces = seam_poly.intersection(&drawn_poly);
        if pieces.0.is_empty() {
            debug!("facet {} lies outside the drawn footprint", seam.plane_id);
            continue;
        }
        for piece in &pieces.0 {
            // Degenerate slivers from clipping are dropped silently.
            let Ok(clipped) = Ring::new(piece.exterior().0.clone()) else {
                continue;
            };
            let (sample_count, max_elevation) =
                scan_labeled(response, seam.plane_id, &clipped);
            results.push(FacetResult {
                plane_id: plane.id,
                ring: piece.exterior().0.clone(),
                contour_deg: normalize_deg(plane.iso_bearing_deg),
                aspect_deg: normalize_deg(plane.iso_bearing_deg + 90.0),
                slope_deg: plane.gx.hypot(plane.gy).atan().to_degrees(),
                sample_count,
                max_elevation,
            });
        }
    }
    debug!(
        "reconciled {} facet(s) from {} seam(s)",
        results.len(),
        response.seams.len()
    );
    results
}

/// Counts cells labeled with `plane_id` inside the *clipped* ring, so
/// samples trimmed away by clipping never count, and tracks their highest
/// elevation.
fn scan_labeled(response: &SegmentResponse, plane_id: u32, clipped: &Ring) -> (usize, C) {
    let Some(labels) = response.labels.as_ref() else {
        return (0, C::NAN);
    };
    let raster = &response.raster;
    let affine = raster.affine();
    #[allow(clippy::cast_possible_wrap)]
    let wanted = plane_id as i32;
    let mut count = 0usize;
    let mut max_elevation = C::NEG_INFINITY;
    for py in 0..raster.height() {
        for px in 0..raster.width() {
            if labels[py * raster.width() + px] != wanted {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let center = affine.pixel_to_geo(px as C + 0.5, py as C + 0.5);
            if !clipped.contains(center) {
                continue;
            }
            count += 1;
            max_elevation = max_elevation.max(raster.get(px, py));
        }
    }
    if count == 0 {
        (0, C::NAN)
    } else {
        (count, max_elevation)
    }
}

#[cfg(test)]
mod tests {
    use super::reconcile;
    use crate::segment::{FacetSeam, PlaneDescriptor, SegmentResponse};
    use crate::stitch::StitchedRaster;
    use approx::assert_relative_eq;
    use aspect::Ring;
    use terrainrgb::Tile;

    const SIZE: usize = 64;
    const ZOOM: u8 = 15;

    fn flat_tile() -> Tile {
        Tile::from_f32(9372, 12536, ZOOM, SIZE, vec![100.0; SIZE * SIZE]).unwrap()
    }

    fn pixel_ring(tile: &Tile, corners: &[(f64, f64)]) -> Ring {
        Ring::new(corners.iter().map(|&(px, py)| tile.geo(px, py)).collect()).unwrap()
    }

    /// A "U" footprint opening north: two arms joined along the south.
    fn u_shaped_ring(tile: &Tile) -> Ring {
        pixel_ring(
            tile,
            &[
                (8.0, 8.0),
                (20.0, 8.0),
                (20.0, 40.0),
                (44.0, 40.0),
                (44.0, 8.0),
                (56.0, 8.0),
                (56.0, 56.0),
                (8.0, 56.0),
            ],
        )
    }

    /// Labels every finite cell with plane 0.
    fn label_interior(raster: &StitchedRaster) -> Vec<i32> {
        raster
            .data()
            .iter()
            .map(|z| if z.is_finite() { 0 } else { -1 })
            .collect()
    }

    fn response_with_seam(drawn: &Ring, seam: Vec<(f64, f64)>) -> SegmentResponse {
        let raster = StitchedRaster::stitch(drawn, &[flat_tile()]).unwrap();
        let labels = label_interior(&raster);
        SegmentResponse {
            raster,
            planes: vec![PlaneDescriptor {
                id: 0,
                gx: 0.0,
                gy: 0.02,
                iso_bearing_deg: 90.0,
            }],
            seams: vec![FacetSeam {
                plane_id: 0,
                vertices: seam,
            }],
            labels: Some(labels),
        }
    }

    #[test]
    fn test_clip_splits_into_independent_facets() {
        let tile = flat_tile();
        let drawn = u_shaped_ring(&tile);
        // A band across both arms of the U, in raster pixel coordinates
        // (the raster origin sits at the footprint bbox corner, tile
        // pixel 8).
        let response = response_with_seam(
            &drawn,
            vec![(-4.0, 2.0), (52.0, 2.0), (52.0, 14.0), (-4.0, 14.0)],
        );
        let facets = reconcile(&drawn, &response);
        assert_eq!(facets.len(), 2, "expected one facet per arm");
        for facet in &facets {
            assert_eq!(facet.plane_id, 0);
            assert_relative_eq!(facet.contour_deg, 90.0);
            assert_relative_eq!(facet.aspect_deg, 180.0);
            assert_relative_eq!(
                facet.slope_deg,
                0.02_f64.atan().to_degrees(),
                epsilon = 1e-9
            );
            assert!(facet.sample_count > 80, "count = {}", facet.sample_count);
            assert_relative_eq!(facet.max_elevation, 100.0);
            // The ring is explicitly closed.
            assert_eq!(facet.ring.first(), facet.ring.last());
        }
    }

    #[test]
    fn test_fully_outside_facet_is_discarded() {
        let tile = flat_tile();
        let drawn = u_shaped_ring(&tile);
        // A seam inside the U's notch overlaps nothing.
        let response = response_with_seam(
            &drawn,
            vec![(16.0, 2.0), (32.0, 2.0), (32.0, 14.0), (16.0, 14.0)],
        );
        assert!(reconcile(&drawn, &response).is_empty());
    }

    #[test]
    fn test_missing_labels_zero_samples() {
        let tile = flat_tile();
        let drawn = u_shaped_ring(&tile);
        let mut response = response_with_seam(
            &drawn,
            vec![(-4.0, 2.0), (52.0, 2.0), (52.0, 14.0), (-4.0, 14.0)],
        );
        response.labels = None;
        let facets = reconcile(&drawn, &response);
        assert_eq!(facets.len(), 2);
        for facet in &facets {
            assert_eq!(facet.sample_count, 0);
            assert!(facet.max_elevation.is_nan());
        }
    }

    #[test]
    fn test_seam_without_matching_plane_is_skipped() {
        let tile = flat_tile();
        let drawn = u_shaped_ring(&tile);
        let mut response = response_with_seam(
            &drawn,
            vec![(-4.0, 2.0), (52.0, 2.0), (52.0, 14.0), (-4.0, 14.0)],
        );
        response.planes.clear();
        assert!(reconcile(&drawn, &response).is_empty());
    }
}
