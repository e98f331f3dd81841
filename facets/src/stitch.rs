//! Multi-tile DEM stitching bounded by a drawn footprint.

use crate::FacetError;
use aspect::Ring;
use geo::{
    algorithm::HaversineDistance,
    geometry::{Coord, Point},
};
use log::debug;
use std::time::Instant;
use terrainrgb::{mercator, Tile, C};

/// Affine pixel-to-geography relationship of a stitched raster.
///
/// `step.y` is the latitudinal step per pixel row averaged over the raster;
/// `step.x` is the same angular step corrected by cos(mean latitude), which
/// holds over footprint-sized extents of a conformal projection. Facet
/// geometry coming back from segmentation must be inverse-projected through
/// this exact relationship, never re-derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoAffine {
    /// Geographic south-west corner of the raster.
    pub origin: Coord<C>,

    /// Angular step per pixel along each axis, degrees.
    pub step: Coord<C>,

    /// Raster row count; rows are stored north to south while the origin
    /// anchors the southern edge.
    rows: usize,
}

impl GeoAffine {
    /// Geographic coordinate of fractional pixel (`px`, `py`), row 0 at
    /// the raster's northern edge.
    #[allow(clippy::cast_precision_loss)]
    pub fn pixel_to_geo(&self, px: C, py: C) -> Coord<C> {
        Coord {
            x: self.origin.x + px * self.step.x,
            y: self.origin.y + (self.rows as C - py) * self.step.y,
        }
    }
}

/// Dense elevation raster covering a footprint's bounding box at native
/// tile resolution.
///
/// Cells are elevation in meters for interior-and-valid pixels, the
/// interior mean for interior-but-invalid pixels, and NaN outside the
/// footprint so downstream plane fitting never crosses the boundary.
pub struct StitchedRaster {
    /// Row-major cells, row 0 north.
    data: Vec<C>,
    width: usize,
    height: usize,
    zoom: u8,
    tile_size: usize,
    affine: GeoAffine,
}

impl StitchedRaster {
    /// Merges `tiles` into one raster bounded by `ring`'s bounding box.
    ///
    /// Fails on an empty tile set or tiles disagreeing on zoom/size. Fill
    /// values are computed in a first pass over the whole interior so that
    /// invalid cells reflect the region's statistics rather than an
    /// arbitrary constant.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn stitch(ring: &Ring, tiles: &[Tile]) -> Result<Self, FacetError> {
        let first = tiles.first().ok_or(FacetError::EmptyTileSet)?;
        let (zoom, size) = (first.zoom(), first.size());
        for tile in tiles {
            if tile.zoom() != zoom || tile.size() != size {
                return Err(FacetError::MismatchedTiles {
                    x: tile.x(),
                    y: tile.y(),
                });
            }
        }

        let now = Instant::now();
        let (sw, ne) = ring.bbox();
        let (min_gx, max_gy) = mercator::geo_to_pixel(sw, size, zoom);
        let (max_gx, min_gy) = mercator::geo_to_pixel(ne, size, zoom);
        let min_px = min_gx.floor() as i64;
        let max_px = max_gx.ceil() as i64;
        let min_py = min_gy.floor() as i64;
        let max_py = max_gy.ceil() as i64;
        let width = (max_px - min_px).max(1) as usize;
        let height = (max_py - min_py).max(1) as usize;

        // Pass 1: region statistics before any cell is written.
        let mut sum = 0.0;
        let mut count = 0usize;
        each_covered_pixel(tiles, (min_px, min_py), (max_px, max_py), |_, tile, px, py| {
            let center = tile.geo(px as C + 0.5, py as C + 0.5);
            if !ring.contains(center) {
                return;
            }
            let elevation = tile.elevation(px, py);
            if elevation.is_finite() {
                sum += elevation;
                count += 1;
            }
        });
        let fill = if count > 0 { sum / count as C } else { 0.0 };

        // Pass 2: exterior cells are NaN, invalid interior cells get the
        // regional mean.
        let mut data = vec![C::NAN; width * height];
        each_covered_pixel(tiles, (min_px, min_py), (max_px, max_py), |index, tile, px, py| {
            let center = tile.geo(px as C + 0.5, py as C + 0.5);
            if !ring.contains(center) {
                data[index] = C::NAN;
                return;
            }
            let elevation = tile.elevation(px, py);
            data[index] = if elevation.is_finite() { elevation } else { fill };
        });

        let origin = mercator::global_pixel_to_geo(min_px as C, max_py as C, size, zoom);
        let ne_corner = mercator::global_pixel_to_geo(max_px as C, min_py as C, size, zoom);
        let mean_lat = (origin.y + ne_corner.y) / 2.0;
        let step_y = (ne_corner.y - origin.y) / height as C;
        let affine = GeoAffine {
            origin,
            step: Coord {
                x: step_y / mean_lat.to_radians().cos(),
                y: step_y,
            },
            rows: height,
        };

        let diagonal_m = Point::from(origin).haversine_distance(&Point::from(ne_corner));
        debug!(
            "stitched {width}x{height} raster; interior: {count}, fill: {fill:.1}, diagonal: {diagonal_m:.0} m, exec: {:?}",
            now.elapsed()
        );

        Ok(Self {
            data,
            width,
            height,
            zoom,
            tile_size: size,
            affine,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// Cell value at (`px`, `py`); NaN outside the footprint.
    pub fn get(&self, px: usize, py: usize) -> C {
        self.data[py * self.width + px]
    }

    /// Row-major cells, row 0 north.
    pub fn data(&self) -> &[C] {
        &self.data
    }

    pub fn affine(&self) -> GeoAffine {
        self.affine
    }

    /// Mean latitude of the raster, degrees.
    pub fn mean_lat(&self) -> C {
        #[allow(clippy::cast_precision_loss)]
        let half_rows = self.height as C / 2.0;
        self.affine.origin.y + half_rows * self.affine.step.y
    }

    /// Ground distance covered by one cell at the raster's mean latitude,
    /// meters.
    pub fn resolution(&self) -> C {
        mercator::ground_resolution(self.mean_lat(), self.tile_size, self.zoom)
    }
}

/// Walks every tile pixel that falls inside the global pixel bounds,
/// passing the raster cell index along.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn each_covered_pixel<F>(tiles: &[Tile], min: (i64, i64), max: (i64, i64), mut visit: F)
where
    F: FnMut(usize, &Tile, usize, usize),
{
    let width = (max.0 - min.0).max(1) as usize;
    for tile in tiles {
        let size = tile.size();
        let x0 = i64::from(tile.x()) * size as i64;
        let y0 = i64::from(tile.y()) * size as i64;
        for py in 0..size {
            let gy = y0 + py as i64;
            if gy < min.1 || gy >= max.1 {
                continue;
            }
            for px in 0..size {
                let gx = x0 + px as i64;
                if gx < min.0 || gx >= max.0 {
                    continue;
                }
                let index = (gy - min.1) as usize * width + (gx - min.0) as usize;
                visit(index, tile, px, py);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StitchedRaster;
    use crate::FacetError;
    use aspect::Ring;
    use approx::assert_relative_eq;
    use terrainrgb::Tile;

    const SIZE: usize = 64;
    const ZOOM: u8 = 15;

    fn tile_from<F: Fn(usize, usize) -> f32>(f: F) -> Tile {
        let mut samples = Vec::with_capacity(SIZE * SIZE);
        for py in 0..SIZE {
            for px in 0..SIZE {
                samples.push(f(px, py));
            }
        }
        Tile::from_f32(9372, 12536, ZOOM, SIZE, samples).unwrap()
    }

    fn pixel_ring(tile: &Tile, corners: &[(f64, f64)]) -> Ring {
        Ring::new(corners.iter().map(|&(px, py)| tile.geo(px, py)).collect()).unwrap()
    }

    fn square_ring(tile: &Tile) -> Ring {
        pixel_ring(tile, &[(8.0, 8.0), (56.0, 8.0), (56.0, 56.0), (8.0, 56.0)])
    }

    #[test]
    fn test_all_valid_tile_never_uses_fill() {
        let tile = tile_from(|_, _| 500.0);
        let ring = square_ring(&tile);
        let raster = StitchedRaster::stitch(&ring, &[tile]).unwrap();
        let finite: Vec<f64> = raster
            .data()
            .iter()
            .copied()
            .filter(|z| z.is_finite())
            .collect();
        assert_eq!(finite.len(), 48 * 48);
        for z in finite {
            assert_relative_eq!(z, 500.0);
        }
    }

    #[test]
    fn test_invalid_interior_cells_get_regional_mean() {
        // Two value bands of equal footprint plus one hole in each; the
        // regional mean stays exactly 15 and marks the filled cells.
        let tile = tile_from(|px, py| {
            if (px, py) == (20, 20) || (px, py) == (40, 40) {
                f32::NAN
            } else if px < 32 {
                10.0
            } else {
                20.0
            }
        });
        let ring = square_ring(&tile);
        let raster = StitchedRaster::stitch(&ring, &[tile]).unwrap();
        let filled: Vec<f64> = raster
            .data()
            .iter()
            .copied()
            .filter(|&z| z == 15.0)
            .collect();
        assert_eq!(filled.len(), 2);
        let finite = raster.data().iter().filter(|z| z.is_finite()).count();
        assert_eq!(finite, 48 * 48);
    }

    #[test]
    fn test_exterior_cells_are_nan() {
        let tile = tile_from(|_, _| 500.0);
        // Triangle with legs on the north and west edges of the block;
        // the south-east corner is outside.
        let ring = pixel_ring(&tile, &[(8.0, 8.0), (56.0, 8.0), (8.0, 56.0)]);
        let raster = StitchedRaster::stitch(&ring, &[tile]).unwrap();
        assert!(raster
            .get(raster.width() - 1, raster.height() - 1)
            .is_nan());
        assert_relative_eq!(
            raster.get(raster.width() / 4, raster.height() / 4),
            500.0
        );
    }

    #[test]
    fn test_affine_matches_projection() {
        let tile = tile_from(|_, _| 500.0);
        let ring = square_ring(&tile);
        let raster = StitchedRaster::stitch(&ring, &[tile]).unwrap();
        let affine = raster.affine();
        // The southern-west raster corner is the origin.
        let sw = affine.pixel_to_geo(0.0, raster.height() as f64);
        assert_relative_eq!(sw.x, affine.origin.x);
        assert_relative_eq!(sw.y, affine.origin.y);
        // Cell centers land inside the drawn footprint's bbox.
        let (ring_sw, ring_ne) = ring.bbox();
        let center = affine.pixel_to_geo(
            raster.width() as f64 / 2.0,
            raster.height() as f64 / 2.0,
        );
        assert!(center.x > ring_sw.x && center.x < ring_ne.x);
        assert!(center.y > ring_sw.y && center.y < ring_ne.y);
    }

    #[test]
    fn test_empty_tile_set_rejected() {
        let tile = tile_from(|_, _| 0.0);
        let ring = square_ring(&tile);
        assert!(matches!(
            StitchedRaster::stitch(&ring, &[]),
            Err(FacetError::EmptyTileSet)
        ));
    }

    #[test]
    fn test_mismatched_tiles_rejected() {
        let tile = tile_from(|_, _| 0.0);
        let ring = square_ring(&tile);
        let other = Tile::from_f32(4686, 6268, ZOOM - 1, SIZE, vec![0.0; SIZE * SIZE]).unwrap();
        assert!(matches!(
            StitchedRaster::stitch(&ring, &[tile, other]),
            Err(FacetError::MismatchedTiles { .. })
        ));
    }
}
