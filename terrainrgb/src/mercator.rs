//! Spherical Web Mercator pixel math for slippy-map tiles.
//!
//! # References
//!
//! 1. [Slippy map tilenames](https://wiki.openstreetmap.org/wiki/Slippy_map_tilenames)
//! 1. [Bing maps tile system](https://learn.microsoft.com/en-us/bingmaps/articles/bing-maps-tile-system)

use crate::C;
use geo::geometry::Coord;
use std::f64::consts::PI;

/// Web Mercator sphere radius in meters.
pub const EARTH_RADIUS: C = 6_378_137.0;

/// Equatorial circumference of the Web Mercator sphere in meters.
pub const EARTH_CIRCUMFERENCE: C = 2.0 * PI * EARTH_RADIUS;

/// World width/height in pixels at `zoom` for `tile_size` tiles.
fn world_pixels(tile_size: usize, zoom: u8) -> C {
    #[allow(clippy::cast_precision_loss)]
    let tiles = (1u64 << zoom) as C;
    tile_size as C * tiles
}

/// Returns the geographic coordinate of pixel (`px`, `py`) within tile
/// (`tile_x`, `tile_y`).
///
/// Pixel coordinates may be fractional; (0, 0) is the tile's north-west
/// corner. Pass `px + 0.5` for pixel centers.
pub fn pixel_to_geo(tile_x: u32, tile_y: u32, px: C, py: C, tile_size: usize, zoom: u8) -> Coord<C> {
    #[allow(clippy::cast_precision_loss)]
    let gx = tile_x as C * tile_size as C + px;
    #[allow(clippy::cast_precision_loss)]
    let gy = tile_y as C * tile_size as C + py;
    global_pixel_to_geo(gx, gy, tile_size, zoom)
}

/// Returns the geographic coordinate of a global (world) pixel position.
pub fn global_pixel_to_geo(gx: C, gy: C, tile_size: usize, zoom: u8) -> Coord<C> {
    let scale = world_pixels(tile_size, zoom);
    let lng = gx / scale * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * gy / scale)).sinh().atan().to_degrees();
    Coord { x: lng, y: lat }
}

/// Returns the global (world) pixel position of `coord`, fractional.
pub fn geo_to_pixel(coord: Coord<C>, tile_size: usize, zoom: u8) -> (C, C) {
    let scale = world_pixels(tile_size, zoom);
    let lat_rad = coord.y.to_radians();
    let gx = (coord.x + 180.0) / 360.0 * scale;
    let gy = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * scale;
    (gx, gy)
}

/// Ground distance covered by one pixel at `lat`, meters.
///
/// Scales by cos(latitude) to correct for meridian convergence.
pub fn ground_resolution(lat: C, tile_size: usize, zoom: u8) -> C {
    lat.to_radians().cos() * EARTH_CIRCUMFERENCE / world_pixels(tile_size, zoom)
}

#[cfg(test)]
mod tests {
    use super::{geo_to_pixel, ground_resolution, pixel_to_geo};
    use approx::assert_relative_eq;
    use geo::geometry::Coord;

    #[test]
    fn test_world_center() {
        let center = pixel_to_geo(0, 0, 128.0, 128.0, 256, 0);
        assert_relative_eq!(center.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(center.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_world_corners() {
        let nw = pixel_to_geo(0, 0, 0.0, 0.0, 256, 0);
        assert_relative_eq!(nw.x, -180.0, epsilon = 1e-9);
        // Web Mercator clips at ~85.05 degrees.
        assert_relative_eq!(nw.y, 85.051_128_779_806_59, epsilon = 1e-9);
    }

    #[test]
    fn test_round_trip() {
        let coord = Coord {
            x: -71.303_25,
            y: 44.270_5,
        };
        let (gx, gy) = geo_to_pixel(coord, 256, 14);
        let back = pixel_to_geo(0, 0, gx, gy, 256, 14);
        assert_relative_eq!(back.x, coord.x, epsilon = 1e-9);
        assert_relative_eq!(back.y, coord.y, epsilon = 1e-9);
    }

    #[test]
    fn test_ground_resolution_equator() {
        // One tile covers the whole equator at zoom 0.
        assert_relative_eq!(
            ground_resolution(0.0, 256, 0),
            156_543.033_928_041,
            epsilon = 1e-6
        );
        // Each zoom level halves the pixel footprint.
        assert_relative_eq!(
            ground_resolution(0.0, 256, 1),
            156_543.033_928_041 / 2.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_ground_resolution_meridian_convergence() {
        let equator = ground_resolution(0.0, 256, 10);
        let mid_lat = ground_resolution(60.0, 256, 10);
        assert_relative_eq!(mid_lat, equator * 60.0_f64.to_radians().cos());
    }
}
