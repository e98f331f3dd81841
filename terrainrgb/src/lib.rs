//! Terrain-RGB elevation tile format.
//!
//! # References
//!
//! 1. [Mapbox Terrain-RGB](https://docs.mapbox.com/data/tilesets/reference/mapbox-terrain-rgb-v1/)
//! 1. [Slippy map tilenames](https://wiki.openstreetmap.org/wiki/Slippy_map_tilenames)

mod error;
pub mod mercator;

pub use crate::error::TileError;
use geo::geometry::Coord;

/// Base floating point type used for all coordinates and calculations.
///
/// Note: this _could_ be a generic parameter, but elevation analysis over
/// footprint-sized rasters shows no measurable benefit from `f32`, and `f64`
/// keeps the Web Mercator inversion exact enough for pixel round-trips.
pub type C = f64;

/// Offset applied when unpacking a Terrain-RGB elevation, meters.
const RGB_OFFSET: C = -10_000.0;

/// Meters per unit of packed Terrain-RGB value.
const RGB_SCALE: C = 0.1;

/// Raster payload of an elevation tile.
pub enum Payload {
    /// Packed-channel Terrain-RGB bytes, 3 or 4 interleaved channels per
    /// pixel (alpha ignored).
    Rgb {
        bytes: Box<[u8]>,
        channels: usize,
    },
    /// Single-band elevation samples, meters.
    F32(Box<[f32]>),
}

/// A square slippy-map elevation tile addressed by (x, y, zoom).
pub struct Tile {
    x: u32,
    y: u32,
    zoom: u8,

    /// Tile width and height in pixels.
    size: usize,

    /// Elevation samples.
    payload: Payload,
}

impl Tile {
    /// Returns a Tile over packed Terrain-RGB `bytes`.
    ///
    /// `channels` is the interleaved channel count (3 for RGB, 4 for RGBA;
    /// alpha is ignored when decoding).
    pub fn from_rgb(
        x: u32,
        y: u32,
        zoom: u8,
        size: usize,
        channels: usize,
        bytes: Vec<u8>,
    ) -> Result<Self, TileError> {
        if !(3..=4).contains(&channels) {
            return Err(TileError::Channels(channels));
        }
        let expected = size * size * channels;
        if bytes.len() != expected {
            return Err(TileError::PayloadLen {
                got: bytes.len(),
                expected,
                size,
            });
        }
        Ok(Self {
            x,
            y,
            zoom,
            size,
            payload: Payload::Rgb {
                bytes: bytes.into_boxed_slice(),
                channels,
            },
        })
    }

    /// Returns a Tile over single-band elevation `samples`, meters.
    pub fn from_f32(
        x: u32,
        y: u32,
        zoom: u8,
        size: usize,
        samples: Vec<f32>,
    ) -> Result<Self, TileError> {
        let expected = size * size;
        if samples.len() != expected {
            return Err(TileError::PayloadLen {
                got: samples.len(),
                expected,
                size,
            });
        }
        Ok(Self {
            x,
            y,
            zoom,
            size,
            payload: Payload::F32(samples.into_boxed_slice()),
        })
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Tile width and height in pixels.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the elevation in meters at pixel (`px`, `py`).
    ///
    /// Pixel coordinates must be in range; callers walking 3x3
    /// neighborhoods must pre-clamp to `[1, size - 2]`.
    pub fn elevation(&self, px: usize, py: usize) -> C {
        let index = py * self.size + px;
        match &self.payload {
            Payload::Rgb { bytes, channels } => {
                let base = index * channels;
                let packed = u32::from(bytes[base]) * 65_536
                    + u32::from(bytes[base + 1]) * 256
                    + u32::from(bytes[base + 2]);
                RGB_OFFSET + C::from(packed) * RGB_SCALE
            }
            Payload::F32(samples) => C::from(samples[index]),
        }
    }

    /// Returns the geographic coordinate of fractional pixel (`px`, `py`)
    /// within this tile. Pass `px + 0.5` for pixel centers.
    pub fn geo(&self, px: C, py: C) -> Coord<C> {
        mercator::pixel_to_geo(self.x, self.y, px, py, self.size, self.zoom)
    }
}

#[cfg(test)]
mod tests {
    use super::{Tile, TileError};
    use approx::assert_relative_eq;

    /// Packs `elevation` (meters) into a Terrain-RGB byte triple.
    fn pack(elevation: f64) -> [u8; 3] {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let packed = ((elevation + 10_000.0) / 0.1).round() as u32;
        [
            (packed >> 16) as u8,
            ((packed >> 8) & 0xff) as u8,
            (packed & 0xff) as u8,
        ]
    }

    #[test]
    fn test_rgb_decode() {
        let elevations = [-10_000.0, -32.1, 0.0, 1903.0, 8848.9];
        for elevation in elevations {
            let mut bytes = Vec::with_capacity(4 * 3);
            for _ in 0..4 {
                bytes.extend_from_slice(&pack(elevation));
            }
            let tile = Tile::from_rgb(0, 0, 0, 2, 3, bytes).unwrap();
            assert_relative_eq!(tile.elevation(1, 1), elevation, epsilon = 0.05);
        }
    }

    #[test]
    fn test_rgba_alpha_ignored() {
        let mut bytes = Vec::with_capacity(4 * 4);
        for alpha in 0..4u8 {
            bytes.extend_from_slice(&pack(250.0));
            bytes.push(alpha);
        }
        let tile = Tile::from_rgb(0, 0, 0, 2, 4, bytes).unwrap();
        for py in 0..2 {
            for px in 0..2 {
                assert_relative_eq!(tile.elevation(px, py), 250.0, epsilon = 0.05);
            }
        }
    }

    #[test]
    fn test_f32_decode() {
        let tile = Tile::from_f32(0, 0, 0, 2, vec![1.5, 2.5, 3.5, 4.5]).unwrap();
        assert_relative_eq!(tile.elevation(0, 0), 1.5);
        assert_relative_eq!(tile.elevation(1, 1), 4.5);
    }

    #[test]
    fn test_payload_len_mismatch() {
        assert!(matches!(
            Tile::from_rgb(0, 0, 0, 256, 3, vec![0u8; 16]),
            Err(TileError::PayloadLen { .. })
        ));
        assert!(matches!(
            Tile::from_f32(0, 0, 0, 256, vec![0.0; 16]),
            Err(TileError::PayloadLen { .. })
        ));
    }

    #[test]
    fn test_invalid_channel_count() {
        assert!(matches!(
            Tile::from_rgb(0, 0, 0, 2, 2, vec![0u8; 8]),
            Err(TileError::Channels(2))
        ));
    }
}
