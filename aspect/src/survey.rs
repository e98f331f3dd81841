use crate::{
    math::{circular_mean, circular_median, dispersion, normalize_deg, wrap_rad},
    AspectError, Ring, C,
};
use log::{debug, warn};
use serde::Serialize;
use std::time::Instant;
use terrainrgb::{mercator, Tile};

/// Minimum number of gradient samples for a defined bearing.
const MIN_SAMPLES: usize = 10;

/// Gradient magnitudes below this are numerically flat and carry no usable
/// direction.
const FLAT_EPS: C = 1e-6;

/// Dispersion above this marks the footprint as directionally unstable.
const DISPERSION_WARN: C = 0.6;

/// Which circular statistic aggregates the sample bearings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Statistic {
    #[default]
    Mean,
    Median,
}

/// Diagnostics attached to a survey; advisory, never control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Warning {
    /// Near-flat cells outnumbered directional ones.
    FlatTerrain,
    /// Sample bearings are widely scattered.
    HighDispersion,
}

/// Contour-direction survey of the terrain inside a drawn footprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AspectSurvey {
    /// Contour (iso-altitude) bearing, degrees clockwise from north.
    ///
    /// NaN when `sample_count` is below the reliability minimum.
    pub contour_deg: C,

    /// Number of accepted gradient samples.
    pub sample_count: usize,

    /// 1 minus the mean resultant length of the sample bearings; NaN when
    /// the survey is unreliable.
    pub dispersion: C,

    pub warnings: Vec<Warning>,
}

impl AspectSurvey {
    pub fn builder() -> AspectSurveyBuilder {
        AspectSurveyBuilder {
            ring: None,
            stride: 1,
            statistic: Statistic::default(),
        }
    }
}

pub struct AspectSurveyBuilder {
    /// Drawn footprint (required).
    ring: Option<Ring>,

    /// Pixel step between samples (defaults to 1, every interior pixel).
    stride: usize,

    /// Aggregating statistic (defaults to the circular mean).
    statistic: Statistic,
}

impl AspectSurveyBuilder {
    /// Drawn footprint (required).
    #[must_use]
    pub fn ring(mut self, ring: Ring) -> Self {
        self.ring = Some(ring);
        self
    }

    /// Pixel step between samples; larger strides trade accuracy for speed.
    #[must_use]
    pub fn stride(mut self, stride: usize) -> Self {
        self.stride = stride.max(1);
        self
    }

    /// Aggregating statistic.
    #[must_use]
    pub fn statistic(mut self, statistic: Statistic) -> Self {
        self.statistic = statistic;
        self
    }

    /// Surveys `tiles` and returns the representative contour bearing.
    pub fn build(&self, tiles: &[Tile]) -> Result<AspectSurvey, AspectError> {
        let ring = self.ring.as_ref().ok_or(AspectError::Builder("ring"))?;

        let now = Instant::now();
        let mut bearings: Vec<C> = Vec::new();
        let mut flat_rejects = 0usize;

        for tile in tiles {
            let size = tile.size();
            if size < 3 {
                continue;
            }
            for py in (1..size - 1).step_by(self.stride) {
                for px in (1..size - 1).step_by(self.stride) {
                    let center = tile.geo(px as C + 0.5, py as C + 0.5);
                    if !ring.contains(center) {
                        continue;
                    }
                    let res = mercator::ground_resolution(center.y, size, tile.zoom());
                    match sample_bearing(tile, px, py, res) {
                        Sample::Bearing(bearing) => bearings.push(bearing),
                        Sample::Flat => flat_rejects += 1,
                        Sample::Invalid => (),
                    }
                }
            }
        }

        let sample_count = bearings.len();
        let mut warnings = Vec::new();
        if flat_rejects > sample_count {
            warn!("footprint is mostly flat; {flat_rejects} cells rejected");
            warnings.push(Warning::FlatTerrain);
        }

        if sample_count < MIN_SAMPLES {
            debug!("aspect survey unreliable; samples: {sample_count}");
            return Ok(AspectSurvey {
                contour_deg: C::NAN,
                sample_count,
                dispersion: C::NAN,
                warnings,
            });
        }

        let spread = dispersion(&bearings);
        if spread > DISPERSION_WARN {
            warn!("sample bearings are scattered; dispersion: {spread:.3}");
            warnings.push(Warning::HighDispersion);
        }

        let bearing_rad = match self.statistic {
            Statistic::Mean => circular_mean(&bearings),
            Statistic::Median => circular_median(&bearings),
        };

        debug!(
            "aspect survey; samples: {}, dispersion: {:.3}, exec: {:?}",
            sample_count,
            spread,
            now.elapsed()
        );

        Ok(AspectSurvey {
            contour_deg: normalize_deg(bearing_rad.to_degrees()),
            sample_count,
            dispersion: spread,
            warnings,
        })
    }
}

enum Sample {
    Bearing(C),
    Flat,
    Invalid,
}

/// Horn 3x3 gradient at (`px`, `py`), reduced to the cell's contour
/// bearing.
///
/// Pixel rows run north to south, so the kernel's top row is the northern
/// neighborhood. The contour bearing is the downhill direction rotated 90
/// degrees counterclockwise, which keeps `contour + 90` pointing downhill.
fn sample_bearing(tile: &Tile, px: usize, py: usize, res: C) -> Sample {
    let z1 = tile.elevation(px - 1, py - 1);
    let z2 = tile.elevation(px, py - 1);
    let z3 = tile.elevation(px + 1, py - 1);
    let z4 = tile.elevation(px - 1, py);
    let z6 = tile.elevation(px + 1, py);
    let z7 = tile.elevation(px - 1, py + 1);
    let z8 = tile.elevation(px, py + 1);
    let z9 = tile.elevation(px + 1, py + 1);

    // Eastward and northward elevation gradients, meters per meter.
    let dzdx = ((z3 + 2.0 * z6 + z9) - (z1 + 2.0 * z4 + z7)) / (8.0 * res);
    let dzdy = ((z1 + 2.0 * z2 + z3) - (z7 + 2.0 * z8 + z9)) / (8.0 * res);

    if !dzdx.is_finite() || !dzdy.is_finite() {
        return Sample::Invalid;
    }
    if dzdx.hypot(dzdy) < FLAT_EPS {
        return Sample::Flat;
    }
    Sample::Bearing(wrap_rad(dzdy.atan2(-dzdx)))
}
