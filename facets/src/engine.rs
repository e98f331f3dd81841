//! Default planar-segmentation engine.

use crate::segment::{
    FacetSeam, Lambda, PlaneDescriptor, SegmentRequest, SegmentResponse, SegmentationEngine,
};
use aspect::math::normalize_deg;
use geo::{
    geometry::{MultiPoint, Point},
    ConvexHull,
};
use terrainrgb::C;

/// Assignment/refit rounds before a fit is declared converged.
const MAX_ROUNDS: usize = 16;

/// Plane counts swept by `Lambda::Auto`.
const AUTO_CANDIDATES: [usize; 4] = [1, 2, 3, 4];

/// Per-plane penalty applied when scoring candidate fits, so extra planes
/// must buy a real residual reduction.
const PLANE_PENALTY: C = 0.05;

/// Keeps candidate scoring stable when residuals degenerate to float
/// noise on exactly-planar terrain.
const RESIDUAL_FLOOR: C = 1e-6;

/// Upper bound on requested plane counts.
const MAX_PLANES: usize = 16;

/// Least-squares planar decomposition of a stitched raster.
///
/// The plane-count control is interpreted directly: `Single` fits that
/// many planes, `Candidates` fits each count and keeps the best score,
/// `Auto` sweeps a small built-in range. Fitting alternates
/// assign-to-nearest-plane and least-squares refit from column-strip
/// seeds. Seams are the convex hulls of each plane's member pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarFit;

impl SegmentationEngine for PlanarFit {
    fn run(&self, request: SegmentRequest) -> Result<SegmentResponse, String> {
        let raster = request.raster;
        let width = raster.width();

        let samples: Vec<(usize, usize, C)> = (0..raster.height())
            .flat_map(|py| (0..width).map(move |px| (px, py)))
            .filter_map(|(px, py)| {
                let z = raster.get(px, py);
                z.is_finite().then_some((px, py, z))
            })
            .collect();
        if samples.is_empty() {
            return Err("no finite elevation samples to segment".to_string());
        }

        let candidates = match &request.lambda {
            Lambda::Single(k) => vec![clamp_planes(*k)],
            Lambda::Candidates(ks) if ks.is_empty() => {
                return Err("empty plane-count candidate list".to_string());
            }
            Lambda::Candidates(ks) => ks.iter().map(|&k| clamp_planes(k)).collect(),
            Lambda::Auto => AUTO_CANDIDATES.to_vec(),
        };

        let cells = raster.data().len();
        let mut best: Option<(C, Fit)> = None;
        for k in candidates {
            let fit = fit_planes(&samples, width, cells, k);
            #[allow(clippy::cast_precision_loss)]
            let score =
                (fit.mean_abs_residual + RESIDUAL_FLOOR) * (1.0 + PLANE_PENALTY * k as C);
            if best.as_ref().map_or(true, |(s, _)| score < *s) {
                best = Some((score, fit));
            }
        }
        let (_, fit) = best.ok_or_else(|| "no candidate fit converged".to_string())?;

        let resolution = raster.resolution();
        let mut planes = Vec::with_capacity(fit.planes.len());
        let mut seams = Vec::with_capacity(fit.planes.len());
        #[allow(clippy::cast_possible_truncation)]
        for (id, (coef, members)) in fit.planes.iter().enumerate() {
            let id = id as u32;
            // Pixel rows grow southward, hence the northward sign flip.
            let gx = coef[0] / resolution;
            let gy = -coef[1] / resolution;
            planes.push(PlaneDescriptor {
                id,
                gx,
                gy,
                iso_bearing_deg: normalize_deg(gy.atan2(-gx).to_degrees()),
            });

            #[allow(clippy::cast_precision_loss)]
            let points: Vec<Point<C>> = members
                .iter()
                .map(|&(px, py)| Point::new(px as C + 0.5, py as C + 0.5))
                .collect();
            let hull = MultiPoint::from(points).convex_hull();
            let vertices = hull.exterior().0.iter().map(|c| (c.x, c.y)).collect();
            seams.push(FacetSeam {
                plane_id: id,
                vertices,
            });
        }

        let labels = request.want_labels.then_some(fit.labels);
        Ok(SegmentResponse {
            raster,
            planes,
            seams,
            labels,
        })
    }
}

/// One converged decomposition.
struct Fit {
    /// (coefficients of z = a*px + b*py + c, member pixels) per retained
    /// plane, indexed by plane id.
    planes: Vec<([C; 3], Vec<(usize, usize)>)>,

    /// Raster-parallel plane ids, -1 where exterior or unretained.
    labels: Vec<i32>,

    mean_abs_residual: C,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_planes(k: C) -> usize {
    if k.is_finite() {
        k.round().clamp(1.0, MAX_PLANES as C) as usize
    } else {
        1
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn fit_planes(samples: &[(usize, usize, C)], width: usize, cells: usize, k: usize) -> Fit {
    let k = k.min(samples.len());

    // Seed by vertical strips; columns of a footprint usually straddle
    // any terrain break at least once.
    let mut assign: Vec<usize> = samples
        .iter()
        .map(|&(px, _, _)| (px * k / width).min(k - 1))
        .collect();
    let mut planes: Vec<Option<[C; 3]>> = vec![None; k];

    for _round in 0..MAX_ROUNDS {
        for (plane, coef) in planes.iter_mut().enumerate() {
            *coef = fit_plane(samples, &assign, plane);
        }
        let mut changed = false;
        for (i, &(px, py, z)) in samples.iter().enumerate() {
            let mut nearest = assign[i];
            let mut nearest_residual = C::INFINITY;
            for (plane, coef) in planes.iter().enumerate() {
                let Some(coef) = coef else { continue };
                let residual = (z - eval(coef, px, py)).abs();
                if residual < nearest_residual {
                    nearest_residual = residual;
                    nearest = plane;
                }
            }
            if nearest != assign[i] {
                assign[i] = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    for (plane, coef) in planes.iter_mut().enumerate() {
        *coef = fit_plane(samples, &assign, plane);
    }

    let mut members: Vec<Vec<(usize, usize)>> = vec![Vec::new(); k];
    let mut residual_sum = 0.0;
    for (i, &(px, py, z)) in samples.iter().enumerate() {
        members[assign[i]].push((px, py));
        if let Some(coef) = planes[assign[i]] {
            residual_sum += (z - eval(&coef, px, py)).abs();
        }
    }
    let mean_abs_residual = residual_sum / samples.len() as C;

    // Retain planes substantial enough to carry a seam polygon.
    let mut labels = vec![-1i32; cells];
    let mut retained = Vec::new();
    let mut remap = vec![-1i32; k];
    for (plane, coef) in planes.iter().enumerate() {
        let Some(coef) = coef else { continue };
        if members[plane].len() < 3 {
            continue;
        }
        remap[plane] = retained.len() as i32;
        retained.push((*coef, std::mem::take(&mut members[plane])));
    }
    for (i, &(px, py, _)) in samples.iter().enumerate() {
        let id = remap[assign[i]];
        if id >= 0 {
            labels[py * width + px] = id;
        }
    }

    Fit {
        planes: retained,
        labels,
        mean_abs_residual,
    }
}

/// Least-squares plane over the samples assigned to `plane`; None with no
/// members, a horizontal mean plane when the system is degenerate.
#[allow(clippy::cast_precision_loss)]
fn fit_plane(samples: &[(usize, usize, C)], assign: &[usize], plane: usize) -> Option<[C; 3]> {
    let mut n = 0.0;
    let (mut sx, mut sy, mut sz) = (0.0, 0.0, 0.0);
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    let (mut sxz, mut syz) = (0.0, 0.0);
    for (i, &(px, py, z)) in samples.iter().enumerate() {
        if assign[i] != plane {
            continue;
        }
        let (x, y) = (px as C, py as C);
        n += 1.0;
        sx += x;
        sy += y;
        sz += z;
        sxx += x * x;
        syy += y * y;
        sxy += x * y;
        sxz += x * z;
        syz += y * z;
    }
    if n == 0.0 {
        return None;
    }
    let mean = sz / n;
    if n < 3.0 {
        return Some([0.0, 0.0, mean]);
    }
    let solved = solve3([[sxx, sxy, sx], [sxy, syy, sy], [sx, sy, n]], [sxz, syz, sz]);
    Some(solved.unwrap_or([0.0, 0.0, mean]))
}

fn eval(coef: &[C; 3], px: usize, py: usize) -> C {
    #[allow(clippy::cast_precision_loss)]
    let (x, y) = (px as C, py as C);
    coef[0] * x + coef[1] * y + coef[2]
}

/// Gaussian elimination with partial pivoting; None when singular.
fn solve3(mut m: [[C; 3]; 3], mut v: [C; 3]) -> Option<[C; 3]> {
    for col in 0..3 {
        let pivot = (col..3).max_by(|&a, &b| {
            m[a][col]
                .abs()
                .partial_cmp(&m[b][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if m[pivot][col].abs() < 1e-9 {
            return None;
        }
        m.swap(col, pivot);
        v.swap(col, pivot);
        for row in (col + 1)..3 {
            let factor = m[row][col] / m[col][col];
            for c in col..3 {
                m[row][c] -= factor * m[col][c];
            }
            v[row] -= factor * v[col];
        }
    }
    let mut out = [0.0; 3];
    for row in (0..3).rev() {
        let mut acc = v[row];
        for c in (row + 1)..3 {
            acc -= m[row][c] * out[c];
        }
        out[row] = acc / m[row][row];
    }
    Some(out)
}
