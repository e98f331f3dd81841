//! Statistics over angular samples with wrap-around handling.

use num_traits::{Float, FloatConst};

/// Normalizes a bearing in degrees into `[0, 360)`.
pub fn normalize_deg<T: Float>(deg: T) -> T {
    let full = T::from(360.0).unwrap();
    ((deg % full) + full) % full
}

/// Wraps an angle in radians into `[0, 2*pi)`.
pub fn wrap_rad<T: Float + FloatConst>(rad: T) -> T {
    ((rad % T::TAU()) + T::TAU()) % T::TAU()
}

/// Circular mean of `angles` (radians), in `[0, 2*pi)`.
///
/// Sums the unit vectors of all samples; the mean is the direction of the
/// resultant, which handles the 0/2*pi seam correctly.
pub fn circular_mean<T: Float + FloatConst>(angles: &[T]) -> T {
    let (sin_sum, cos_sum) = resultant(angles);
    wrap_rad(sin_sum.atan2(cos_sum))
}

/// Circular median of `angles` (radians), in `[0, 2*pi)`.
///
/// Sorts the samples, appends a copy shifted by 2*pi, and slides a window
/// of the original length to find the minimal angular span; the median is
/// the middle element of that window. O(n log n) in the sort.
pub fn circular_median<T: Float + FloatConst>(angles: &[T]) -> T {
    let n = angles.len();
    if n == 0 {
        return T::nan();
    }
    let mut sorted: Vec<T> = angles.iter().map(|&a| wrap_rad(a)).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let extended: Vec<T> = sorted
        .iter()
        .copied()
        .chain(sorted.iter().map(|&a| a + T::TAU()))
        .collect();

    let mut best_start = 0;
    let mut best_span = T::infinity();
    for start in 0..n {
        let span = extended[start + n - 1] - extended[start];
        if span < best_span {
            best_span = span;
            best_start = start;
        }
    }

    let median = if n % 2 == 1 {
        extended[best_start + n / 2]
    } else {
        let lo = extended[best_start + n / 2 - 1];
        let hi = extended[best_start + n / 2];
        (lo + hi) / (T::one() + T::one())
    };
    wrap_rad(median)
}

/// Circular dispersion of `angles` (radians): 1 minus the mean resultant
/// length. 0 for perfectly aligned samples, 1 for uniformly scattered.
pub fn dispersion<T: Float + FloatConst>(angles: &[T]) -> T {
    let n = angles.len();
    if n == 0 {
        return T::nan();
    }
    let (sin_sum, cos_sum) = resultant(angles);
    T::one() - sin_sum.hypot(cos_sum) / T::from(n).unwrap()
}

fn resultant<T: Float>(angles: &[T]) -> (T, T) {
    angles.iter().fold((T::zero(), T::zero()), |(s, c), &a| {
        (s + a.sin(), c + a.cos())
    })
}
