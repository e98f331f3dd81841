mod circular;

pub use circular::{circular_mean, circular_median, dispersion, normalize_deg, wrap_rad};
