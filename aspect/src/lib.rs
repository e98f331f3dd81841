mod error;
pub mod math;
mod ring;
mod survey;

pub use crate::{
    error::AspectError,
    ring::Ring,
    survey::{AspectSurvey, AspectSurveyBuilder, Statistic, Warning},
};

pub use terrainrgb::C;
