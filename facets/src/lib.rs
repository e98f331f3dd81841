//! Planar terrain facet extraction.
//!
//! A drawn footprint and a set of same-zoom elevation tiles are stitched
//! into one dense raster, handed to an isolated planar-segmentation engine
//! under a hard timeout, and the returned planes are clipped back against
//! the footprint to yield per-facet slope, aspect and contour metrics.

mod engine;
mod error;
mod reconcile;
mod segment;
mod stitch;

pub use crate::{
    engine::PlanarFit,
    error::FacetError,
    reconcile::FacetResult,
    segment::{
        FacetSeam, FacetSurvey, FacetSurveyBuilder, Lambda, PlaneDescriptor, SegmentRequest,
        SegmentResponse, SegmentationEngine, SEGMENT_TIMEOUT,
    },
    stitch::{GeoAffine, StitchedRaster},
};

pub use terrainrgb::C;
