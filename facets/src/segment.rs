//! Facet segmentation dispatch.
//!
//! The planar-segmentation engine runs on a dedicated thread with
//! exclusive ownership of the stitched raster; the coordinator waits on a
//! channel under a hard timeout. An engine that never answers is
//! abandoned, not joined.

use crate::{engine::PlanarFit, reconcile, FacetError, FacetResult, StitchedRaster};
use aspect::Ring;
use log::debug;
use serde::Serialize;
use std::{
    sync::{mpsc, Arc},
    thread,
    time::{Duration, Instant},
};
use terrainrgb::{Tile, C};

/// Hard ceiling on a single segmentation request.
pub const SEGMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Plane-count control handed to the segmentation engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Lambda {
    /// Fit exactly this many planes.
    Single(C),

    /// Fit each candidate count and keep the best-scoring one.
    Candidates(Vec<C>),

    /// Sweep a built-in candidate range.
    Auto,
}

/// A fitted plane and its derived orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaneDescriptor {
    pub id: u32,

    /// Eastward elevation gradient, meters per meter.
    pub gx: C,

    /// Northward elevation gradient, meters per meter.
    pub gy: C,

    /// Iso-altitude (contour) bearing of the plane, degrees clockwise
    /// from north.
    pub iso_bearing_deg: C,
}

/// Facet boundary in raster pixel coordinates, keyed by plane id.
#[derive(Debug, Clone, PartialEq)]
pub struct FacetSeam {
    pub plane_id: u32,

    /// Fractional (column, row) pixel coordinates, row 0 at the raster's
    /// northern edge.
    pub vertices: Vec<(C, C)>,
}

/// A segmentation work order.
///
/// The stitched raster is moved in whole; the engine owns the buffer for
/// the lifetime of the request.
pub struct SegmentRequest {
    pub raster: StitchedRaster,
    pub lambda: Lambda,
    pub want_labels: bool,
}

/// What the engine hands back. The raster buffer returns with the
/// response so metric extraction can rescan it.
pub struct SegmentResponse {
    pub raster: StitchedRaster,
    pub planes: Vec<PlaneDescriptor>,
    pub seams: Vec<FacetSeam>,

    /// Raster-parallel plane ids, -1 where exterior or unlabeled. Present
    /// when the request asked for labels.
    pub labels: Option<Vec<i32>>,
}

/// An isolated planar-segmentation computation.
///
/// Implementations run on a dedicated thread with no shared mutable
/// state; errors are plain messages, surfaced to the caller as
/// [`FacetError::SegmentationFailure`].
pub trait SegmentationEngine: Send + Sync {
    fn run(&self, request: SegmentRequest) -> Result<SegmentResponse, String>;
}

/// Facet decomposition of the terrain inside a drawn footprint.
#[derive(Debug, Clone, Serialize)]
pub struct FacetSurvey {
    pub facets: Vec<FacetResult>,
}

impl FacetSurvey {
    pub fn builder() -> FacetSurveyBuilder {
        FacetSurveyBuilder {
            ring: None,
            lambda: Lambda::Auto,
            timeout: SEGMENT_TIMEOUT,
            engine: Arc::new(PlanarFit),
        }
    }
}

pub struct FacetSurveyBuilder {
    /// Drawn footprint (required).
    ring: Option<Ring>,

    /// Plane-count control (defaults to `Auto`).
    lambda: Lambda,

    /// Hard deadline for the segmentation engine.
    timeout: Duration,

    /// The isolated computation to dispatch to.
    engine: Arc<dyn SegmentationEngine>,
}

impl FacetSurveyBuilder {
    /// Drawn footprint (required).
    #[must_use]
    pub fn ring(mut self, ring: Ring) -> Self {
        self.ring = Some(ring);
        self
    }

    /// Plane-count control (defaults to `Auto`).
    #[must_use]
    pub fn lambda(mut self, lambda: Lambda) -> Self {
        self.lambda = lambda;
        self
    }

    /// Hard deadline for the segmentation engine (defaults to
    /// [`SEGMENT_TIMEOUT`]).
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces the default planar-fit engine.
    #[must_use]
    pub fn engine<E: SegmentationEngine + 'static>(mut self, engine: E) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    /// Stitches `tiles`, runs segmentation, and reconciles the returned
    /// planes against the drawn footprint.
    ///
    /// One invocation, one response: the request either resolves with a
    /// (possibly empty) facet list or fails with a single tagged error.
    pub fn build(&self, tiles: &[Tile]) -> Result<FacetSurvey, FacetError> {
        let ring = self.ring.clone().ok_or(FacetError::Builder("ring"))?;
        let raster = StitchedRaster::stitch(&ring, tiles)?;
        let request = SegmentRequest {
            raster,
            lambda: self.lambda.clone(),
            want_labels: true,
        };

        let (tx, rx) = mpsc::channel();
        let engine = Arc::clone(&self.engine);
        thread::spawn(move || {
            // The receiver is gone if the deadline already passed; the
            // result is dropped with the channel.
            let _ = tx.send(engine.run(request));
        });

        let now = Instant::now();
        let response = match rx.recv_timeout(self.timeout) {
            Ok(Ok(response)) => response,
            Ok(Err(message)) => return Err(FacetError::SegmentationFailure(message)),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                return Err(FacetError::SegmentationTimeout(self.timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(FacetError::SegmentationFailure(
                    "segmentation unit stopped without a response".to_string(),
                ))
            }
        };
        debug!(
            "segmentation; planes: {}, seams: {}, exec: {:?}",
            response.planes.len(),
            response.seams.len(),
            now.elapsed()
        );

        Ok(FacetSurvey {
            facets: reconcile::reconcile(&ring, &response),
        })
    }
}
