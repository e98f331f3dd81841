use aspect::AspectError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FacetError {
    #[error("missing required parameter '{0}'")]
    Builder(&'static str),

    #[error("empty tile set")]
    EmptyTileSet,

    #[error("tile {x}/{y} disagrees with the set's zoom or size")]
    MismatchedTiles { x: u32, y: u32 },

    #[error("segmentation timed out after {0:?}")]
    SegmentationTimeout(Duration),

    #[error("segmentation failed: {0}")]
    SegmentationFailure(String),

    #[error("{0}")]
    Aspect(#[from] AspectError),
}
