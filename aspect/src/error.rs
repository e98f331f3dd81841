use thiserror::Error;

#[derive(Error, Debug)]
pub enum AspectError {
    #[error("missing required parameter '{0}'")]
    Builder(&'static str),

    #[error("polygon ring requires at least 3 vertices, got {0}")]
    DegenerateGeometry(usize),
}
