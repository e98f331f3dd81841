use thiserror::Error;

#[derive(Error, Debug)]
pub enum TileError {
    #[error("invalid channel count {0}, expected 3 or 4")]
    Channels(usize),

    #[error("payload length {got} does not match {expected} for a {size}x{size} tile")]
    PayloadLen {
        got: usize,
        expected: usize,
        size: usize,
    },
}
