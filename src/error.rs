use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed tile: {0}")]
    MalformedTile(String),

    #[error("unsupported geometry type {0}")]
    UnsupportedGeometry(String),

    #[error("no tile worker channel is available")]
    WorkerUnavailable,

    #[error("tile fetch timed out after {0} ms")]
    FetchTimeout(u64),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
