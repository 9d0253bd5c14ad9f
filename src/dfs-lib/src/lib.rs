mod path;
mod service_api;

pub use path::DfsPath;
pub use service_api::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DfsError {
    #[error("invalid path component: {0}")]
    InvalidComponent(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("not a file: {0}")]
    NotAFile(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("no storage servers available: {0}")]
    NoStorage(String),
    #[error("offset out of bounds: {0}")]
    OutOfBounds(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("remote error: {0}")]
    RemoteError(String),
}

impl DfsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DfsError::NotFound(_))
    }

    /// Transport-level failures, as opposed to logical errors raised by the
    /// remote operation itself.
    pub fn is_remote(&self) -> bool {
        matches!(self, DfsError::RemoteError(_))
    }
}

pub type DfsResult<T> = std::result::Result<T, DfsError>;

impl From<std::io::Error> for DfsError {
    fn from(err: std::io::Error) -> Self {
        DfsError::IoError(err.to_string())
    }
}
