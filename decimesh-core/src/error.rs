//! Error types for decimesh

use thiserror::Error;

/// Main error type for decimesh operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),
}

/// Result type alias for decimesh operations
pub type Result<T> = std::result::Result<T, Error>;
