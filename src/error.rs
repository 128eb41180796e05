use std::collections::TryReserveError;

use thiserror::Error;

/// Result type alias for container operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the containers.
///
/// Looking up or removing a key that is not present is never an error; those
/// operations report absence through `Option`/`bool` instead.
#[derive(Error, Debug)]
pub enum Error {
    /// The node arena could not grow.
    #[error("failed to allocate node storage: {0}")]
    OutOfMemory(#[from] TryReserveError),

    /// The container already holds as many nodes as its configured capacity.
    #[error("container is full ({capacity} nodes)")]
    CapacityExceeded { capacity: u32 },

    /// The construction configuration was rejected.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}
