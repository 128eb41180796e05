//! Construction-time configuration for the containers.

use crate::error::{Error, Result};

/// Largest number of nodes a single container can address.
///
/// Node handles are `u32` values where `0` is reserved to mean "no node".
pub const MAX_CAPACITY: u32 = u32::MAX - 1;

/// Container configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of live nodes. `None` means bounded only by
    /// [`MAX_CAPACITY`] and available memory.
    pub capacity: Option<u32>,
}

impl Config {
    /// Configuration with a fixed node capacity.
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            capacity: Some(capacity),
        }
    }

    /// Returns the effective capacity, validating the configured value.
    pub(crate) fn resolve_capacity(&self) -> Result<u32> {
        match self.capacity {
            None => Ok(MAX_CAPACITY),
            Some(0) => Err(Error::InvalidConfig {
                message: "capacity must be greater than zero".to_string(),
            }),
            Some(capacity) if capacity > MAX_CAPACITY => Err(Error::InvalidConfig {
                message: format!("capacity {capacity} exceeds the maximum of {MAX_CAPACITY}"),
            }),
            Some(capacity) => Ok(capacity),
        }
    }
}
