//! Arena configuration parameters.

use crate::error::ArenaError;

/// Configuration for a [`StaticArena`](crate::StaticArena).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
  /// Size of the backing buffer in bytes.
  ///
  /// Default: 8 MiB. Must be non-zero and no larger than `isize::MAX`.
  pub capacity: usize,
}

impl ArenaConfig {
  /// Default capacity: the heap size of the bare-metal simulator targets.
  pub const DEFAULT_CAPACITY: usize = 8 * 1024 * 1024;

  /// Create a config with the given capacity.
  pub fn new(capacity: usize) -> Self {
    Self { capacity }
  }

  /// Check the config before any memory is reserved.
  pub fn validate(&self) -> Result<(), ArenaError> {
    if self.capacity == 0 || self.capacity > isize::MAX as usize {
      return Err(ArenaError::InvalidCapacity {
        capacity: self.capacity,
      });
    }
    Ok(())
  }
}

impl Default for ArenaConfig {
  fn default() -> Self {
    Self::new(Self::DEFAULT_CAPACITY)
  }
}
