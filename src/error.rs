//! Arena and allocator error types.

use std::io;

use thiserror::Error;

/// Errors reported by an [`Arena`](crate::Arena) growth primitive.
#[derive(Debug, Error)]
pub enum ArenaError {
  /// Not enough room left to extend the arena.
  #[error("arena exhausted: requested {requested} bytes, {remaining} bytes remaining")]
  Exhausted {
    /// Bytes requested.
    requested: usize,
    /// Bytes still available.
    remaining: usize,
  },

  /// A contraction larger than the arena itself.
  #[error("arena underflow: asked to release {requested} bytes, only {used} in use")]
  Underflow {
    /// Bytes asked to be released.
    requested: usize,
    /// Bytes currently in use.
    used: usize,
  },

  /// Capacity outside `1..=isize::MAX`.
  #[error("invalid arena capacity: {capacity} bytes")]
  InvalidCapacity {
    /// Rejected capacity.
    capacity: usize,
  },

  /// The host refused the backing buffer.
  #[error("could not reserve {capacity} bytes of backing storage")]
  Reserve {
    /// Capacity that was being reserved.
    capacity: usize,
  },

  /// `sbrk(2)` failed.
  #[error("sbrk({delta}) failed: {source}")]
  Os {
    /// Delta passed to `sbrk`.
    delta: isize,
    /// Error reported by the OS.
    #[source]
    source: io::Error,
  },
}

/// Reasons an allocator operation returned no memory.
#[derive(Debug, Error)]
pub enum AllocError {
  /// Zero-byte request. Not a fault, there is just nothing to hand out.
  #[error("zero-sized allocation")]
  ZeroSize,

  /// `count * size` does not fit in `usize`.
  #[error("calloc overflow: {count} * {size} does not fit in usize")]
  Overflow {
    /// Element count.
    count: usize,
    /// Element size.
    size: usize,
  },

  /// The request plus its header cannot be expressed as a growth delta.
  #[error("allocation of {size} bytes is too large")]
  SizeOverflow {
    /// Requested size.
    size: usize,
  },

  /// The arena refused to grow.
  #[error(transparent)]
  Arena(#[from] ArenaError),

  /// The pointer does not carry a valid header canary.
  #[error("pointer {addr:#x} has no valid block header")]
  Corrupted {
    /// Payload address passed in.
    addr: usize,
  },

  /// The block is already free.
  #[error("double free of {addr:#x}")]
  DoubleFree {
    /// Payload address passed in.
    addr: usize,
  },
}
