use std::{
  alloc::{self, Layout},
  ptr::{self, NonNull},
};

use log::debug;

use crate::{WORD, config::ArenaConfig, error::ArenaError};

/// The growth primitive a [`Heap`](crate::Heap) carves its blocks from.
///
/// Models `sbrk(2)`: one contiguous region with a movable top.
pub trait Arena {
  /// Moves the top of the arena by `delta` bytes and returns the top as it
  /// was *before* the move.
  ///
  /// A zero `delta` only reports the current top. A negative `delta` always
  /// matches a block being reclaimed from the top.
  fn grow(
    &mut self,
    delta: isize,
  ) -> Result<*mut u8, ArenaError>;

  /// Current top of the arena.
  fn top(&mut self) -> *mut u8 {
    self.grow(0).unwrap_or(ptr::null_mut())
  }
}

/// Fixed-capacity arena over a single owned buffer.
///
/// This is the backing store of hosted and simulator runs, where there is no
/// program break to move. The buffer is aligned to [`WORD`].
pub struct StaticArena {
  base: NonNull<u8>,
  capacity: usize,
  used: usize,
}

// The buffer is exclusively owned.
unsafe impl Send for StaticArena {}

impl StaticArena {
  /// Reserves a buffer sized by `config`.
  pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
    config.validate()?;

    let capacity = config.capacity;
    let layout = Layout::from_size_align(capacity, WORD)
      .map_err(|_| ArenaError::InvalidCapacity { capacity })?;
    let base = NonNull::new(unsafe { alloc::alloc(layout) }).ok_or(ArenaError::Reserve { capacity })?;

    debug!("static arena reserved {capacity} bytes at {:?}", base);

    Ok(Self {
      base,
      capacity,
      used: 0,
    })
  }

  /// Shorthand for [`StaticArena::new`] with only a capacity.
  pub fn with_capacity(capacity: usize) -> Result<Self, ArenaError> {
    Self::new(ArenaConfig::new(capacity))
  }

  /// First byte of the buffer.
  pub fn base(&self) -> *mut u8 {
    self.base.as_ptr()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes between the base and the current top.
  pub fn used(&self) -> usize {
    self.used
  }

  pub fn remaining(&self) -> usize {
    self.capacity - self.used
  }
}

impl Arena for StaticArena {
  fn grow(
    &mut self,
    delta: isize,
  ) -> Result<*mut u8, ArenaError> {
    let previous = unsafe { self.base.as_ptr().add(self.used) };

    if delta > 0 {
      let requested = delta as usize;
      if requested > self.remaining() {
        return Err(ArenaError::Exhausted {
          requested,
          remaining: self.remaining(),
        });
      }
      self.used += requested;
      debug!("arena grew by {requested} bytes, {} in use", self.used);
    } else if delta < 0 {
      let requested = delta.unsigned_abs();
      if requested > self.used {
        return Err(ArenaError::Underflow {
          requested,
          used: self.used,
        });
      }
      self.used -= requested;
      debug!("arena shrank by {requested} bytes, {} in use", self.used);
    }

    Ok(previous)
  }
}

impl Drop for StaticArena {
  fn drop(&mut self) {
    // Same layout as in `new`, which already validated it.
    if let Ok(layout) = Layout::from_size_align(self.capacity, WORD) {
      unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
    }
  }
}

/// Arena backed by the process's program break.
#[cfg(unix)]
pub struct ProgramBreak {
  _private: (),
}

#[cfg(unix)]
impl ProgramBreak {
  /// Takes over the program break, first padding it up to [`WORD`].
  ///
  /// # Safety
  ///
  /// Nothing else may move the break while this arena is in use. In
  /// particular the platform allocator must not be `brk`-based, or must not
  /// run between growth and contraction.
  pub unsafe fn new() -> Result<Self, ArenaError> {
    let mut arena = Self { _private: () };

    let current = arena.top() as usize;
    let pad = crate::align::checked_align(current).unwrap_or(current) - current;
    if pad > 0 {
      arena.grow(pad as isize)?;
    }

    Ok(arena)
  }
}

#[cfg(unix)]
impl Arena for ProgramBreak {
  fn grow(
    &mut self,
    delta: isize,
  ) -> Result<*mut u8, ArenaError> {
    let previous = unsafe { libc::sbrk(delta as libc::intptr_t) };

    if previous == usize::MAX as *mut libc::c_void {
      return Err(ArenaError::Os {
        delta,
        source: std::io::Error::last_os_error(),
      });
    }

    if delta != 0 {
      debug!("program break moved by {delta} from {:?}", previous);
    }

    Ok(previous as *mut u8)
  }
}
