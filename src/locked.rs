use std::{
  alloc::{GlobalAlloc, Layout},
  ptr,
  sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{WORD, arena::Arena, heap::Heap};

/// A [`Heap`] behind one lock, for hosts with more than one thread.
///
/// Every public call holds the lock for its whole duration: the free-list
/// scan, the tail walk and the arena call are not atomic on their own.
pub struct LockedHeap<A: Arena> {
  inner: Mutex<Heap<A>>,
}

impl<A: Arena + Send> LockedHeap<A> {
  pub fn new(arena: A) -> Self {
    Self {
      inner: Mutex::new(Heap::new(arena)),
    }
  }

  /// Locks the heap. A panic while holding the lock leaves no heap invariant
  /// half-updated, so poisoning is ignored.
  pub fn lock(&self) -> MutexGuard<'_, Heap<A>> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn allocate(
    &self,
    size: usize,
  ) -> *mut u8 {
    self.lock().allocate(size)
  }

  /// # Safety
  ///
  /// See [`Heap::try_release`].
  pub unsafe fn release(
    &self,
    address: *mut u8,
  ) {
    unsafe { self.lock().release(address) }
  }

  pub fn calloc(
    &self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    self.lock().calloc(count, size)
  }

  /// # Safety
  ///
  /// See [`Heap::try_realloc`].
  pub unsafe fn realloc(
    &self,
    address: *mut u8,
    size: usize,
  ) -> *mut u8 {
    unsafe { self.lock().realloc(address, size) }
  }

  pub fn into_inner(self) -> Heap<A> {
    self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Payloads are only ever aligned to [`WORD`]; stricter layouts get null.
unsafe impl<A: Arena + Send> GlobalAlloc for LockedHeap<A> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > WORD {
      return ptr::null_mut();
    }
    self.allocate(layout.size())
  }

  unsafe fn dealloc(
    &self,
    address: *mut u8,
    _layout: Layout,
  ) {
    unsafe { self.release(address) }
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > WORD {
      return ptr::null_mut();
    }
    self.calloc(1, layout.size())
  }

  unsafe fn realloc(
    &self,
    address: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    if layout.align() > WORD {
      return ptr::null_mut();
    }
    unsafe { LockedHeap::realloc(self, address, new_size) }
  }
}
