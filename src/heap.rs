use std::{
  marker::PhantomData,
  ptr::{self, NonNull},
};

use log::{trace, warn};

use crate::{
  arena::Arena,
  block::{Block, HEADER_SIZE},
  error::AllocError,
};

/// First-fit allocator over a single [`Arena`].
///
/// Blocks are threaded through the arena in creation order. A released block
/// is marked free and reused as-is by the first request it can hold, unless
/// it sits at the top of the arena, in which case its bytes are handed back.
pub struct Heap<A: Arena> {
  arena: A,
  first: *mut Block,
  last: *mut Block,
}

// Headers live inside the arena the heap owns.
unsafe impl<A: Arena + Send> Send for Heap<A> {}

/// Snapshot of one directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub payload: *mut u8,
  pub payload_size: usize,
  pub is_free: bool,
}

/// Aggregate view of the directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Blocks in the directory, free or not.
  pub blocks: usize,
  pub free_blocks: usize,
  /// Payload bytes held by allocated blocks.
  pub used_bytes: usize,
  /// Payload bytes held by free blocks.
  pub free_bytes: usize,
}

/// Iterator over the directory in arena order.
pub struct Blocks<'a> {
  current: *mut Block,
  _heap: PhantomData<&'a ()>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    if self.current.is_null() {
      return None;
    }

    unsafe {
      let block = self.current;
      self.current = (*block).next;

      Some(BlockInfo {
        payload: Block::payload(block),
        payload_size: (*block).payload_size,
        is_free: (*block).is_free,
      })
    }
  }
}

impl<A: Arena> Heap<A> {
  pub fn new(arena: A) -> Self {
    Self {
      arena,
      first: ptr::null_mut(),
      last: ptr::null_mut(),
    }
  }

  /// Bytes of bookkeeping in front of every payload.
  pub fn header_size(&self) -> usize {
    HEADER_SIZE
  }

  pub fn arena(&self) -> &A {
    &self.arena
  }

  /// Gives the arena back. Outstanding payload pointers dangle once the
  /// arena is dropped.
  pub fn into_arena(self) -> A {
    self.arena
  }

  /// Current top of the arena.
  pub fn top(&mut self) -> *mut u8 {
    self.arena.top()
  }

  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      current: self.first,
      _heap: PhantomData,
    }
  }

  pub fn stats(&self) -> HeapStats {
    self.blocks().fold(HeapStats::default(), |mut stats, block| {
      stats.blocks += 1;
      if block.is_free {
        stats.free_blocks += 1;
        stats.free_bytes += block.payload_size;
      } else {
        stats.used_bytes += block.payload_size;
      }
      stats
    })
  }

  fn find_free_block(
    &self,
    size: usize,
  ) -> *mut Block {
    unsafe {
      let mut current: *mut Block = self.first;

      while !current.is_null() {
        if (*current).is_free && (*current).payload_size >= size {
          return current;
        }
        current = (*current).next;
      }

      ptr::null_mut()
    }
  }

  /// Allocates `size` bytes, reusing the first free block that fits.
  ///
  /// The size is rounded up to [`WORD`](crate::WORD). A reused block keeps
  /// its original size, so the payload may be larger than asked for.
  pub fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }

    let aligned = crate::align::checked_align(size).ok_or(AllocError::SizeOverflow { size })?;

    unsafe {
      let free_block = self.find_free_block(aligned);

      if !free_block.is_null() {
        (*free_block).is_free = false;

        let payload = Block::payload(free_block);
        trace!(
          "allocate({size}) reused {:?} ({} bytes)",
          payload,
          (*free_block).payload_size
        );
        return Ok(NonNull::new_unchecked(payload));
      }

      let total_size = HEADER_SIZE
        .checked_add(aligned)
        .filter(|total| *total <= isize::MAX as usize)
        .ok_or(AllocError::SizeOverflow { size })?;

      let address = self.arena.grow(total_size as isize).map_err(|err| {
        warn!("allocate({size}) failed: {err}");
        err
      })?;

      let block = address as *mut Block;
      block.write(Block::new(aligned));

      if self.first.is_null() {
        self.first = block;
      }
      if !self.last.is_null() {
        (*self.last).next = block;
      }
      self.last = block;

      let payload = Block::payload(block);
      trace!("allocate({size}) grew arena, block at {:?}", payload);
      Ok(NonNull::new_unchecked(payload))
    }
  }

  /// [`try_allocate`](Self::try_allocate) with a null result on failure.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    self.try_allocate(size).map_or(ptr::null_mut(), NonNull::as_ptr)
  }

  /// Releases a payload pointer. Null is a no-op.
  ///
  /// The block at the top of the arena is returned to it; any other block
  /// is only marked free.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live pointer returned by this heap. Without
  /// the `guard` feature, releasing a pointer twice or releasing a foreign
  /// pointer is undefined behavior.
  pub unsafe fn try_release(
    &mut self,
    address: *mut u8,
  ) -> Result<(), AllocError> {
    if address.is_null() {
      return Ok(());
    }

    unsafe {
      let block = Block::from_payload(address);

      #[cfg(feature = "guard")]
      self.check(block, address)?;

      if Block::end(block) != self.arena.top() {
        (*block).is_free = true;
        trace!("release({:?}) marked free", address);
        return Ok(());
      }

      let footprint = (*block).footprint();
      #[cfg(feature = "guard")]
      {
        (*block).magic = 0;
      }
      if let Err(err) = self.arena.grow(-(footprint as isize)) {
        #[cfg(feature = "guard")]
        {
          (*block).magic = crate::block::MAGIC;
        }
        return Err(err.into());
      }

      // Only the predecessors are read from here on, never the reclaimed header.
      self.unlink_last();

      trace!("release({:?}) returned {footprint} bytes to the arena", address);
      Ok(())
    }
  }

  /// [`try_release`](Self::try_release) that only logs a rejection.
  ///
  /// # Safety
  ///
  /// Same contract as [`try_release`](Self::try_release).
  pub unsafe fn release(
    &mut self,
    address: *mut u8,
  ) {
    if let Err(err) = unsafe { self.try_release(address) } {
      warn!("release({:?}) rejected: {err}", address);
    }
  }

  /// Drops the last block from the directory. O(n): the list is singly
  /// linked, so the new last block is found by walking from the first.
  unsafe fn unlink_last(&mut self) {
    unsafe {
      if self.first == self.last {
        self.first = ptr::null_mut();
        self.last = ptr::null_mut();
        return;
      }

      let mut current: *mut Block = self.first;
      while (*current).next != self.last {
        current = (*current).next;
      }
      (*current).next = ptr::null_mut();
      self.last = current;
    }
  }

  #[cfg(feature = "guard")]
  unsafe fn check(
    &self,
    block: *mut Block,
    address: *mut u8,
  ) -> Result<(), AllocError> {
    let addr = address as usize;

    unsafe {
      if !(*block).is_intact() {
        log::error!("release({:?}): no valid header", address);
        return Err(AllocError::Corrupted { addr });
      }
      if (*block).is_free {
        log::error!("release({:?}): block already free", address);
        return Err(AllocError::DoubleFree { addr });
      }
    }

    Ok(())
  }

  /// Allocates `count * size` zeroed bytes.
  pub fn try_calloc(
    &mut self,
    count: usize,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if count == 0 || size == 0 {
      return Err(AllocError::ZeroSize);
    }

    let total = count.wrapping_mul(size);
    if total / count != size {
      trace!("calloc({count}, {size}) overflows");
      return Err(AllocError::Overflow { count, size });
    }

    let payload = self.try_allocate(total)?;
    unsafe { ptr::write_bytes(payload.as_ptr(), 0, total) };

    Ok(payload)
  }

  /// [`try_calloc`](Self::try_calloc) with a null result on failure.
  pub fn calloc(
    &mut self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    self.try_calloc(count, size).map_or(ptr::null_mut(), NonNull::as_ptr)
  }

  /// Resizes an allocation.
  ///
  /// A null `address` or a zero `size` behaves like
  /// [`try_allocate`](Self::try_allocate). A block that is already large
  /// enough is returned unchanged. Otherwise the contents move to a new
  /// block and the old one is released; if that allocation fails the old
  /// block is left untouched.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live pointer returned by this heap.
  pub unsafe fn try_realloc(
    &mut self,
    address: *mut u8,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if address.is_null() || size == 0 {
      return self.try_allocate(size);
    }

    unsafe {
      let block = Block::from_payload(address);

      #[cfg(feature = "guard")]
      self.check(block, address)?;

      let old_size = (*block).payload_size;

      if old_size >= size {
        trace!("realloc({:?}, {size}) fits in place", address);
        return Ok(NonNull::new_unchecked(address));
      }

      let moved = self.try_allocate(size)?;
      ptr::copy_nonoverlapping(address, moved.as_ptr(), old_size.min(size));
      if let Err(err) = self.try_release(address) {
        self.release(moved.as_ptr());
        return Err(err);
      }

      trace!("realloc({:?}, {size}) moved to {:?}", address, moved);
      Ok(moved)
    }
  }

  /// [`try_realloc`](Self::try_realloc) with a null result on failure.
  ///
  /// # Safety
  ///
  /// Same contract as [`try_realloc`](Self::try_realloc).
  pub unsafe fn realloc(
    &mut self,
    address: *mut u8,
    size: usize,
  ) -> *mut u8 {
    unsafe { self.try_realloc(address, size) }.map_or(ptr::null_mut(), NonNull::as_ptr)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{WORD, arena::StaticArena, error::ArenaError};

  fn heap(capacity: usize) -> Heap<StaticArena> {
    let _ = env_logger::builder().is_test(true).try_init();
    Heap::new(StaticArena::with_capacity(capacity).unwrap())
  }

  #[test]
  fn test_neighbouring_payloads_do_not_overlap() {
    let mut heap = heap(4096);

    let sizes = [8usize, 24, 40, 16];
    let blocks: Vec<*mut u8> = sizes.iter().map(|size| heap.allocate(*size)).collect();

    for (tag, (block, size)) in blocks.iter().zip(sizes).enumerate() {
      unsafe { block.write_bytes(tag as u8 + 1, size) };
    }

    // Reusing the second block must not spill into the third.
    unsafe { heap.release(blocks[1]) };
    let reused = heap.allocate(24);
    assert_eq!(reused, blocks[1]);
    unsafe { reused.write_bytes(0xEE, 24) };

    for (tag, (block, size)) in blocks.iter().zip(sizes).enumerate() {
      let expected = if tag == 1 { 0xEE } else { tag as u8 + 1 };
      let bytes = unsafe { std::slice::from_raw_parts(*block, size) };
      assert!(bytes.iter().all(|byte| *byte == expected), "block {tag}");
    }
  }

  #[test]
  fn test_zero_size_touches_nothing() {
    let mut heap = heap(256);
    let top = heap.top();

    assert!(heap.allocate(0).is_null());
    assert!(matches!(heap.try_allocate(0), Err(AllocError::ZeroSize)));
    assert_eq!(heap.top(), top);
    assert_eq!(heap.blocks().count(), 0);
  }

  #[test]
  fn test_payloads_follow_headers() {
    let mut heap = heap(1024);
    let base = heap.arena().base();

    let a = heap.allocate(16);
    let b = heap.allocate(32);

    assert_eq!(a as usize, base as usize + HEADER_SIZE);
    assert_eq!(b as usize, a as usize + 16 + HEADER_SIZE);
    assert_eq!(heap.top() as usize, b as usize + 32);
    assert_eq!(a as usize % WORD, 0);
    assert_eq!(b as usize % WORD, 0);
  }

  #[test]
  fn test_odd_sizes_are_rounded() {
    let mut heap = heap(1024);

    let a = heap.allocate(3);
    let b = heap.allocate(1);

    assert_eq!(b as usize - a as usize, WORD + HEADER_SIZE);
    assert_eq!(heap.blocks().next().unwrap().payload_size, WORD);
    assert_eq!(b as usize % WORD, 0);
  }

  #[test]
  fn test_reuse_first_fit() {
    let mut heap = heap(1024);

    let a = heap.allocate(64);
    let b = heap.allocate(16);
    let _c = heap.allocate(8);

    unsafe {
      heap.release(a);
      heap.release(b);
    }

    // `a` comes first and is big enough, even though `b` fits tighter.
    let top = heap.top();
    assert_eq!(heap.allocate(8), a);
    assert_eq!(heap.allocate(8), b);
    assert_eq!(heap.top(), top);

    // The reused block keeps its size.
    let info = heap.blocks().next().unwrap();
    assert_eq!(info.payload_size, 64);
    assert!(!info.is_free);
  }

  #[test]
  fn test_release_null_is_noop() {
    let mut heap = heap(128);
    unsafe {
      assert!(heap.try_release(ptr::null_mut()).is_ok());
    }
    assert_eq!(heap.stats(), HeapStats::default());
  }

  #[test]
  fn test_tail_shrink_dichotomy() {
    let mut heap = heap(1024);

    let a = heap.allocate(16);
    let b = heap.allocate(32);
    let top = heap.top();

    unsafe { heap.release(a) };
    assert_eq!(heap.top(), top);
    assert_eq!(heap.stats().free_blocks, 1);

    unsafe { heap.release(b) };
    assert_eq!(top as usize - heap.top() as usize, HEADER_SIZE + 32);
    assert_eq!(heap.blocks().count(), 1);
    assert_eq!(heap.top() as usize, a as usize + 16);
  }

  #[test]
  fn test_release_only_block_empties_directory() {
    let mut heap = heap(256);
    let base = heap.top();

    let a = heap.allocate(24);
    unsafe { heap.release(a) };

    assert_eq!(heap.top(), base);
    assert_eq!(heap.blocks().count(), 0);
    assert_eq!(heap.arena().used(), 0);

    // The directory starts over from an empty state.
    assert_eq!(heap.allocate(8), a);
  }

  #[test]
  fn test_tail_shrink_does_not_cascade() {
    let mut heap = heap(1024);

    let a = heap.allocate(8);
    let b = heap.allocate(8);
    let c = heap.allocate(8);

    unsafe {
      heap.release(b);
      heap.release(c);
    }

    // `b` is free and now last, but stays in the directory.
    let blocks: Vec<_> = heap.blocks().collect();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].payload, a);
    assert_eq!(blocks[1].payload, b);
    assert!(blocks[1].is_free);
    assert_eq!(heap.top() as usize, b as usize + 8);

    // Appending after the shrink links onto the new last block.
    let d = heap.allocate(16);
    assert_eq!(d as usize, b as usize + 8 + HEADER_SIZE);
    assert_eq!(heap.blocks().count(), 3);
  }

  #[test]
  fn test_exhaustion_leaves_directory_alone() {
    let mut heap = heap(2 * HEADER_SIZE + 64);

    let a = heap.allocate(32);
    assert!(!a.is_null());
    let before = heap.stats();
    let top = heap.top();

    assert!(heap.allocate(64).is_null());
    assert!(matches!(
      heap.try_allocate(64),
      Err(AllocError::Arena(ArenaError::Exhausted { .. }))
    ));
    assert_eq!(heap.stats(), before);
    assert_eq!(heap.top(), top);

    // What remains is still usable.
    assert!(!heap.allocate(32).is_null());
  }

  #[test]
  fn test_huge_request_overflows() {
    let mut heap = heap(128);

    assert!(matches!(
      heap.try_allocate(usize::MAX),
      Err(AllocError::SizeOverflow { .. })
    ));
    assert!(matches!(
      heap.try_allocate(isize::MAX as usize),
      Err(AllocError::SizeOverflow { .. })
    ));
  }

  #[test]
  fn test_calloc_zeroes_reused_block() {
    let mut heap = heap(1024);

    let a = heap.allocate(32);
    unsafe { a.write_bytes(0xAA, 32) };
    let _b = heap.allocate(8);
    unsafe { heap.release(a) };

    let c = heap.calloc(4, 8);
    assert_eq!(c, a);
    let bytes = unsafe { std::slice::from_raw_parts(c, 32) };
    assert!(bytes.iter().all(|byte| *byte == 0));
  }

  #[test]
  fn test_calloc_rejects_zero_and_overflow() {
    let mut heap = heap(256);

    assert!(heap.calloc(0, 8).is_null());
    assert!(heap.calloc(8, 0).is_null());
    assert!(heap.calloc(usize::MAX, 2).is_null());
    assert!(matches!(
      heap.try_calloc(usize::MAX / 2 + 1, 4),
      Err(AllocError::Overflow { .. })
    ));
    assert_eq!(heap.blocks().count(), 0);
  }

  #[test]
  fn test_realloc_grows_and_copies() {
    let mut heap = heap(1024);

    unsafe {
      let p = heap.allocate(8);
      p.copy_from_nonoverlapping([1u8, 2, 3, 4, 5, 6, 7, 8].as_ptr(), 8);

      let q = heap.realloc(p, 64);
      assert!(!q.is_null());
      assert_ne!(p, q);
      assert_eq!(std::slice::from_raw_parts(q, 8), &[1, 2, 3, 4, 5, 6, 7, 8]);

      // The old block was not last, so it is only marked free.
      let first = heap.blocks().next().unwrap();
      assert_eq!(first.payload, p);
      assert!(first.is_free);
    }
  }

  #[test]
  fn test_realloc_shrink_is_noop() {
    let mut heap = heap(1024);

    unsafe {
      let p = heap.allocate(64);
      let top = heap.top();

      assert_eq!(heap.realloc(p, 8), p);
      assert_eq!(heap.top(), top);
      assert_eq!(heap.blocks().next().unwrap().payload_size, 64);
    }
  }

  #[test]
  fn test_realloc_null_and_zero_delegate() {
    let mut heap = heap(1024);

    unsafe {
      let p = heap.realloc(ptr::null_mut(), 16);
      assert!(!p.is_null());
      assert_eq!(heap.blocks().count(), 1);

      assert!(heap.realloc(p, 0).is_null());
      // Zero means "allocate zero", so `p` is still owned.
      assert!(!heap.blocks().next().unwrap().is_free);
    }
  }

  #[test]
  fn test_realloc_failure_keeps_old_block() {
    let mut heap = heap(HEADER_SIZE + 16);

    unsafe {
      let p = heap.allocate(16);
      p.write_bytes(0x5A, 16);

      assert!(heap.realloc(p, 64).is_null());
      assert_eq!(std::slice::from_raw_parts(p, 16), &[0x5A; 16]);
      assert!(!heap.blocks().next().unwrap().is_free);
      assert_eq!(heap.stats().used_bytes, 16);
    }
  }

  #[test]
  fn test_end_to_end_first_fit_tie_break() {
    let mut heap = heap(1024);

    let _a = heap.allocate(16);
    let b = heap.allocate(32);
    let _c = heap.allocate(8);

    let top = heap.top();
    unsafe { heap.release(b) };
    assert_eq!(heap.top(), top);

    let d = heap.allocate(20);
    assert_eq!(d, b);
    assert_eq!(heap.top(), top);
    assert_eq!(heap.stats().free_blocks, 0);
  }

  #[test]
  fn test_stats() {
    let mut heap = heap(1024);

    let a = heap.allocate(16);
    let _b = heap.allocate(32);
    unsafe { heap.release(a) };

    assert_eq!(
      heap.stats(),
      HeapStats {
        blocks: 2,
        free_blocks: 1,
        used_bytes: 32,
        free_bytes: 16,
      }
    );
  }

  #[cfg(feature = "guard")]
  #[test]
  fn test_guard_catches_double_free() {
    let mut heap = heap(1024);

    let a = heap.allocate(16);
    let _b = heap.allocate(16);

    unsafe {
      heap.try_release(a).unwrap();
      assert!(matches!(
        heap.try_release(a),
        Err(AllocError::DoubleFree { .. })
      ));
    }
  }

  #[cfg(feature = "guard")]
  #[test]
  fn test_guard_release_of_freed_block_is_logged_and_ignored() {
    let mut heap = heap(1024);

    let a = heap.allocate(16);
    let _b = heap.allocate(16);

    unsafe {
      heap.release(a);
      let before = heap.stats();

      // Goes through the `warn!` path instead of touching the directory.
      heap.release(a);
      assert_eq!(heap.stats(), before);
      assert_eq!(heap.allocate(16), a);
    }
  }

  #[cfg(feature = "guard")]
  #[test]
  fn test_guard_realloc_of_freed_block_leaves_directory() {
    let mut heap = heap(1024);

    let a = heap.allocate(16);
    let _b = heap.allocate(16);

    unsafe {
      heap.try_release(a).unwrap();
      let before = heap.stats();
      let top = heap.top();

      assert!(matches!(
        heap.try_realloc(a, 64),
        Err(AllocError::DoubleFree { .. })
      ));
      assert_eq!(heap.stats(), before);
      assert_eq!(heap.top(), top);
    }
  }

  #[cfg(feature = "guard")]
  #[test]
  fn test_guard_realloc_of_reclaimed_tail_leaves_directory() {
    let mut heap = heap(1024);

    let _a = heap.allocate(16);
    let b = heap.allocate(16);

    unsafe {
      heap.try_release(b).unwrap();
      let before = heap.stats();
      let top = heap.top();

      assert!(matches!(
        heap.try_realloc(b, 64),
        Err(AllocError::Corrupted { .. })
      ));
      assert_eq!(heap.stats(), before);
      assert_eq!(heap.top(), top);
    }
  }

  #[cfg(feature = "guard")]
  #[test]
  fn test_guard_catches_reclaimed_tail() {
    let mut heap = heap(1024);

    let _a = heap.allocate(16);
    let b = heap.allocate(16);

    unsafe {
      heap.try_release(b).unwrap();
      let top = heap.top();
      assert!(matches!(
        heap.try_release(b),
        Err(AllocError::Corrupted { .. })
      ));
      assert_eq!(heap.top(), top);
    }
  }

  #[cfg(feature = "guard")]
  #[test]
  fn test_guard_catches_foreign_pointer() {
    let mut heap = heap(1024);
    let a = heap.allocate(64);

    unsafe {
      a.write_bytes(0, 64);
      let inner = a.add(HEADER_SIZE + WORD);
      assert!(matches!(
        heap.try_release(inner),
        Err(AllocError::Corrupted { .. })
      ));
    }
  }
}
