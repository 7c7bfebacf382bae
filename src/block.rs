use std::{mem, ptr};

/// Alignment of every header, and so of every payload handed out.
pub const WORD: usize = mem::align_of::<Block>();

/// Bytes occupied by a header in front of each payload.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

#[cfg(feature = "guard")]
pub(crate) const MAGIC: usize = 0x6d69_6e61_u32 as usize;

const _: () = assert!(HEADER_SIZE % WORD == 0);

/// Header record placed directly in front of its payload inside the arena.
#[repr(C)]
pub(crate) struct Block {
  /// Size recorded when the block was carved out. Never updated on reuse.
  pub payload_size: usize,
  pub is_free: bool,
  /// Next block in arena order, null for the last one.
  pub next: *mut Block,
  #[cfg(feature = "guard")]
  pub magic: usize,
}

impl Block {
  pub fn new(payload_size: usize) -> Self {
    Self {
      payload_size,
      is_free: false,
      next: ptr::null_mut(),
      #[cfg(feature = "guard")]
      magic: MAGIC,
    }
  }

  /// Address of the first payload byte of `block`.
  ///
  /// # Safety
  ///
  /// `block` must point at a header inside the arena.
  pub unsafe fn payload(block: *mut Block) -> *mut u8 {
    unsafe { (block as *mut u8).add(HEADER_SIZE) }
  }

  /// One past the last payload byte of `block`.
  ///
  /// # Safety
  ///
  /// `block` must point at a live header.
  pub unsafe fn end(block: *mut Block) -> *mut u8 {
    unsafe { Self::payload(block).add((*block).payload_size) }
  }

  /// Recovers the owning header of a payload pointer.
  ///
  /// # Safety
  ///
  /// `payload` must have been produced by [`Block::payload`] on a block of
  /// the same heap.
  pub unsafe fn from_payload(payload: *mut u8) -> *mut Block {
    unsafe { payload.sub(HEADER_SIZE) as *mut Block }
  }

  /// Bytes this block takes from the arena, header included.
  pub fn footprint(&self) -> usize {
    HEADER_SIZE + self.payload_size
  }

  #[cfg(feature = "guard")]
  pub fn is_intact(&self) -> bool {
    self.magic == MAGIC
  }
}
