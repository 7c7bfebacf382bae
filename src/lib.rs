//! # minalloc - A Freestanding First-Fit Heap
//!
//! This crate provides the `malloc`/`free`/`calloc`/`realloc` family for
//! environments without a platform C library: a bare-metal target, a
//! standalone simulator, or a hosted process that wants its own heap. The
//! only thing it needs from its host is one primitive modeled on `sbrk(2)`
//! that moves the top of a single contiguous region.
//!
//! ## Overview
//!
//! ```text
//!   Arena Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                              ARENA                                   │
//!   │                                                                      │
//!   │   ┌────┬──────┬────┬──────────┬────┬────┬───────────────────────┐    │
//!   │   │ H  │  A   │ H  │ B (free) │ H  │ C  │      unreserved       │    │
//!   │   └────┴──────┴────┴──────────┴────┴────┴───────────────────────┘    │
//!   │   ▲                                     ▲                            │
//!   │   │                                     │                            │
//!   │  first                                 top                           │
//!   │                                   (arena.grow(0))                    │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Blocks are linked in the order they were carved out.
//!   Freeing B only marks it; freeing C hands its bytes back to the arena.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   minalloc
//!   ├── align      - checked_align: round sizes up to WORD
//!   ├── arena      - Arena trait, StaticArena, ProgramBreak
//!   ├── block      - Block header (internal)
//!   ├── config     - ArenaConfig
//!   ├── error      - ArenaError, AllocError
//!   ├── heap       - Heap: allocate, release, calloc, realloc
//!   └── locked     - LockedHeap: Mutex-guarded heap, GlobalAlloc
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use minalloc::{Heap, StaticArena};
//!
//! let mut heap = Heap::new(StaticArena::with_capacity(4096).unwrap());
//!
//! let ptr = heap.allocate(8) as *mut u64;
//! assert!(!ptr.is_null());
//!
//! unsafe {
//!     *ptr = 42;
//!     assert_eq!(*ptr, 42);
//!
//!     heap.release(ptr as *mut u8);
//! }
//! ```
//!
//! ## How It Works
//!
//! Each allocation is a header followed by its payload:
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ payload_size: N │  │  ┌──────────────────────────┐  │
//!   │  │ is_free: false  │  │  │                          │  │
//!   │  │ next: null/ptr  │  │  │     N bytes usable       │  │
//!   │  └─────────────────┘  │  │                          │  │
//!   │     HEADER_SIZE       │  └──────────────────────────┘  │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! - **allocate**: first free block with `payload_size >= size` wins and is
//!   reused whole. Otherwise the arena grows by `HEADER_SIZE + size`.
//! - **release**: the block ending at the arena top is reclaimed, any other
//!   block is marked free.
//! - **calloc**: overflow-checked `count * size`, zero-filled.
//! - **realloc**: in place when the block is already big enough, otherwise
//!   allocate, copy, release.
//!
//! ## Limitations
//!
//! - **Single-threaded**: [`Heap`] takes `&mut self`; use [`LockedHeap`] to share one.
//! - **No splitting or coalescing**: a reused block keeps its full size, and
//!   only the last block is ever returned to the arena.
//! - **Word alignment only**: sizes are rounded up to [`WORD`].
//!
//! ## Safety
//!
//! Releasing or resizing takes raw pointers and is `unsafe`. Releasing a
//! pointer twice or releasing one the heap never handed out is undefined
//! unless the `guard` feature is enabled, in which case both are reported
//! as [`AllocError`]s.

pub mod align;
pub mod arena;
mod block;
pub mod config;
pub mod error;
mod heap;
mod locked;

#[cfg(unix)]
pub use arena::ProgramBreak;
pub use arena::{Arena, StaticArena};
pub use block::{HEADER_SIZE, WORD};
pub use config::ArenaConfig;
pub use error::{AllocError, ArenaError};
pub use heap::{BlockInfo, Blocks, Heap, HeapStats};
pub use locked::LockedHeap;
