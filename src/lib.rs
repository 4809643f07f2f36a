//! # arenalloc - Allocators over Preallocated Regions
//!
//! This crate provides fixed-capacity allocators that manage one
//! `mmap`-backed region each, plus the plumbing to combine them:
//!
//! - [`BlockAllocator`]: best-fit blocks with a fixed header budget
//! - [`SegmentChunk`]: power-of-two segments tracked by a hierarchical bitmap
//! - [`LinearAllocator`]: a bump cursor that frees by rewinding
//!
//! ## Overview
//!
//! ```text
//!   ┌────────────────────────────────────────────────────────────────────┐
//!   │                          Adapter<T, A>                             │
//!   │                 typed, shared via Rc<RefCell<A>>                   │
//!   └───────────────────────────────┬────────────────────────────────────┘
//!                                   │ RawAllocator
//!   ┌───────────────────────────────▼────────────────────────────────────┐
//!   │                            Pool<A>                                 │
//!   │          instances tried in order, optional growth                 │
//!   └──────────┬────────────────────┬───────────────────────┬────────────┘
//!              │                    │                       │
//!   ┌──────────▼──────┐   ┌─────────▼────────┐   ┌──────────▼──────────┐
//!   │ BlockAllocator  │   │  SegmentChunk    │   │  LinearAllocator    │
//!   │ headers + arena │   │ bitmap + chunk   │   │  cursor + region    │
//!   └──────────┬──────┘   └─────────┬────────┘   └──────────┬──────────┘
//!              └────────────────────┼───────────────────────┘
//!                                   ▼
//!                          Region (mmap/munmap)
//! ```
//!
//! Engines speak in [`Handle`]s: the issuing instance plus a byte offset.
//! Raw pointers only appear at the [`RawAllocator`] boundary, where an
//! address from another instance is answered with [`AllocError::NotOwned`].
//!
//! ## Crate Structure
//!
//! ```text
//!   arenalloc
//!   ├── align            - Alignment macros (align!, align_to!)
//!   ├── region           - mmap-backed byte regions and instance ids
//!   ├── handle           - (instance, offset) allocation handles
//!   ├── block            - Block headers (internal)
//!   ├── block_allocator  - BlockAllocator
//!   ├── bitmap           - TierBitmap
//!   ├── segment          - SegmentChunk
//!   ├── bump             - LinearAllocator
//!   ├── raw              - RawAllocator trait and typed helpers
//!   ├── pool             - Pool
//!   ├── adapter          - Adapter, Registry
//!   ├── config           - TOML configuration
//!   └── error            - AllocError, ConfigError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use arenalloc::{BlockAllocator, SegmentChunk};
//!
//! let mut arena = BlockAllocator::new(64, 8)?;
//! let a = arena.allocate(24)?;
//! let b = arena.allocate(8)?;
//! assert_eq!((a.offset(), b.offset()), (0, 24));
//!
//! arena.deallocate(a)?;
//! arena.deallocate(b)?;
//! assert_eq!(arena.blocks().count(), 1);
//!
//! let mut chunk = SegmentChunk::new(64)?;
//! let segment = chunk.allocate(5)?;
//! assert_eq!(chunk.free_bytes(), 56);
//! chunk.free(segment, 5)?;
//! # Ok::<(), arenalloc::AllocError>(())
//! ```
//!
//! ## Logging
//!
//! Allocation decisions are emitted as [`tracing`] events at `trace` and
//! `debug` level. The crate never installs a subscriber.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: engines are `Send` but not `Sync`
//! - **Fixed capacity**: engines never grow; only [`Pool`] adds instances
//! - **Unix-only**: regions come from `mmap(2)`

pub mod align;
mod adapter;
mod bitmap;
mod block;
mod block_allocator;
mod bump;
pub mod config;
mod error;
mod handle;
pub mod pool;
mod raw;
mod region;
mod segment;

pub use adapter::{Adapter, Registry};
pub use bitmap::TierBitmap;
pub use block::BlockInfo;
pub use block_allocator::BlockAllocator;
pub use bump::LinearAllocator;
pub use config::Config;
pub use error::{AllocError, ConfigError, Result};
pub use handle::Handle;
pub use pool::Pool;
pub use raw::RawAllocator;
pub use region::{InstanceId, Region};
pub use segment::{MIN_SEGMENT_SIZE, SegmentChunk, segment_size_for};
