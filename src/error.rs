//! Error types shared by every allocator in the crate.

use thiserror::Error;

/// Errors returned by allocation, deallocation and construction.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  /// No free block or segment can hold the request.
  #[error("out of memory: no free region can hold {requested} bytes")]
  OutOfMemory {
    /// Bytes asked for.
    requested: usize,
  },

  /// The address lies outside the allocator's region, or the handle was
  /// issued by another instance.
  #[error("address is not owned by this allocator")]
  NotOwned,

  /// The address is inside the region but does not start a live allocation.
  #[error("offset {offset:#x} does not start a live allocation")]
  InvalidAddress {
    /// Byte offset into the region.
    offset: usize,
  },

  /// The segment at this offset is already marked free.
  #[error("segment at offset {offset:#x} is already free")]
  DoubleFree {
    /// Byte offset into the region.
    offset: usize,
  },

  /// The returned memory does not satisfy the alignment of the requested type.
  #[error("allocation is not aligned to {align} bytes")]
  Misaligned {
    /// Required alignment.
    align: usize,
  },

  /// A sizing parameter violates a structural precondition.
  #[error("invalid configuration: {0}")]
  InvalidConfig(&'static str),

  /// The composition layer already holds its maximum number of instances.
  #[error("pool is full: at most {max} instances")]
  PoolFull {
    /// Instance ceiling.
    max: usize,
  },

  /// The operating system refused to map the backing region.
  #[error("failed to map {size} bytes")]
  MapFailed {
    /// Bytes requested from the OS.
    size: usize,
  },
}

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, AllocError>;

/// Errors raised while loading a [`Config`](crate::config::Config).
#[derive(Error, Debug)]
pub enum ConfigError {
  /// The TOML document could not be parsed.
  #[error("failed to parse configuration: {0}")]
  Parse(#[from] toml::de::Error),

  /// A section parsed but describes an allocator that cannot be built.
  #[error(transparent)]
  Build(#[from] AllocError),
}
