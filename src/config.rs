//! TOML description of the allocators a program wants.
//!
//! ```toml
//! [block]
//! memory_size = 4096
//! max_block_count = 64
//!
//! [segments]
//! chunk_size = 4096
//! initial_chunks = 1
//! max_chunks = 20
//! grow = true
//!
//! [linear]
//! size = 1024
//! ```
//!
//! Every section is optional. Sizes are bytes.

use serde::Deserialize;

use crate::{
  BlockAllocator, ConfigError, LinearAllocator, Pool, Result, SegmentChunk,
  pool::DEFAULT_MAX_INSTANCES,
};

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
  pub block: Option<BlockConfig>,
  pub segments: Option<SegmentConfig>,
  pub linear: Option<LinearConfig>,
}

impl Config {
  /// Parses a TOML document.
  ///
  /// # Errors
  ///
  /// - [`ConfigError::Parse`] on malformed TOML, unknown keys or missing
  ///   required keys.
  pub fn from_toml(source: &str) -> core::result::Result<Self, ConfigError> {
    let config: Self = toml::from_str(source)?;
    tracing::debug!(?config, "loaded allocator configuration");
    Ok(config)
  }
}

/// `[block]`: one best-fit arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockConfig {
  pub memory_size: usize,
  pub max_block_count: usize,
}

impl BlockConfig {
  /// # Errors
  ///
  /// As for [`BlockAllocator::new`].
  pub fn build(&self) -> Result<BlockAllocator> {
    BlockAllocator::new(self.memory_size, self.max_block_count)
  }
}

/// `[segments]`: a pool of segment chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentConfig {
  pub chunk_size: usize,
  #[serde(default = "default_initial_chunks")]
  pub initial_chunks: usize,
  #[serde(default = "default_max_chunks")]
  pub max_chunks: usize,
  #[serde(default)]
  pub grow: bool,
}

const fn default_initial_chunks() -> usize {
  1
}

const fn default_max_chunks() -> usize {
  DEFAULT_MAX_INSTANCES
}

impl SegmentConfig {
  /// Builds the pool with `initial_chunks` chunks already in place.
  ///
  /// # Errors
  ///
  /// - [`AllocError::PoolFull`](crate::AllocError::PoolFull) if
  ///   `initial_chunks` exceeds `max_chunks`.
  /// - any error from [`SegmentChunk::new`].
  pub fn build(&self) -> Result<Pool<SegmentChunk>> {
    let mut pool = Pool::new(self.max_chunks);
    if self.grow {
      pool = pool.with_growth(self.chunk_size, SegmentChunk::new);
    }

    for _ in 0..self.initial_chunks {
      pool.add_chunk(self.chunk_size)?;
    }

    Ok(pool)
  }
}

/// `[linear]`: one bump region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearConfig {
  pub size: usize,
}

impl LinearConfig {
  /// # Errors
  ///
  /// As for [`LinearAllocator::new`].
  pub fn build(&self) -> Result<LinearAllocator> {
    LinearAllocator::new(self.size)
  }
}
