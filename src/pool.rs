//! Ordered composition of allocator instances.
//!
//! ```text
//!   Pool<SegmentChunk>, max_instances = 3
//!
//!   allocate(n) ─► [ chunk #1 ] ─OOM─► [ chunk #2 ] ─OOM─► grow ─► [ chunk #3 ]
//!                                           │
//!                                           └─ Ok(ptr)
//! ```
//!
//! Requests go to each instance in insertion order. Frees go to the first
//! instance that recognises the address.

use std::{fmt, ptr::NonNull};

use crate::{AllocError, BlockAllocator, RawAllocator, Result, SegmentChunk};

/// Instance ceiling used by [`Pool::default`].
pub const DEFAULT_MAX_INSTANCES: usize = 20;

/// Builds a fresh instance able to hold at least the given number of bytes.
pub type Factory<A> = fn(usize) -> Result<A>;

struct Growth<A> {
  min_size: usize,
  factory: Factory<A>,
}

/// A bounded list of allocators tried in order.
pub struct Pool<A> {
  instances: Vec<A>,
  max_instances: usize,
  growth: Option<Growth<A>>,
}

impl<A> Pool<A> {
  /// Empty pool holding at most `max_instances` allocators.
  #[must_use]
  pub fn new(max_instances: usize) -> Self {
    Self {
      instances: Vec::new(),
      max_instances,
      growth: None,
    }
  }

  /// Lets the pool append a new instance when every existing one is out of
  /// memory. The new instance is built with `factory(max(min_size, request))`.
  #[must_use]
  pub fn with_growth(
    mut self,
    min_size: usize,
    factory: Factory<A>,
  ) -> Self {
    self.growth = Some(Growth { min_size, factory });
    self
  }

  /// Appends an instance.
  ///
  /// # Errors
  ///
  /// - [`AllocError::PoolFull`] if the pool is at its ceiling.
  pub fn push(
    &mut self,
    instance: A,
  ) -> Result<()> {
    if self.is_full() {
      return Err(AllocError::PoolFull {
        max: self.max_instances,
      });
    }
    self.instances.push(instance);
    Ok(())
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.instances.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.instances.is_empty()
  }

  #[must_use]
  pub fn is_full(&self) -> bool {
    self.instances.len() >= self.max_instances
  }

  #[must_use]
  pub const fn max_instances(&self) -> usize {
    self.max_instances
  }

  /// Instances in the order they are tried.
  #[must_use]
  pub fn instances(&self) -> &[A] {
    &self.instances
  }
}

impl<A: RawAllocator> Pool<A> {
  /// Allocates from the first instance with room, growing if configured.
  ///
  /// # Errors
  ///
  /// - [`AllocError::OutOfMemory`] if no instance can serve `size` and the
  ///   pool cannot grow.
  /// - any error other than `OutOfMemory` raised by an instance.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    for instance in &mut self.instances {
      match instance.allocate_bytes(size) {
        Err(AllocError::OutOfMemory { .. }) => {}
        result => return result,
      }
    }

    self.grow(size)
  }

  /// Returns `ptr` to whichever instance owns it.
  ///
  /// # Errors
  ///
  /// - [`AllocError::NotOwned`] if no instance owns `ptr`.
  /// - the owning instance's error otherwise.
  pub fn deallocate(
    &mut self,
    ptr: NonNull<u8>,
    size: usize,
  ) -> Result<()> {
    for instance in &mut self.instances {
      match instance.deallocate_bytes(ptr, size) {
        Err(AllocError::NotOwned) => {}
        result => return result,
      }
    }

    Err(AllocError::NotOwned)
  }

  /// Moves `value` into pool memory.
  ///
  /// # Errors
  ///
  /// As for [`RawAllocator::emplace_typed`].
  pub fn emplace<T>(
    &mut self,
    value: T,
  ) -> Result<NonNull<T>> {
    self.emplace_typed(value)
  }

  /// Drops the value at `ptr`, zeroes it and returns its memory.
  ///
  /// # Errors
  ///
  /// As for [`deallocate`](Self::deallocate).
  ///
  /// # Safety
  ///
  /// `ptr` must come from [`emplace`](Self::emplace) on this pool and hold a
  /// live `T`.
  pub unsafe fn free_value<T>(
    &mut self,
    ptr: NonNull<T>,
  ) -> Result<()> {
    // SAFETY: forwarded caller contract.
    unsafe { self.destroy_typed(ptr) }
  }

  fn grow(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let out_of_memory = AllocError::OutOfMemory { requested: size };

    let Some(growth) = self.growth.as_ref().filter(|_| !self.is_full()) else {
      return Err(out_of_memory);
    };

    let capacity = growth.min_size.max(size);
    let instance = (growth.factory)(capacity)?;

    tracing::debug!(
      instances = self.instances.len() + 1,
      capacity,
      "pool grew"
    );

    self.instances.push(instance);
    self
      .instances
      .last_mut()
      .ok_or(out_of_memory)?
      .allocate_bytes(size)
  }
}

impl Pool<SegmentChunk> {
  /// Appends a chunk of at least `size` bytes.
  ///
  /// # Errors
  ///
  /// - [`AllocError::PoolFull`] if the pool is at its ceiling.
  /// - any error from [`SegmentChunk::new`].
  pub fn add_chunk(
    &mut self,
    size: usize,
  ) -> Result<()> {
    if self.is_full() {
      return Err(AllocError::PoolFull {
        max: self.max_instances,
      });
    }
    self.push(SegmentChunk::new(size)?)
  }
}

impl Pool<BlockAllocator> {
  /// Appends an arena of `memory_size` bytes and `max_block_count` headers.
  ///
  /// # Errors
  ///
  /// - [`AllocError::PoolFull`] if the pool is at its ceiling.
  /// - any error from [`BlockAllocator::new`].
  pub fn add_arena(
    &mut self,
    memory_size: usize,
    max_block_count: usize,
  ) -> Result<()> {
    if self.is_full() {
      return Err(AllocError::PoolFull {
        max: self.max_instances,
      });
    }
    self.push(BlockAllocator::new(memory_size, max_block_count)?)
  }
}

impl<A: RawAllocator> RawAllocator for Pool<A> {
  fn allocate_bytes(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    self.allocate(size)
  }

  fn deallocate_bytes(
    &mut self,
    ptr: NonNull<u8>,
    size: usize,
  ) -> Result<()> {
    self.deallocate(ptr, size)
  }
}

impl<A> Default for Pool<A> {
  fn default() -> Self {
    Self::new(DEFAULT_MAX_INSTANCES)
  }
}

impl<A: fmt::Debug> fmt::Debug for Pool<A> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Pool")
      .field("instances", &self.instances)
      .field("max_instances", &self.max_instances)
      .field("grows", &self.growth.is_some())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_tries_instances_in_order() {
    let mut pool = Pool::new(4);
    pool.add_chunk(16).unwrap();
    pool.add_chunk(64).unwrap();

    let first = pool.allocate(16).unwrap();
    let second = pool.allocate(16).unwrap();

    assert_eq!(pool.instances()[0].free_bytes(), 0);
    assert_eq!(pool.instances()[1].free_bytes(), 48);
    assert!(pool.instances()[0].handle_of(first).is_ok());
    assert!(pool.instances()[1].handle_of(second).is_ok());
  }

  #[test]
  fn test_free_routes_to_owner() {
    let mut pool = Pool::new(4);
    pool.add_arena(32, 4).unwrap();
    pool.add_arena(32, 4).unwrap();

    let a = pool.allocate(32).unwrap();
    let b = pool.allocate(8).unwrap();

    pool.deallocate(b, 8).unwrap();
    assert_eq!(pool.instances()[1].free_bytes(), 32);
    assert_eq!(pool.instances()[0].free_bytes(), 0);

    pool.deallocate(a, 32).unwrap();
    assert_eq!(pool.instances()[0].free_bytes(), 32);
  }

  #[test]
  fn test_foreign_pointer_not_owned() {
    let mut pool = Pool::new(1);
    pool.add_chunk(32).unwrap();

    let mut outsider = SegmentChunk::new(32).unwrap();
    let ptr = outsider.allocate_bytes(8).unwrap();

    assert_eq!(pool.deallocate(ptr, 8), Err(AllocError::NotOwned));
  }

  #[test]
  fn test_owner_errors_are_not_skipped() {
    let mut pool = Pool::new(2);
    pool.add_chunk(32).unwrap();
    pool.add_chunk(32).unwrap();

    let ptr = pool.allocate(8).unwrap();
    pool.deallocate(ptr, 8).unwrap();

    assert_eq!(
      pool.deallocate(ptr, 8),
      Err(AllocError::DoubleFree { offset: 0 })
    );
  }

  #[test]
  fn test_full_pool() {
    let mut pool = Pool::new(1);
    pool.add_chunk(8).unwrap();

    assert_eq!(pool.add_chunk(8), Err(AllocError::PoolFull { max: 1 }));
    assert_eq!(
      pool.allocate(16),
      Err(AllocError::OutOfMemory { requested: 16 })
    );
  }

  #[test]
  fn test_growth() {
    let mut pool = Pool::new(3).with_growth(64, SegmentChunk::new);

    assert!(pool.is_empty());
    pool.allocate(8).unwrap();
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.instances()[0].memory_size(), 64);

    pool.allocate(256).unwrap();
    assert_eq!(pool.len(), 2);
    assert_eq!(pool.instances()[1].memory_size(), 256);

    // Both chunks are blocked for a whole 64-byte segment.
    pool.allocate(64).unwrap();
    assert_eq!(pool.len(), 3);

    assert!(pool.is_full());
    assert!(matches!(
      pool.allocate(128),
      Err(AllocError::OutOfMemory { .. })
    ));
  }

  #[test]
  fn test_block_growth_with_closure() {
    let mut pool: Pool<BlockAllocator> =
      Pool::default().with_growth(128, |size| BlockAllocator::new(size, 8));

    let ptr = pool.allocate(200).unwrap();
    assert_eq!(pool.instances()[0].memory_size(), 200);
    assert_eq!(pool.max_instances(), DEFAULT_MAX_INSTANCES);

    pool.deallocate(ptr, 200).unwrap();
  }

  #[test]
  fn test_emplace_and_free_value() {
    let mut pool = Pool::new(2);
    pool.add_chunk(64).unwrap();

    let ptr = pool.emplace([7_u64; 4]).unwrap();
    assert_eq!(unsafe { ptr.read() }, [7; 4]);
    assert_eq!(pool.instances()[0].free_bytes(), 32);

    unsafe { pool.free_value(ptr).unwrap() };
    assert_eq!(pool.instances()[0].free_bytes(), 64);
    assert_eq!(unsafe { ptr.read() }, [0; 4]);
  }
}
