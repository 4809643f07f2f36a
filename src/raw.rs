//! The raw-address boundary shared by every allocator.
//!
//! Engines hand out [`Handle`](crate::Handle)s internally; this trait is where
//! they turn into pointers, so that pools and typed adapters can treat every
//! engine the same way.

use std::{alloc::Layout, ptr::NonNull};

use crate::{
  AllocError, BlockAllocator, LinearAllocator, Result, SegmentChunk, align,
};

/// Byte-level allocate/free contract.
pub trait RawAllocator {
  /// Allocates `size` bytes.
  ///
  /// # Errors
  ///
  /// - [`AllocError::OutOfMemory`] when the request cannot be served. Pools
  ///   move on to their next instance on this error only.
  fn allocate_bytes(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>>;

  /// Releases memory obtained from [`allocate_bytes`](Self::allocate_bytes)
  /// with the same `size`.
  ///
  /// # Errors
  ///
  /// - [`AllocError::NotOwned`] when `ptr` lies outside this allocator. Pools
  ///   move on to their next instance on this error only.
  /// - any other error means `ptr` is inside but invalid.
  fn deallocate_bytes(
    &mut self,
    ptr: NonNull<u8>,
    size: usize,
  ) -> Result<()>;

  /// Room for `n` values of `T`, checked for `T`'s alignment.
  ///
  /// The byte count is rounded up to a machine word so that consecutive
  /// typed allocations keep word alignment.
  ///
  /// # Errors
  ///
  /// - [`AllocError::OutOfMemory`] if the request does not fit.
  /// - [`AllocError::Misaligned`] if the engine returned memory unsuitable
  ///   for `T`. The memory is released before returning.
  fn allocate_typed<T>(
    &mut self,
    n: usize,
  ) -> Result<NonNull<T>>
  where
    Self: Sized,
  {
    let size = typed_size::<T>(n)?;
    let ptr = self.allocate_bytes(size)?;

    if !ptr.cast::<T>().is_aligned() {
      self.deallocate_bytes(ptr, size)?;
      return Err(AllocError::Misaligned {
        align: align_of::<T>(),
      });
    }

    Ok(ptr.cast())
  }

  /// Releases memory from [`allocate_typed`](Self::allocate_typed).
  ///
  /// # Errors
  ///
  /// As for [`deallocate_bytes`](Self::deallocate_bytes).
  fn deallocate_typed<T>(
    &mut self,
    ptr: NonNull<T>,
    n: usize,
  ) -> Result<()>
  where
    Self: Sized,
  {
    let size = typed_size::<T>(n)?;
    self.deallocate_bytes(ptr.cast(), size)
  }

  /// Moves `value` into newly allocated memory.
  ///
  /// # Errors
  ///
  /// As for [`allocate_typed`](Self::allocate_typed). `value` is dropped on
  /// failure.
  fn emplace_typed<T>(
    &mut self,
    value: T,
  ) -> Result<NonNull<T>>
  where
    Self: Sized,
  {
    let ptr = self.allocate_typed::<T>(1)?;
    // SAFETY: freshly allocated, aligned, sized for one `T`.
    unsafe { ptr.write(value) };
    Ok(ptr)
  }

  /// Drops the value at `ptr`, zeroes its bytes, then releases the memory.
  ///
  /// # Errors
  ///
  /// As for [`deallocate_typed`](Self::deallocate_typed).
  ///
  /// # Safety
  ///
  /// `ptr` must come from [`emplace_typed`](Self::emplace_typed) on this
  /// allocator, hold a live `T`, and not be used afterwards.
  unsafe fn destroy_typed<T>(
    &mut self,
    ptr: NonNull<T>,
  ) -> Result<()>
  where
    Self: Sized,
  {
    // SAFETY: caller guarantees a live `T` at `ptr`.
    unsafe { zap(ptr) };
    self.deallocate_typed(ptr, 1)
  }
}

/// Byte size requested for `n` values of `T`.
pub(crate) fn typed_size<T>(n: usize) -> Result<usize> {
  let overflow = AllocError::OutOfMemory { requested: usize::MAX };
  let size = n.checked_mul(size_of::<T>()).ok_or(overflow)?;
  if size > usize::MAX - (size_of::<usize>() - 1) {
    return Err(overflow);
  }
  Ok(align!(size))
}

/// Drops the `T` at `ptr` and overwrites its bytes with zeroes.
///
/// # Safety
///
/// `ptr` must hold a live, exclusively owned `T`.
pub(crate) unsafe fn zap<T>(ptr: NonNull<T>) {
  unsafe {
    ptr.drop_in_place();
    ptr.cast::<u8>().write_bytes(0, size_of::<T>());
  }
}

impl RawAllocator for BlockAllocator {
  fn allocate_bytes(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let handle = self.allocate(size)?;
    self.as_ptr(handle)
  }

  fn deallocate_bytes(
    &mut self,
    ptr: NonNull<u8>,
    _size: usize,
  ) -> Result<()> {
    let handle = self.handle_of(ptr)?;
    self.deallocate(handle)
  }
}

impl RawAllocator for SegmentChunk {
  fn allocate_bytes(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let handle = self.allocate(size)?;
    self.as_ptr(handle)
  }

  fn deallocate_bytes(
    &mut self,
    ptr: NonNull<u8>,
    size: usize,
  ) -> Result<()> {
    self.free_ptr(ptr, size)
  }
}

impl RawAllocator for LinearAllocator {
  fn allocate_bytes(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let layout = Layout::from_size_align(size, 1)
      .map_err(|_| AllocError::OutOfMemory { requested: size })?;
    self.allocate(layout)
  }

  fn deallocate_bytes(
    &mut self,
    ptr: NonNull<u8>,
    _size: usize,
  ) -> Result<()> {
    self.deallocate(ptr)
  }
}
