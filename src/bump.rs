use std::{alloc::Layout, ptr::NonNull};

use crate::{AllocError, Result, align_to, region::Region};

/// Bump allocator over one fixed region.
///
/// Allocation advances a cursor. Freeing an address below the cursor zeroes
/// everything from that address up to the cursor and moves the cursor back,
/// releasing that allocation and every later one at once.
///
/// ```text
///   ┌─────┬─────┬─────┬──────────────────────────┐
///   │ A1  │ A2  │ A3  │        untouched         │
///   └─────┴─────┴─────┴──────────────────────────┘
///   0           ▲     ▲                          len
///               │     └── cursor
///               └── free(A2) zeroes A2..cursor, cursor = A2
/// ```
#[derive(Debug)]
pub struct LinearAllocator {
  region: Region,
  cursor: usize,
}

impl LinearAllocator {
  /// Creates an allocator over `size` zeroed bytes.
  ///
  /// # Errors
  ///
  /// - [`AllocError::MapFailed`] if the region cannot be mapped.
  pub fn new(size: usize) -> Result<Self> {
    Ok(Self {
      region: Region::new(size)?,
      cursor: 0,
    })
  }

  /// Bumps the cursor past `layout.size()` bytes aligned to `layout.align()`.
  ///
  /// # Errors
  ///
  /// - [`AllocError::OutOfMemory`] if the region has no room left.
  pub fn allocate(
    &mut self,
    layout: Layout,
  ) -> Result<NonNull<u8>> {
    let out_of_memory = AllocError::OutOfMemory {
      requested: layout.size(),
    };

    let start = align_to!(self.cursor, layout.align());
    let next = start.checked_add(layout.size()).ok_or(out_of_memory)?;
    if next > self.region.len() {
      return Err(out_of_memory);
    }

    self.cursor = next;
    let address = self.region.ptr_at(start);

    tracing::trace!(
      size = layout.size(),
      align = layout.align(),
      ?address,
      cursor = self.cursor,
      "bumped"
    );

    Ok(address)
  }

  /// Room for `n` values of `T`.
  ///
  /// # Errors
  ///
  /// - [`AllocError::OutOfMemory`] if the array does not fit.
  pub fn allocate_array<T>(
    &mut self,
    n: usize,
  ) -> Result<NonNull<T>> {
    let layout = Layout::array::<T>(n).map_err(|_| AllocError::OutOfMemory {
      requested: n.saturating_mul(size_of::<T>()),
    })?;
    Ok(self.allocate(layout)?.cast())
  }

  /// Moves `value` into freshly bumped memory.
  ///
  /// # Errors
  ///
  /// - [`AllocError::OutOfMemory`] if `T` does not fit.
  pub fn emplace<T>(
    &mut self,
    value: T,
  ) -> Result<NonNull<T>> {
    let ptr = self.allocate(Layout::new::<T>())?.cast::<T>();
    // SAFETY: `ptr` is aligned for `T` and has room for one `T`.
    unsafe { ptr.write(value) };
    Ok(ptr)
  }

  /// Releases `address` and everything allocated after it.
  ///
  /// Values living in the released range are not dropped.
  ///
  /// # Errors
  ///
  /// - [`AllocError::NotOwned`] if `address` is not below the cursor.
  pub fn deallocate(
    &mut self,
    address: NonNull<u8>,
  ) -> Result<()> {
    let offset = self
      .region
      .offset_of(address)
      .filter(|&offset| offset < self.cursor)
      .ok_or(AllocError::NotOwned)?;

    self.region.zero(offset, self.cursor - offset);
    self.cursor = offset;

    Ok(())
  }

  /// Releases everything.
  pub fn reset(&mut self) {
    self.region.zero(0, self.cursor);
    self.cursor = 0;
  }

  /// Bytes below the cursor, including alignment padding.
  #[must_use]
  pub const fn used(&self) -> usize {
    self.cursor
  }

  #[must_use]
  pub const fn remaining(&self) -> usize {
    self.region.len() - self.cursor
  }

  #[must_use]
  pub const fn capacity(&self) -> usize {
    self.region.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_alloc() {
    let mut allocator = LinearAllocator::new(256).unwrap();

    unsafe {
      let first_addr = allocator.allocate(Layout::new::<u64>()).unwrap().cast::<u64>();

      first_addr.write(3u64);

      assert_eq!(first_addr.read(), 3);

      let size: usize = 6;

      let second_addr = allocator.allocate_array::<u16>(size).unwrap();

      for i in 0..size {
        second_addr.add(i).write((i + 1) as u16);
      }

      assert_eq!(first_addr.read(), 3);

      for i in 0..size {
        assert_eq!((i + 1) as u16, second_addr.add(i).read());
      }

      allocator.deallocate(first_addr.cast()).unwrap();

      let third_addr = allocator.allocate(Layout::new::<u32>()).unwrap().cast::<u32>();

      assert_eq!(first_addr.cast::<u32>(), third_addr);
      assert_eq!(third_addr.read(), 0);

      allocator.deallocate(third_addr.cast()).unwrap();

      let fourth_addr = allocator.emplace(25u128).unwrap();

      assert_eq!(fourth_addr.read(), 25);
      assert_eq!(fourth_addr.as_ptr() as usize % align_of::<u128>(), 0);
    }
  }

  #[test]
  fn test_alignment_padding() {
    let mut allocator = LinearAllocator::new(64).unwrap();

    let byte = allocator.allocate(Layout::new::<u8>()).unwrap();
    let word = allocator.allocate(Layout::new::<u64>()).unwrap();

    assert_eq!(word.addr().get() - byte.addr().get(), 8);
    assert_eq!(allocator.used(), 16);
  }

  #[test]
  fn test_out_of_memory() {
    let mut allocator = LinearAllocator::new(16).unwrap();

    assert!(allocator.allocate_array::<u8>(16).is_ok());
    assert_eq!(
      allocator.allocate_array::<u8>(1),
      Err(AllocError::OutOfMemory { requested: 1 })
    );
    assert_eq!(allocator.remaining(), 0);
  }

  #[test]
  fn test_free_rewinds_and_zeroes() {
    let mut allocator = LinearAllocator::new(32).unwrap();

    let a = allocator.emplace(0xAAAA_u16).unwrap();
    let b = allocator.emplace(0xBBBB_u16).unwrap();
    let c = allocator.emplace(0xCCCC_u16).unwrap();

    allocator.deallocate(b.cast()).unwrap();

    unsafe {
      assert_eq!(a.read(), 0xAAAA);
      assert_eq!(b.read(), 0);
      assert_eq!(c.read(), 0);
    }
    assert_eq!(allocator.used(), 2);

    assert_eq!(allocator.deallocate(c.cast()), Err(AllocError::NotOwned));
  }

  #[test]
  fn test_reset() {
    let mut allocator = LinearAllocator::new(8).unwrap();
    let value = allocator.emplace(u64::MAX).unwrap();

    allocator.reset();

    assert_eq!(allocator.used(), 0);
    assert_eq!(unsafe { value.read() }, 0);
  }
}
