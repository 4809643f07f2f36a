//! OS-backed memory regions.
//!
//! Every allocator in this crate draws its bytes from exactly one [`Region`]:
//! an anonymous private mapping obtained with `mmap(2)` and released with
//! `munmap(2)` when the region is dropped.
//!
//! ```text
//!   Region:
//!
//!   base                                     base + len      mapped_len
//!   ┌───────────────────────────────────────┬────────────────┐
//!   │            usable bytes               │  page padding  │
//!   └───────────────────────────────────────┴────────────────┘
//!     offset 0 ───────────────────────► offset len
//! ```
//!
//! Allocators address their region by byte offset. Raw pointers are only
//! produced at the boundary, through [`Region::ptr_at`].

use std::{
  fmt,
  ptr::{self, NonNull},
  sync::atomic::{AtomicU64, Ordering},
};

use crate::{AllocError, Result};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one allocator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
  fn next() -> Self {
    // Only uniqueness is needed.
    Self(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
  }
}

impl fmt::Display for InstanceId {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

fn page_size() -> usize {
  // SAFETY: sysconf has no memory-safety preconditions.
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
  usize::try_from(size).unwrap_or(4096)
}

/// An owned, zero-initialised, page-granular byte buffer.
pub struct Region {
  id: InstanceId,
  base: NonNull<u8>,
  len: usize,
  mapped_len: usize,
}

impl Region {
  /// Maps at least `len` bytes. A zero-length region still maps one page so
  /// that the base pointer is valid and unique.
  ///
  /// # Errors
  ///
  /// - [`AllocError::MapFailed`] if the kernel refuses the mapping.
  pub fn new(len: usize) -> Result<Self> {
    let mapped_len = len
      .max(1)
      .checked_next_multiple_of(page_size())
      .ok_or(AllocError::MapFailed { size: len })?;

    // SAFETY: anonymous private mapping with no address hint.
    let ptr = unsafe {
      libc::mmap(
        ptr::null_mut(),
        mapped_len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if ptr == libc::MAP_FAILED {
      return Err(AllocError::MapFailed { size: mapped_len });
    }

    let base = NonNull::new(ptr.cast::<u8>()).ok_or(AllocError::MapFailed { size: mapped_len })?;
    let id = InstanceId::next();

    tracing::trace!(region = %id, len, mapped_len, "mapped region");

    Ok(Self {
      id,
      base,
      len,
      mapped_len,
    })
  }

  /// Identity of the allocator owning this region.
  #[must_use]
  pub const fn id(&self) -> InstanceId {
    self.id
  }

  /// Usable length in bytes.
  #[must_use]
  pub const fn len(&self) -> usize {
    self.len
  }

  #[must_use]
  pub const fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Base address of the region.
  #[must_use]
  pub const fn base(&self) -> NonNull<u8> {
    self.base
  }

  /// Pointer to `offset` bytes past the base. `offset` may equal `len`.
  #[must_use]
  pub fn ptr_at(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    debug_assert!(offset <= self.len);
    // SAFETY: offset stays inside (or one past) the mapping.
    unsafe { self.base.add(offset) }
  }

  /// Offset of `ptr` from the base, or `None` when `ptr` lies outside
  /// `[base, base + len)`.
  #[must_use]
  pub fn offset_of(
    &self,
    ptr: NonNull<u8>,
  ) -> Option<usize> {
    let offset = ptr.addr().get().checked_sub(self.base.addr().get())?;
    (offset < self.len).then_some(offset)
  }

  /// Overwrites `len` bytes starting at `offset` with zeroes.
  pub fn zero(
    &mut self,
    offset: usize,
    len: usize,
  ) {
    assert!(
      offset.checked_add(len).is_some_and(|end| end <= self.len),
      "zeroed range must lie inside the region"
    );
    // SAFETY: the range was bounds-checked above and the mapping is writable.
    unsafe { ptr::write_bytes(self.base.as_ptr().add(offset), 0, len) };
  }

  /// Read-only view of `len` bytes starting at `offset`.
  #[must_use]
  pub fn bytes(
    &self,
    offset: usize,
    len: usize,
  ) -> &[u8] {
    assert!(
      offset.checked_add(len).is_some_and(|end| end <= self.len),
      "viewed range must lie inside the region"
    );
    // SAFETY: bounds-checked above; the mapping lives as long as `self`.
    unsafe { std::slice::from_raw_parts(self.base.as_ptr().add(offset), len) }
  }
}

impl Drop for Region {
  fn drop(&mut self) {
    // SAFETY: `base` and `mapped_len` describe the mapping created in `new`.
    unsafe { libc::munmap(self.base.as_ptr().cast(), self.mapped_len) };
    tracing::trace!(region = %self.id, "unmapped region");
  }
}

impl fmt::Debug for Region {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Region")
      .field("id", &self.id)
      .field("base", &self.base)
      .field("len", &self.len)
      .finish_non_exhaustive()
  }
}

// SAFETY: the mapping is exclusively owned; moving it to another thread is
// fine. It is not `Sync` because allocators mutate through `&mut self` only.
unsafe impl Send for Region {}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_region_is_zeroed_and_page_rounded() {
    let region = Region::new(100).unwrap();

    assert_eq!(region.len(), 100);
    assert!(region.bytes(0, 100).iter().all(|&b| b == 0));
    assert_eq!(region.base().as_ptr() as usize % page_size(), 0);
  }

  #[test]
  fn test_offset_of() {
    let region = Region::new(64).unwrap();

    assert_eq!(region.offset_of(region.base()), Some(0));
    assert_eq!(region.offset_of(region.ptr_at(63)), Some(63));
    assert_eq!(region.offset_of(region.ptr_at(64)), None);
  }

  #[test]
  fn test_zero() {
    let mut region = Region::new(16).unwrap();

    unsafe { region.base().as_ptr().write_bytes(0xAB, 16) };
    region.zero(4, 8);

    let bytes = region.bytes(0, 16);
    assert!(bytes[..4].iter().all(|&b| b == 0xAB));
    assert!(bytes[4..12].iter().all(|&b| b == 0));
    assert!(bytes[12..].iter().all(|&b| b == 0xAB));
  }

  #[test]
  fn test_ids_are_unique() {
    let a = Region::new(1).unwrap();
    let b = Region::new(1).unwrap();

    assert_ne!(a.id(), b.id());
  }

  #[test]
  fn test_empty_region() {
    let region = Region::new(0).unwrap();

    assert!(region.is_empty());
    assert_eq!(region.offset_of(region.base()), None);
  }
}
