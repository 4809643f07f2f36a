//! Power-of-two segment allocator over one chunk.
//!
//! A [`SegmentChunk`] serves requests by rounding them up to a segment size
//! `MIN_SEGMENT_SIZE << tier` and claiming the leftmost free segment of that
//! tier in its [`TierBitmap`]. Freeing a segment re-frees its parent only when
//! the buddy is also free, so coarser tiers always reflect whether the whole
//! range beneath them is available.
//!
//! ```text
//!   chunk = 64 bytes, MIN_SEGMENT_SIZE = 4:
//!
//!   tier 4 │                              64                               │
//!   tier 3 │              32               │              32               │
//!   tier 2 │      16       │      16       │      16       │      16       │
//!   tier 1 │   8   │   8   │   8   │   8   │   8   │   8   │   8   │   8   │
//!   tier 0 │ 4 │ 4 │ 4 │ 4 │ 4 │ 4 │ 4 │ 4 │ 4 │ 4 │ 4 │ 4 │ 4 │ 4 │ 4 │ 4 │
//! ```

use std::{fmt, ptr::NonNull};

use crate::{AllocError, Handle, Result, bitmap::TierBitmap, region::Region};

/// Size of a tier-0 segment. Every tier's segment size is this times a power
/// of two.
pub const MIN_SEGMENT_SIZE: usize = 4;

/// A power-of-two chunk managed by a hierarchical free bitmap.
pub struct SegmentChunk {
  region: Region,
  bitmap: TierBitmap,
  free_bytes_count: usize,
}

impl SegmentChunk {
  /// Creates a chunk of at least `size` bytes, rounded up to a power of two.
  ///
  /// # Errors
  ///
  /// - [`AllocError::InvalidConfig`] if `size` is below [`MIN_SEGMENT_SIZE`]
  ///   or cannot be rounded up.
  /// - [`AllocError::MapFailed`] if the chunk cannot be mapped.
  pub fn new(size: usize) -> Result<Self> {
    if size < MIN_SEGMENT_SIZE {
      return Err(AllocError::InvalidConfig(
        "chunk size must be at least MIN_SEGMENT_SIZE bytes",
      ));
    }

    let memory_size = size
      .checked_next_power_of_two()
      .ok_or(AllocError::InvalidConfig("chunk size is too large"))?;

    let region = Region::new(memory_size)?;
    let bitmap = TierBitmap::new(memory_size / MIN_SEGMENT_SIZE);

    tracing::debug!(
      chunk = %region.id(),
      memory_size,
      bitmap_bytes = bitmap.byte_len(),
      "created segment chunk"
    );

    Ok(Self {
      region,
      bitmap,
      free_bytes_count: memory_size,
    })
  }

  /// Claims the leftmost free segment large enough for `bytes_requested`.
  ///
  /// A request of zero bytes still consumes one tier-0 segment.
  ///
  /// # Errors
  ///
  /// - [`AllocError::OutOfMemory`] if no free segment of the required tier
  ///   exists.
  pub fn allocate(
    &mut self,
    bytes_requested: usize,
  ) -> Result<Handle> {
    let out_of_memory = AllocError::OutOfMemory {
      requested: bytes_requested,
    };

    if bytes_requested > self.free_bytes_count {
      return Err(out_of_memory);
    }

    let tier = self.tier_for(bytes_requested).ok_or(out_of_memory)?;
    let index = self.bitmap.first_free(tier).ok_or(out_of_memory)?;

    self.bitmap.mark_occupied(tier, index);

    let segment_size = segment_size(tier);
    self.free_bytes_count -= segment_size;

    tracing::trace!(chunk = %self.region.id(), tier, index, "claimed segment");

    Ok(Handle::new(self.region.id(), index * segment_size))
  }

  /// Releases the segment at `handle` that was allocated for `size` bytes.
  ///
  /// # Errors
  ///
  /// - [`AllocError::NotOwned`] if the handle belongs to another chunk. Pools
  ///   use this to move on to the next chunk.
  /// - [`AllocError::InvalidAddress`] if the offset is not the start of a
  ///   segment of the tier implied by `size`, or if part of that segment is
  ///   free and so it cannot have been allocated whole.
  /// - [`AllocError::DoubleFree`] if that segment is already free.
  ///
  /// The bitmap cannot tell a too-small `size` from a genuine allocation at
  /// that tier, nor a too-large one whose range happens to be fully occupied
  /// by smaller segments. Those frees are accepted and release whatever the
  /// named segment covers, so `size` must match the original request.
  pub fn free(
    &mut self,
    handle: Handle,
    size: usize,
  ) -> Result<()> {
    if handle.owner() != self.region.id() || handle.offset() >= self.memory_size() {
      return Err(AllocError::NotOwned);
    }

    let offset = handle.offset();
    let tier = self
      .tier_for(size)
      .ok_or(AllocError::InvalidAddress { offset })?;

    let segment_size = segment_size(tier);
    if offset % segment_size != 0 {
      return Err(AllocError::InvalidAddress { offset });
    }

    let index = offset / segment_size;
    if self.bitmap.is_free(tier, index) {
      return Err(AllocError::DoubleFree { offset });
    }
    if !self.bitmap.is_fully_occupied(tier, index) {
      return Err(AllocError::InvalidAddress { offset });
    }

    self.bitmap.mark_free(tier, index);
    self.free_bytes_count += segment_size;

    tracing::trace!(chunk = %self.region.id(), tier, index, "released segment");

    Ok(())
  }

  /// [`free`](Self::free) for a raw pointer. Addresses outside this chunk's
  /// byte range are reported as [`AllocError::NotOwned`].
  ///
  /// # Errors
  ///
  /// As for [`free`](Self::free).
  pub fn free_ptr(
    &mut self,
    ptr: NonNull<u8>,
    size: usize,
  ) -> Result<()> {
    let handle = self.handle_of(ptr)?;
    self.free(handle, size)
  }

  /// Raw pointer to the first byte of a segment.
  ///
  /// # Errors
  ///
  /// - [`AllocError::NotOwned`] if the handle does not belong to this chunk.
  pub fn as_ptr(
    &self,
    handle: Handle,
  ) -> Result<NonNull<u8>> {
    if handle.owner() != self.region.id() || handle.offset() >= self.memory_size() {
      return Err(AllocError::NotOwned);
    }
    Ok(self.region.ptr_at(handle.offset()))
  }

  /// Recovers the handle for a raw pointer inside this chunk.
  ///
  /// # Errors
  ///
  /// - [`AllocError::NotOwned`] if `ptr` lies outside the chunk.
  pub fn handle_of(
    &self,
    ptr: NonNull<u8>,
  ) -> Result<Handle> {
    self
      .region
      .offset_of(ptr)
      .map(|offset| Handle::new(self.region.id(), offset))
      .ok_or(AllocError::NotOwned)
  }

  /// Chunk size in bytes, always a power of two.
  #[must_use]
  pub const fn memory_size(&self) -> usize {
    self.region.len()
  }

  /// Bytes freed minus bytes allocated. This does not prove that a
  /// contiguous segment of that size exists.
  #[must_use]
  pub const fn free_bytes(&self) -> usize {
    self.free_bytes_count
  }

  #[must_use]
  pub const fn bitmap(&self) -> &TierBitmap {
    &self.bitmap
  }

  /// Writes the bitmap to the `trace` log, one line per tier.
  pub fn log_bitmap(&self) {
    tracing::trace!(chunk = %self.region.id(), "bitmap:\n{}", self.bitmap);
  }

  /// Tier serving `bytes`, or `None` when it exceeds the chunk.
  fn tier_for(
    &self,
    bytes: usize,
  ) -> Option<usize> {
    let segment = bytes
      .max(MIN_SEGMENT_SIZE)
      .checked_next_power_of_two()?;
    let tier = (segment / MIN_SEGMENT_SIZE).trailing_zeros() as usize;
    (tier < self.bitmap.tier_count()).then_some(tier)
  }
}

/// Segment size used for a request of `bytes`.
#[must_use]
pub const fn segment_size_for(bytes: usize) -> usize {
  let bytes = if bytes < MIN_SEGMENT_SIZE {
    MIN_SEGMENT_SIZE
  } else {
    bytes
  };
  bytes.next_power_of_two()
}

const fn segment_size(tier: usize) -> usize {
  MIN_SEGMENT_SIZE << tier
}

impl fmt::Debug for SegmentChunk {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("SegmentChunk")
      .field("region", &self.region)
      .field("free_bytes_count", &self.free_bytes_count)
      .field("bitmap", &self.bitmap)
      .finish()
  }
}
