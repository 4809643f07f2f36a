//! Best-fit allocator over one arena with a fixed header budget.
//!
//! The arena is a single [`Region`]. Blocks are described out of band by a
//! boxed slice of [`Header`]s whose order matches address order, so a block's
//! offset is the sum of the sizes of every header before it.
//!
//! ```text
//!   headers:  [ O 8 ][ E 0 ][ F 12 ][ O 4 ][ E 0 ]
//!                │             │       │
//!   arena:    ┌──▼─────┬───────▼───┬───▼──┐
//!             │  used  │   free    │ used │
//!             └────────┴───────────┴──────┘
//!             0        8           20     24
//! ```
//!
//! Splitting a best-fit block hands the leftover bytes to a neighbouring
//! header. When every header slot is in use, the leftover is parked as the
//! single out-of-band remainder until its owning block is freed.

use std::{fmt, ops::Range, ptr::NonNull};

use crate::{
  AllocError, Handle, Result,
  block::{BlockInfo, Header},
  region::Region,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Remainder {
  offset: usize,
  size: usize,
}

/// Best-fit block allocator.
pub struct BlockAllocator {
  region: Region,
  headers: Box<[Header]>,
  remainder: Option<Remainder>,
}

impl BlockAllocator {
  /// Creates an allocator managing `memory_size` bytes with room for at most
  /// `max_block_count` blocks.
  ///
  /// # Errors
  ///
  /// - [`AllocError::InvalidConfig`] if `max_block_count` is zero.
  /// - [`AllocError::MapFailed`] if the arena cannot be mapped.
  pub fn new(
    memory_size: usize,
    max_block_count: usize,
  ) -> Result<Self> {
    if max_block_count == 0 {
      return Err(AllocError::InvalidConfig("max_block_count must be non-zero"));
    }

    let region = Region::new(memory_size)?;
    let mut headers = vec![Header::EMPTY; max_block_count].into_boxed_slice();
    headers[0] = Header::new(memory_size, true);

    tracing::debug!(arena = %region.id(), memory_size, max_block_count, "created block allocator");

    Ok(Self {
      region,
      headers,
      remainder: None,
    })
  }

  /// Allocates `size` bytes using the best-fitting free block.
  ///
  /// A request of zero bytes is served as a one-byte request.
  ///
  /// # Errors
  ///
  /// - [`AllocError::OutOfMemory`] if no free block is large enough.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Handle> {
    let size = size.max(1);

    let mut best: Option<(usize, usize, usize)> = None;
    for (index, offset) in self.offsets() {
      let header = self.headers[index];
      if !header.is_available() || header.size < size {
        continue;
      }

      let diff = header.size - size;
      if best.is_none_or(|(_, _, best_diff)| diff < best_diff) {
        best = Some((index, offset, diff));
        if diff == 0 {
          break;
        }
      }
    }

    let (index, offset, diff) = best.ok_or(AllocError::OutOfMemory { requested: size })?;

    let (index, offset) = if diff == 0 {
      (index, offset)
    } else {
      self.split(index, offset, size, diff)
    };

    self.headers[index].is_free = false;

    Ok(Handle::new(self.region.id(), offset))
  }

  /// Releases the block starting at `handle` and merges it with free
  /// neighbours.
  ///
  /// # Errors
  ///
  /// - [`AllocError::NotOwned`] if the handle belongs to another instance or
  ///   points past the arena.
  /// - [`AllocError::InvalidAddress`] if no occupied block starts at the
  ///   handle's offset. The allocator is left untouched.
  pub fn deallocate(
    &mut self,
    handle: Handle,
  ) -> Result<()> {
    if handle.owner() != self.region.id() || handle.offset() >= self.memory_size() {
      return Err(AllocError::NotOwned);
    }

    let offset = handle.offset();
    let index = self
      .offsets()
      .find(|&(index, start)| start == offset && !self.headers[index].is_empty())
      .map(|(index, _)| index)
      .filter(|&index| self.headers[index].is_occupied())
      .ok_or(AllocError::InvalidAddress { offset })?;

    let end = offset + self.headers[index].size;
    if let Some(remainder) = self.remainder.filter(|r| r.offset == end) {
      tracing::trace!(offset, size = remainder.size, "merging remainder back");
      self.headers[index].size += remainder.size;
      self.remainder = None;
    }

    self.headers[index].is_free = true;

    if let Some(higher) = self.next_block(index).filter(|&h| self.headers[h].is_free) {
      self.merge(index, higher);
    }

    if let Some(lower) = self.prev_block(index).filter(|&l| self.headers[l].is_free) {
      self.merge(lower, index);
    }

    Ok(())
  }

  /// Raw pointer to the first byte of an allocation.
  ///
  /// # Errors
  ///
  /// - [`AllocError::NotOwned`] if the handle does not belong to this arena.
  pub fn as_ptr(
    &self,
    handle: Handle,
  ) -> Result<NonNull<u8>> {
    if handle.owner() != self.region.id() || handle.offset() >= self.memory_size() {
      return Err(AllocError::NotOwned);
    }
    Ok(self.region.ptr_at(handle.offset()))
  }

  /// Recovers the handle for a raw pointer inside this arena.
  ///
  /// # Errors
  ///
  /// - [`AllocError::NotOwned`] if `ptr` lies outside the arena.
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

  /// Total arena size in bytes.
  #[must_use]
  pub const fn memory_size(&self) -> usize {
    self.region.len()
  }

  /// Header budget fixed at construction.
  #[must_use]
  pub fn max_block_count(&self) -> usize {
    self.headers.len()
  }

  /// The out-of-band remainder range, if one is parked.
  #[must_use]
  pub fn remainder(&self) -> Option<Range<usize>> {
    self.remainder.map(|r| r.offset..r.offset + r.size)
  }

  /// Non-empty blocks in address order.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    self
      .offsets()
      .filter(|&(index, _)| !self.headers[index].is_empty())
      .map(|(index, offset)| BlockInfo {
        offset,
        size: self.headers[index].size,
        is_free: self.headers[index].is_free,
      })
  }

  /// Bytes described by headers plus the parked remainder. Always equals
  /// [`memory_size`](Self::memory_size).
  #[must_use]
  pub fn accounted_bytes(&self) -> usize {
    self.headers.iter().map(|h| h.size).sum::<usize>() + self.remainder.map_or(0, |r| r.size)
  }

  /// Bytes held by free blocks.
  #[must_use]
  pub fn free_bytes(&self) -> usize {
    self.headers.iter().filter(|h| h.is_free).map(|h| h.size).sum()
  }

  /// `(header index, block offset)` for every header slot, in order.
  fn offsets(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
    let remainder = self.remainder;
    self.headers.iter().enumerate().scan(0, move |next, (index, header)| {
      let offset = *next;
      *next += header.size;
      // The remainder sits directly behind the block that owns it.
      if let Some(r) = remainder.filter(|r| header.size != 0 && r.offset == *next) {
        *next += r.size;
      }
      Some((index, offset))
    })
  }

  /// Moves `diff` bytes out of the best-fit block at `index` and returns the
  /// block's (possibly shifted) index and offset.
  fn split(
    &mut self,
    index: usize,
    offset: usize,
    size: usize,
    diff: usize,
  ) -> (usize, usize) {
    // While no two free blocks are adjacent, neither a free lower block nor a
    // free non-empty higher one can border the best fit. Both arms stay so
    // the split order holds if that ever changes.
    if let Some(lower) = self.lower_absorber(index) {
      tracing::trace!(index, lower, diff, "leftover moved to lower header");
      self.transfer(index, lower, diff);
      return (index, offset + diff);
    }

    if self.headers.get(index + 1).is_some_and(|h| h.is_free) {
      tracing::trace!(index, diff, "leftover moved to higher header");
      self.transfer(index, index + 1, diff);
      return (index, offset);
    }

    if let Some(empty) = self.headers.iter().position(Header::is_empty) {
      let index = self.move_empty_after(index, empty);
      tracing::trace!(index, from = empty, diff, "relocated empty header");
      self.transfer(index, index + 1, diff);
      return (index, offset);
    }

    if self.remainder.is_none() {
      tracing::debug!(offset = offset + size, size = diff, "header budget exhausted, parking remainder");
      self.headers[index].size -= diff;
      self.remainder = Some(Remainder {
        offset: offset + size,
        size: diff,
      });
      return (index, offset);
    }

    tracing::debug!(offset, slack = diff, "header budget exhausted, embedding slack in block");
    (index, offset)
  }

  /// The nearest non-empty header below block `index`, if it is free.
  fn lower_absorber(
    &self,
    index: usize,
  ) -> Option<usize> {
    self.prev_block(index).filter(|&lower| self.headers[lower].is_free)
  }

  /// Rotates the header records between `index` and `empty` by one slot so
  /// that the empty slot sits directly after the block. Returns the block's
  /// new index.
  fn move_empty_after(
    &mut self,
    index: usize,
    empty: usize,
  ) -> usize {
    debug_assert_ne!(index, empty);
    if empty < index {
      self.headers[empty..=index].rotate_left(1);
      index - 1
    } else {
      self.headers[index + 1..=empty].rotate_right(1);
      index
    }
  }

  fn transfer(
    &mut self,
    from: usize,
    to: usize,
    size: usize,
  ) {
    debug_assert!(self.headers[to].is_free);
    self.headers[from].size -= size;
    self.headers[to].size += size;
  }

  /// Merges block `higher` into block `lower`; both must be free.
  fn merge(
    &mut self,
    lower: usize,
    higher: usize,
  ) {
    tracing::trace!(lower, higher, "coalescing blocks");
    let (head, tail) = self.headers.split_at_mut(higher);
    head[lower].absorb(&mut tail[0]);
  }

  fn next_block(
    &self,
    index: usize,
  ) -> Option<usize> {
    self.headers[index + 1..]
      .iter()
      .position(|h| !h.is_empty())
      .map(|step| index + 1 + step)
  }

  fn prev_block(
    &self,
    index: usize,
  ) -> Option<usize> {
    self.headers[..index].iter().rposition(|h| !h.is_empty())
  }
}

impl fmt::Debug for BlockAllocator {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("BlockAllocator")
      .field("region", &self.region)
      .field("blocks", &self.blocks().collect::<Vec<_>>())
      .field("remainder", &self.remainder())
      .finish()
  }
}
