/// Out-of-band metadata for one block of a [`BlockAllocator`] arena.
///
/// A header with `size == 0` is an unused slot ("empty") and describes no
/// bytes. Empty headers always carry the free flag.
///
/// [`BlockAllocator`]: crate::BlockAllocator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
  pub size: usize,
  pub is_free: bool,
}

impl Header {
  pub const EMPTY: Self = Self::new(0, true);

  pub const fn new(
    size: usize,
    is_free: bool,
  ) -> Self {
    Self { size, is_free }
  }

  pub const fn is_empty(&self) -> bool {
    self.size == 0
  }

  /// Free and backed by at least one byte.
  pub const fn is_available(&self) -> bool {
    self.is_free && self.size != 0
  }

  pub const fn is_occupied(&self) -> bool {
    !self.is_free
  }

  pub fn reset(&mut self) {
    *self = Self::EMPTY;
  }

  /// Moves all of `other`'s bytes into `self` and empties `other`.
  pub fn absorb(
    &mut self,
    other: &mut Self,
  ) {
    debug_assert!(self.is_free, "absorbing header must be free");
    debug_assert!(other.is_free, "absorbed header must be free");
    self.size += other.size;
    other.reset();
  }
}

/// Public snapshot of one block, as yielded by
/// [`BlockAllocator::blocks`](crate::BlockAllocator::blocks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Byte offset of the block inside the arena.
  pub offset: usize,
  /// Block size in bytes.
  pub size: usize,
  /// Whether the block can be handed out.
  pub is_free: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_states() {
    let empty = Header::EMPTY;
    assert!(empty.is_empty());
    assert!(empty.is_free);
    assert!(!empty.is_available());

    let free = Header::new(8, true);
    assert!(free.is_available());
    assert!(!free.is_occupied());

    let occupied = Header::new(8, false);
    assert!(occupied.is_occupied());
    assert!(!occupied.is_available());
  }

  #[test]
  fn test_absorb() {
    let mut a = Header::new(8, true);
    let mut b = Header::new(4, true);

    a.absorb(&mut b);

    assert_eq!(a, Header::new(12, true));
    assert_eq!(b, Header::EMPTY);
  }
}
