use std::fmt;

use crate::region::InstanceId;

/// Opaque reference to one live allocation.
///
/// A handle records which allocator issued it and the byte offset of the
/// allocation inside that allocator's region. Handles from one instance are
/// rejected by every other instance with [`AllocError::NotOwned`].
///
/// [`AllocError::NotOwned`]: crate::AllocError::NotOwned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
  owner: InstanceId,
  offset: usize,
}

impl Handle {
  pub(crate) const fn new(
    owner: InstanceId,
    offset: usize,
  ) -> Self {
    Self { owner, offset }
  }

  /// Allocator instance that issued this handle.
  #[must_use]
  pub const fn owner(self) -> InstanceId {
    self.owner
  }

  /// Byte offset from the start of the owning region.
  #[must_use]
  pub const fn offset(self) -> usize {
    self.offset
  }
}

impl fmt::Display for Handle {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "{}+{:#x}", self.owner, self.offset)
  }
}
