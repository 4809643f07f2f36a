//! Typed handles onto a shared allocator.
//!
//! An [`Adapter`] is a cheap, clonable view of one allocator instance,
//! parameterised by the element type it hands out. Rebinding to another type
//! keeps the same instance, and two adapters compare equal exactly when they
//! share it.
//!
//! ```text
//!   Registry<SegmentChunk>
//!   ├── 0 ─► Rc<RefCell<SegmentChunk>> ◄── Adapter<u64>, Adapter<Node>
//!   └── 7 ─► Rc<RefCell<SegmentChunk>> ◄── Adapter<[u8; 32]>
//! ```

use std::{
  cell::RefCell,
  collections::HashMap,
  fmt,
  marker::PhantomData,
  ptr::NonNull,
  rc::Rc,
};

use crate::{RawAllocator, Result, raw};

/// Typed view of a shared allocator.
pub struct Adapter<T, A> {
  allocator: Rc<RefCell<A>>,
  _marker: PhantomData<fn() -> T>,
}

impl<T, A: RawAllocator> Adapter<T, A> {
  /// Wraps a fresh allocator in a new shared instance.
  pub fn new(allocator: A) -> Self {
    Self::from_shared(Rc::new(RefCell::new(allocator)))
  }

  /// Views an already shared instance.
  pub fn from_shared(allocator: Rc<RefCell<A>>) -> Self {
    Self {
      allocator,
      _marker: PhantomData,
    }
  }

  /// The underlying instance.
  #[must_use]
  pub fn shared(&self) -> &Rc<RefCell<A>> {
    &self.allocator
  }

  /// Same instance, different element type.
  #[must_use]
  pub fn rebind<U>(&self) -> Adapter<U, A> {
    Adapter::from_shared(Rc::clone(&self.allocator))
  }

  /// Room for `n` values of `T`.
  ///
  /// # Errors
  ///
  /// - [`AllocError::OutOfMemory`](crate::AllocError::OutOfMemory) if the
  ///   instance cannot serve the request.
  /// - [`AllocError::Misaligned`](crate::AllocError::Misaligned) if the
  ///   memory it returned does not suit `T`.
  ///
  /// # Panics
  ///
  /// If the instance is already borrowed, for example from inside a `Drop`
  /// running under [`destroy`](Self::destroy) on another adapter.
  pub fn allocate(
    &self,
    n: usize,
  ) -> Result<NonNull<T>> {
    self.allocator.borrow_mut().allocate_typed(n)
  }

  /// Returns memory from [`allocate`](Self::allocate).
  ///
  /// # Errors
  ///
  /// Whatever the instance reports for `ptr`.
  pub fn deallocate(
    &self,
    ptr: NonNull<T>,
    n: usize,
  ) -> Result<()> {
    self.allocator.borrow_mut().deallocate_typed(ptr, n)
  }

  /// Moves `value` into newly allocated memory.
  ///
  /// # Errors
  ///
  /// As for [`allocate`](Self::allocate).
  pub fn emplace(
    &self,
    value: T,
  ) -> Result<NonNull<T>> {
    self.allocator.borrow_mut().emplace_typed(value)
  }

  /// Drops the value, zeroes its bytes and returns the memory.
  ///
  /// The value is dropped before the instance is borrowed, so its `Drop` may
  /// itself use an adapter onto the same instance.
  ///
  /// # Errors
  ///
  /// As for [`deallocate`](Self::deallocate).
  ///
  /// # Safety
  ///
  /// `ptr` must come from [`emplace`](Self::emplace) on an adapter sharing
  /// this instance, hold a live `T`, and not be used afterwards.
  pub unsafe fn destroy(
    &self,
    ptr: NonNull<T>,
  ) -> Result<()> {
    // SAFETY: forwarded caller contract.
    unsafe { raw::zap(ptr) };
    self.deallocate(ptr, 1)
  }
}

impl<T, A> Clone for Adapter<T, A> {
  fn clone(&self) -> Self {
    Self {
      allocator: Rc::clone(&self.allocator),
      _marker: PhantomData,
    }
  }
}

impl<T, U, A> PartialEq<Adapter<U, A>> for Adapter<T, A> {
  fn eq(
    &self,
    other: &Adapter<U, A>,
  ) -> bool {
    Rc::ptr_eq(&self.allocator, &other.allocator)
  }
}

impl<T, A> Eq for Adapter<T, A> {}

impl<T, A> fmt::Debug for Adapter<T, A> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Adapter")
      .field("element", &std::any::type_name::<T>())
      .field("instance", &Rc::as_ptr(&self.allocator))
      .finish()
  }
}

/// Shared allocator instances keyed by a small integer id.
///
/// Adapters obtained for the same id share one instance; different ids never
/// share memory.
pub struct Registry<A> {
  instances: HashMap<u32, Rc<RefCell<A>>>,
}

impl<A: RawAllocator> Registry<A> {
  #[must_use]
  pub fn new() -> Self {
    Self {
      instances: HashMap::new(),
    }
  }

  /// The instance registered under `id`, building it with `init` on first
  /// use.
  ///
  /// # Errors
  ///
  /// Whatever `init` returns. Nothing is registered in that case.
  pub fn get_or_insert_with(
    &mut self,
    id: u32,
    init: impl FnOnce() -> Result<A>,
  ) -> Result<Rc<RefCell<A>>> {
    if let Some(instance) = self.instances.get(&id) {
      return Ok(Rc::clone(instance));
    }

    let instance = Rc::new(RefCell::new(init()?));
    tracing::debug!(id, "registered allocator instance");
    self.instances.insert(id, Rc::clone(&instance));
    Ok(instance)
  }

  /// A typed adapter onto the instance registered under `id`.
  #[must_use]
  pub fn adapter<T>(
    &self,
    id: u32,
  ) -> Option<Adapter<T, A>> {
    self.instances.get(&id).map(|instance| Adapter::from_shared(Rc::clone(instance)))
  }

  /// Forgets `id`. Adapters still holding the instance keep it alive.
  pub fn remove(
    &mut self,
    id: u32,
  ) -> Option<Rc<RefCell<A>>> {
    self.instances.remove(&id)
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.instances.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.instances.is_empty()
  }
}

impl<A: RawAllocator> Default for Registry<A> {
  fn default() -> Self {
    Self::new()
  }
}

impl<A> fmt::Debug for Registry<A> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let mut ids: Vec<_> = self.instances.keys().collect();
    ids.sort_unstable();
    f.debug_struct("Registry").field("ids", &ids).finish()
  }
}
