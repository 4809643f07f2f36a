/// Rounds `$value` up to the machine word size.
///
/// # Examples
///
/// ```rust
/// use arenalloc::align;
///
/// match size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align::align_up($value, ::core::mem::size_of::<usize>())
  };
}

/// Rounds `$value` up to a multiple of `$align`, which must be a power of two.
///
/// ```rust
/// use arenalloc::align_to;
///
/// assert_eq!(align_to!(5, 4), 8);
/// assert_eq!(align_to!(4096, 4096), 4096);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    $crate::align::align_up($value, $align)
  };
}

/// Rounds `value` up to a multiple of `align`.
///
/// `align` must be a non-zero power of two.
#[must_use]
#[inline]
pub const fn align_up(
  value: usize,
  align: usize,
) -> usize {
  debug_assert!(align.is_power_of_two());
  (value + align - 1) & !(align - 1)
}
