//! Hierarchical free bitmap backing a [`SegmentChunk`](crate::SegmentChunk).
//!
//! Tier 0 holds one bit per finest segment; every tier above holds half as
//! many bits, up to a single bit for the whole chunk. All tiers share one
//! packed byte buffer, finest tier first, most significant bit first within a
//! byte.
//!
//! ```text
//!   leaves = 8:
//!
//!   bit:    0 1 2 3 4 5 6 7 | 8 9 10 11 | 12 13 | 14 | pad
//!   tier:   ------ 0 ------ | --- 1 --- | - 2 - | 3  |
//!   byte:   [      0       ] [        1           ]
//! ```
//!
//! A set bit means the segment and everything beneath it is free.

use std::fmt;

#[derive(Debug, Clone, Copy)]
struct Tier {
  base: usize,
  count: usize,
}

/// Packed per-tier free bits.
#[derive(Clone)]
pub struct TierBitmap {
  bits: Box<[u8]>,
  tiers: Box<[Tier]>,
}

impl TierBitmap {
  /// Creates a bitmap over `leaf_count` finest segments with every bit set.
  ///
  /// `leaf_count` must be a non-zero power of two.
  #[must_use]
  pub fn new(leaf_count: usize) -> Self {
    debug_assert!(leaf_count.is_power_of_two());

    let mut tiers = Vec::new();
    let mut base = 0;
    let mut count = leaf_count;
    while count > 0 {
      tiers.push(Tier { base, count });
      base += count;
      count /= 2;
    }

    Self {
      bits: vec![!0; base.div_ceil(8)].into_boxed_slice(),
      tiers: tiers.into_boxed_slice(),
    }
  }

  /// Number of tiers, including the single-segment top tier.
  #[must_use]
  pub fn tier_count(&self) -> usize {
    self.tiers.len()
  }

  /// Number of segments in `tier`.
  #[must_use]
  pub fn segments_in(
    &self,
    tier: usize,
  ) -> usize {
    self.tiers[tier].count
  }

  /// Total bits across all tiers.
  #[must_use]
  pub fn bit_len(&self) -> usize {
    self.tiers.last().map_or(0, |t| t.base + t.count)
  }

  /// Size of the packed buffer in bytes.
  #[must_use]
  pub fn byte_len(&self) -> usize {
    self.bits.len()
  }

  #[must_use]
  pub fn is_free(
    &self,
    tier: usize,
    index: usize,
  ) -> bool {
    let bit = self.bit_index(tier, index);
    self.bits[bit / 8] & (0x80 >> (bit % 8)) != 0
  }

  /// Index of the first free segment in `tier`, scanning left to right and
  /// skipping fully occupied bytes.
  #[must_use]
  pub fn first_free(
    &self,
    tier: usize,
  ) -> Option<usize> {
    let Tier { base, count } = self.tiers[tier];
    let end = base + count;

    let mut bit = base;
    while bit < end {
      let shift = bit % 8;
      let window = self.bits[bit / 8] << shift;
      if window == 0 {
        bit += 8 - shift;
        continue;
      }

      let found = bit + window.leading_zeros() as usize;
      return (found < end).then(|| found - base);
    }

    None
  }

  /// Marks a segment, all its descendants and all its ancestors occupied.
  pub fn mark_occupied(
    &mut self,
    tier: usize,
    index: usize,
  ) {
    self.set_subtree(tier, index, false);

    for (level, above) in (tier + 1..self.tiers.len()).zip(1..) {
      let bit = self.bit_index(level, index >> above);
      self.set_range(bit, 1, false);
    }
  }

  /// Marks a segment and all its descendants free, then frees each ancestor
  /// whose two children are both free.
  pub fn mark_free(
    &mut self,
    tier: usize,
    index: usize,
  ) {
    self.set_subtree(tier, index, true);

    let (mut tier, mut index) = (tier, index);
    while tier + 1 < self.tiers.len() && self.is_free(tier, index ^ 1) {
      tier += 1;
      index >>= 1;
      let bit = self.bit_index(tier, index);
      self.set_range(bit, 1, true);
    }
  }

  /// Whether every finest segment beneath `(tier, index)` is occupied, as a
  /// live allocation at that tier leaves them.
  #[must_use]
  pub fn is_fully_occupied(
    &self,
    tier: usize,
    index: usize,
  ) -> bool {
    let start = self.bit_index(0, index << tier);
    !self.any_set(start, 1 << tier)
  }

  fn set_subtree(
    &mut self,
    tier: usize,
    index: usize,
    free: bool,
  ) {
    for level in 0..=tier {
      let depth = tier - level;
      let bit = self.bit_index(level, index << depth);
      self.set_range(bit, 1 << depth, free);
    }
  }

  /// Writes `len` bits starting at `start`, one masked byte at a time.
  fn set_range(
    &mut self,
    start: usize,
    len: usize,
    free: bool,
  ) {
    let end = start + len;
    let mut bit = start;
    while bit < end {
      let shift = bit % 8;
      let take = (8 - shift).min(end - bit);
      #[allow(clippy::cast_possible_truncation)]
      let mask = ((0xFF00_u16 >> take) as u8) >> shift;

      let byte = &mut self.bits[bit / 8];
      if free {
        *byte |= mask;
      } else {
        *byte &= !mask;
      }

      bit += take;
    }
  }

  fn any_set(
    &self,
    start: usize,
    len: usize,
  ) -> bool {
    let end = start + len;
    let mut bit = start;
    while bit < end {
      let shift = bit % 8;
      let take = (8 - shift).min(end - bit);
      #[allow(clippy::cast_possible_truncation)]
      let mask = ((0xFF00_u16 >> take) as u8) >> shift;

      if self.bits[bit / 8] & mask != 0 {
        return true;
      }

      bit += take;
    }
    false
  }

  fn bit_index(
    &self,
    tier: usize,
    index: usize,
  ) -> usize {
    let Tier { base, count } = self.tiers[tier];
    debug_assert!(index < count, "segment {index} out of range for tier {tier}");
    base + index
  }
}

impl fmt::Display for TierBitmap {
  /// One line per tier, coarsest first.
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    for tier in (0..self.tiers.len()).rev() {
      write!(f, "tier {tier:>2}: ")?;
      for index in 0..self.tiers[tier].count {
        f.write_str(if self.is_free(tier, index) { "1" } else { "0" })?;
      }
      writeln!(f)?;
    }
    Ok(())
  }
}

impl fmt::Debug for TierBitmap {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("TierBitmap")
      .field("tiers", &self.tiers.len())
      .field("bits", &self.bit_len())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tier_bits(
    bitmap: &TierBitmap,
    tier: usize,
  ) -> Vec<bool> {
    (0..bitmap.segments_in(tier)).map(|i| bitmap.is_free(tier, i)).collect()
  }

  #[test]
  fn test_sizing() {
    let bitmap = TierBitmap::new(16);

    assert_eq!(bitmap.tier_count(), 5);
    assert_eq!(bitmap.bit_len(), 31);
    assert_eq!(bitmap.byte_len(), 4);

    let single = TierBitmap::new(1);
    assert_eq!(single.tier_count(), 1);
    assert_eq!(single.byte_len(), 1);
  }

  #[test]
  fn test_starts_fully_free() {
    let bitmap = TierBitmap::new(8);

    for tier in 0..bitmap.tier_count() {
      assert!(tier_bits(&bitmap, tier).iter().all(|&b| b));
      assert_eq!(bitmap.first_free(tier), Some(0));
    }
  }

  #[test]
  fn test_occupy_marks_descendants_and_ancestors() {
    let mut bitmap = TierBitmap::new(8);

    bitmap.mark_occupied(1, 2);

    assert_eq!(
      tier_bits(&bitmap, 0),
      [true, true, true, true, false, false, true, true]
    );
    assert_eq!(tier_bits(&bitmap, 1), [true, true, false, true]);
    assert_eq!(tier_bits(&bitmap, 2), [true, false]);
    assert_eq!(tier_bits(&bitmap, 3), [false]);
  }

  #[test]
  fn test_free_propagates_only_when_buddy_free() {
    let mut bitmap = TierBitmap::new(8);

    bitmap.mark_occupied(0, 0);
    bitmap.mark_occupied(0, 1);

    bitmap.mark_free(0, 0);
    assert!(bitmap.is_free(0, 0));
    assert!(!bitmap.is_free(1, 0));
    assert!(!bitmap.is_free(3, 0));

    bitmap.mark_free(0, 1);
    assert!(bitmap.is_free(1, 0));
    assert!(bitmap.is_free(2, 0));
    assert!(bitmap.is_free(3, 0));
  }

  #[test]
  fn test_free_stops_at_occupied_uncle() {
    let mut bitmap = TierBitmap::new(8);

    bitmap.mark_occupied(0, 0);
    bitmap.mark_occupied(1, 1);

    bitmap.mark_free(0, 0);

    assert!(bitmap.is_free(1, 0));
    assert!(!bitmap.is_free(2, 0));
    assert!(!bitmap.is_free(3, 0));
  }

  #[test]
  fn test_fully_occupied_looks_at_every_leaf() {
    let mut bitmap = TierBitmap::new(32);

    bitmap.mark_occupied(3, 1);
    assert!(bitmap.is_fully_occupied(3, 1));
    assert!(bitmap.is_fully_occupied(1, 5));
    // Ancestors are cleared too, but most of their leaves are still free.
    assert!(!bitmap.is_free(4, 0));
    assert!(!bitmap.is_fully_occupied(4, 0));

    bitmap.mark_occupied(0, 0);
    bitmap.mark_occupied(0, 1);
    assert!(bitmap.is_fully_occupied(1, 0));
    assert!(!bitmap.is_fully_occupied(2, 0));
  }

  #[test]
  fn test_first_free_skips_occupied_bytes() {
    let mut bitmap = TierBitmap::new(32);

    for index in 0..19 {
      bitmap.mark_occupied(0, index);
    }

    assert_eq!(bitmap.first_free(0), Some(19));
    assert_eq!(bitmap.first_free(1), Some(10));
    assert_eq!(bitmap.first_free(5), None);
  }

  #[test]
  fn test_first_free_ignores_neighbouring_tier_bits() {
    let mut bitmap = TierBitmap::new(4);

    // Tier 1 lives at bits 4..6, sharing byte 0 with tier 0 and tier 2.
    bitmap.mark_occupied(1, 0);
    bitmap.mark_occupied(1, 1);

    assert_eq!(bitmap.first_free(1), None);
    assert_eq!(bitmap.first_free(0), None);
    assert_eq!(bitmap.first_free(2), None);
  }

  #[test]
  fn test_range_writes_are_masked_per_byte() {
    let mut bitmap = TierBitmap::new(32);

    // Tier 2 segment 1: tier-0 bits 4..8 and tier-1 bits 34..36.
    bitmap.mark_occupied(2, 1);
    assert_eq!(bitmap.bits[0], 0b1111_0000);
    assert_eq!(bitmap.bits[4], 0b1100_1111);

    // Tier 4 segment 1: tier-0 bits 16..32 span two whole bytes.
    bitmap.mark_occupied(4, 1);
    assert_eq!(bitmap.bits[1], 0xFF);
    assert_eq!(bitmap.bits[2], 0);
    assert_eq!(bitmap.bits[3], 0);
  }

  #[test]
  fn test_display() {
    let mut bitmap = TierBitmap::new(4);
    bitmap.mark_occupied(0, 3);

    assert_eq!(bitmap.to_string(), "tier  2: 0\ntier  1: 10\ntier  0: 1110\n");
  }
}
