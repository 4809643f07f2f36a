use std::{alloc::Layout, io::Read};

use arenalloc::{Adapter, AllocError, BlockAllocator, LinearAllocator, Pool, SegmentChunk};

/// Waits for ENTER when the demo runs with `--pause`, so the mappings can be
/// inspected with `pmap` or `gdb` between steps.
fn block_until_enter_pressed(pause: bool) {
  if pause {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

fn print_blocks(arena: &BlockAllocator) {
  for block in arena.blocks() {
    println!(
      "    {:>4}..{:<4} {:>4} bytes  {}",
      block.offset,
      block.offset + block.size,
      block.size,
      if block.is_free { "free" } else { "used" }
    );
  }
  if let Some(remainder) = arena.remainder() {
    println!("    remainder {remainder:?}");
  }
}

fn main() -> Result<(), AllocError> {
  let pause = std::env::args().any(|arg| arg == "--pause");
  println!("PID = {}", std::process::id());

  // --------------------------------------------------------------------
  // 1) Best-fit blocks: 64 bytes, at most 4 headers.
  // --------------------------------------------------------------------
  let mut arena = BlockAllocator::new(64, 4)?;
  let a = arena.allocate(16)?;
  let b = arena.allocate(8)?;
  let c = arena.allocate(24)?;
  println!("\n[1] a = {a}, b = {b}, c = {c}");
  print_blocks(&arena);
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 2) Every header is in use, so the next split parks a remainder.
  // --------------------------------------------------------------------
  let d = arena.allocate(4)?;
  println!("\n[2] d = {d} (header budget exhausted)");
  print_blocks(&arena);
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 3) Freeing neighbours coalesces them; freeing d reclaims the remainder.
  // --------------------------------------------------------------------
  arena.deallocate(b)?;
  arena.deallocate(a)?;
  arena.deallocate(d)?;
  println!("\n[3] after freeing a, b and d");
  print_blocks(&arena);
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 4) Segments: a 64-byte chunk split into power-of-two pieces.
  // --------------------------------------------------------------------
  let mut chunk = SegmentChunk::new(64)?;
  let half = chunk.allocate(32)?;
  let small = chunk.allocate(3)?;
  println!("\n[4] half = {half}, small = {small}, free = {}", chunk.free_bytes());
  print!("{}", chunk.bitmap());
  // Same dump through `tracing`, for runs with a subscriber attached.
  chunk.log_bitmap();

  chunk.free(small, 3)?;
  chunk.free(half, 32)?;
  println!("[4] after freeing both");
  print!("{}", chunk.bitmap());
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 5) Linear: bump, then rewind by freeing an earlier address.
  // --------------------------------------------------------------------
  let mut linear = LinearAllocator::new(64)?;
  let first = linear.allocate(Layout::new::<u8>())?;
  let word = linear.emplace(0x1122_3344_5566_7788_u64)?;
  println!("\n[5] byte at {first:?}, word at {word:?}, used = {}", linear.used());
  linear.deallocate(first)?;
  println!("[5] after freeing the byte: used = {}", linear.used());
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 6) A typed adapter over a pool that grows one chunk at a time.
  // --------------------------------------------------------------------
  let numbers: Adapter<u64, _> = Adapter::new(Pool::new(4).with_growth(32, SegmentChunk::new));
  let values: Vec<_> = (0..10_u64)
    .map(|i| numbers.emplace(i * i))
    .collect::<Result<_, _>>()?;
  println!("\n[6] 10 values over {} chunks", numbers.shared().borrow().len());

  for ptr in values {
    // SAFETY: every pointer came from `emplace` above and is destroyed once.
    unsafe { numbers.destroy(ptr)? };
  }
  println!("[6] all values destroyed");

  println!("\n[7] End of walkthrough. Regions are unmapped on drop.");
  Ok(())
}
