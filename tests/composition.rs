use std::{cell::RefCell, ptr::NonNull, rc::Rc};

use arenalloc::{
  Adapter, AllocError, BlockAllocator, Config, Pool, RawAllocator, Registry, SegmentChunk,
};

struct ListNode {
  value: u64,
  next: Option<NonNull<ListNode>>,
}

#[test]
fn linked_list_over_growing_segment_pool() {
  let pool = Pool::new(4).with_growth(64, SegmentChunk::new);
  let nodes: Adapter<ListNode, _> = Adapter::new(pool);

  let mut head: Option<NonNull<ListNode>> = None;
  for value in 0..10 {
    head = Some(nodes.emplace(ListNode { value, next: head }).unwrap());
  }

  // 16-byte nodes, four per chunk.
  assert_eq!(nodes.shared().borrow().len(), 3);

  let mut sum = 0;
  let mut cursor = head;
  while let Some(node) = cursor {
    let node_ref = unsafe { node.as_ref() };
    sum += node_ref.value;
    cursor = node_ref.next;
    unsafe { nodes.destroy(node).unwrap() };
  }

  assert_eq!(sum, 45);
  assert!(
    nodes
      .shared()
      .borrow()
      .instances()
      .iter()
      .all(|chunk| chunk.free_bytes() == chunk.memory_size())
  );
}

#[test]
fn registry_ids_are_independent() {
  let mut registry: Registry<BlockAllocator> = Registry::new();
  registry.get_or_insert_with(1, || BlockAllocator::new(64, 8)).unwrap();
  registry.get_or_insert_with(2, || BlockAllocator::new(64, 8)).unwrap();

  let ones: Adapter<u64, _> = registry.adapter(1).unwrap();
  let twos: Adapter<u64, _> = registry.adapter(2).unwrap();
  let bytes = ones.rebind::<[u8; 8]>();

  assert_ne!(ones, twos);
  assert_eq!(ones, bytes);

  let a = ones.allocate(8).unwrap();
  assert_eq!(ones.allocate(1), Err(AllocError::OutOfMemory { requested: 8 }));

  let b = twos.allocate(8).unwrap();
  assert_ne!(a, b);

  ones.deallocate(a, 8).unwrap();
  assert_eq!(twos.deallocate(a, 8), Err(AllocError::NotOwned));
  twos.deallocate(b, 8).unwrap();
}

#[test]
fn destroy_zeroes_before_release() {
  let shared = Rc::new(RefCell::new(BlockAllocator::new(64, 4).unwrap()));
  let strings: Adapter<String, _> = Adapter::from_shared(Rc::clone(&shared));

  let ptr = strings.emplace(String::from("arena")).unwrap();
  assert_eq!(unsafe { ptr.as_ref() }, "arena");

  unsafe { strings.destroy(ptr).unwrap() };

  let raw = ptr.cast::<u8>();
  let bytes = unsafe { std::slice::from_raw_parts(raw.as_ptr(), size_of::<String>()) };
  assert!(bytes.iter().all(|&b| b == 0));
  assert_eq!(shared.borrow().free_bytes(), 64);
}

#[test]
fn pool_routes_raw_frees() {
  let mut pool: Pool<BlockAllocator> = Pool::new(2);
  pool.add_arena(16, 2).unwrap();
  pool.add_arena(16, 2).unwrap();

  let a = pool.allocate_bytes(16).unwrap();
  let b = pool.allocate_bytes(16).unwrap();
  assert!(pool.allocate_bytes(1).is_err());
  assert_eq!(pool.add_arena(16, 2), Err(AllocError::PoolFull { max: 2 }));

  pool.deallocate_bytes(b, 16).unwrap();
  pool.deallocate_bytes(a, 16).unwrap();
  assert!(pool.instances().iter().all(|arena| arena.free_bytes() == 16));
}

#[test]
fn configured_allocators() {
  let config = Config::from_toml(
    r#"
      [block]
      memory_size = 256
      max_block_count = 8

      [segments]
      chunk_size = 100
      initial_chunks = 1
      max_chunks = 2
      grow = true
    "#,
  )
  .unwrap();

  assert!(config.linear.is_none());

  let mut arena = config.block.unwrap().build().unwrap();
  assert!(arena.allocate(256).is_ok());

  let mut segments = config.segments.unwrap().build().unwrap();
  assert_eq!(segments.instances()[0].memory_size(), 128);

  segments.allocate(128).unwrap();
  segments.allocate(128).unwrap();
  assert_eq!(segments.len(), 2);
  assert!(matches!(
    segments.allocate(4),
    Err(AllocError::OutOfMemory { .. })
  ));
}
