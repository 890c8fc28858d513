//! End-to-end scenarios against a real temporary index file, exercising
//! the public lifecycle API the way an embedding application would.
//! `M = 4` (page size 64, two 4-byte integer columns) forces the splits
//! and root promotions the unit tests in `src/lib.rs` don't need to hit.

use bptrieve::node::{self, InternalNode, LeafNode};
use bptrieve::registry::REGISTRIES;
use bptrieve::{
    close, close_scan, create, destroy, init, insert_entry, next_entry, open, open_scan,
    shutdown, CompareOp, IndexConfig, IndexError, KeyDescriptor, KeyKind, StatusCode,
};
use std::sync::Mutex as StdMutex;
use tempfile::tempdir;

// The registries are process-wide singletons shared by every test binary
// run in this process; serialize access so tests don't stomp on each
// other's handles.
static TEST_LOCK: StdMutex<()> = StdMutex::new(());

const SMALL_PAGE: u16 = 64; // yields M = 4, d = 2 for int/int columns

fn small_config() -> IndexConfig {
    let key = KeyDescriptor::new(KeyKind::Integer32, 4).unwrap();
    let payload = KeyDescriptor::new(KeyKind::Integer32, 4).unwrap();
    IndexConfig::new(key, payload).with_page_size(SMALL_PAGE)
}

fn kb(v: i32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

fn drain_scan(scan: i32) -> Vec<i32> {
    let mut out = Vec::new();
    while let Some(payload) = next_entry(scan).unwrap() {
        out.push(i32::from_le_bytes(payload.try_into().unwrap()));
    }
    out
}

/// Read back the root's tag + key count, for assertions that need to
/// inspect tree shape directly rather than just scan results.
fn root_shape(handle: i32) -> (u8, usize) {
    let mut registries = REGISTRIES.lock();
    let slot = registries.file(handle).unwrap();
    let root = slot.root_page_id;
    let page = slot.get_block(handle, root).unwrap();
    let tag = node::node_tag(&page).unwrap();
    slot.unpin(handle, &page, false).unwrap();
    if node::is_leaf_tag(tag) {
        let leaf = LeafNode::decode(&page, &slot.key, &slot.payload).unwrap();
        (tag, leaf.entries.len())
    } else {
        let internal = InternalNode::decode(&page, &slot.key).unwrap();
        (tag, internal.keys.len())
    }
}

/// Walk the whole leaf chain left to right via the registry directly,
/// for invariant checks that don't fit the scan API (balance, per-leaf
/// entry counts).
fn leaf_chain(handle: i32) -> Vec<LeafNode> {
    let mut registries = REGISTRIES.lock();
    let slot = registries.file(handle).unwrap();
    let root = slot.root_page_id;

    let mut page_id = root;
    loop {
        let page = slot.get_block(handle, page_id).unwrap();
        let tag = node::node_tag(&page).unwrap();
        if node::is_leaf_tag(tag) {
            slot.unpin(handle, &page, false).unwrap();
            break;
        }
        let internal = InternalNode::decode(&page, &slot.key).unwrap();
        slot.unpin(handle, &page, false).unwrap();
        page_id = internal.children[0];
    }

    let mut leaves = Vec::new();
    loop {
        let page = slot.get_block(handle, page_id).unwrap();
        let leaf = LeafNode::decode(&page, &slot.key, &slot.payload).unwrap();
        slot.unpin(handle, &page, false).unwrap();
        let next = leaf.next;
        leaves.push(leaf);
        if next < 0 {
            break;
        }
        page_id = next as u32;
    }
    leaves
}

#[test]
fn fifth_insert_splits_the_root_leaf() {
    let _guard = TEST_LOCK.lock().unwrap();
    init();
    let dir = tempdir().unwrap();
    let path = dir.path().join("root_leaf_split.idx");
    create(&path, small_config()).unwrap();
    let h = open(&path).unwrap();

    for (k, v) in [(1, 10), (2, 20), (3, 30), (4, 40)] {
        insert_entry(h, &kb(k), &kb(v)).unwrap();
    }
    assert_eq!(root_shape(h).0, b'o', "root is still the single leaf");

    insert_entry(h, &kb(5), &kb(50)).unwrap();

    let (tag, keys) = root_shape(h);
    assert_eq!(tag, b'r', "root promoted to an internal node");
    assert_eq!(keys, 1, "exactly one separator after the first split");

    let leaves = leaf_chain(h);
    assert_eq!(leaves.len(), 2);
    let left_keys: Vec<i32> = leaves[0]
        .entries
        .iter()
        .map(|e| i32::from_le_bytes(e.key.clone().try_into().unwrap()))
        .collect();
    let right_keys: Vec<i32> = leaves[1]
        .entries
        .iter()
        .map(|e| i32::from_le_bytes(e.key.clone().try_into().unwrap()))
        .collect();
    assert_eq!(left_keys, vec![1, 2]);
    assert_eq!(right_keys, vec![3, 4, 5]);

    let scan = open_scan(h, CompareOp::GreaterThan, &kb(0)).unwrap();
    assert_eq!(drain_scan(scan), vec![10, 20, 30, 40, 50]);
    close_scan(scan).unwrap();

    close(h).unwrap();
    shutdown();
}

#[test]
fn enough_inserts_force_a_root_split() {
    let _guard = TEST_LOCK.lock().unwrap();
    init();
    let dir = tempdir().unwrap();
    let path = dir.path().join("many_inserts.idx");
    create(&path, small_config()).unwrap();
    let h = open(&path).unwrap();

    let n = 40; // well past M*M = 16, forces at least one root split
    for k in 1..=n {
        insert_entry(h, &kb(k), &kb(k * 10)).unwrap();
    }

    let (tag, _) = root_shape(h);
    assert_eq!(tag, b'r', "root is internal after enough inserts");

    let leaves = leaf_chain(h);
    let total: usize = leaves.iter().map(|l| l.entries.len()).sum();
    assert_eq!(total, n as usize, "no records lost across splits");

    // Every non-rightmost leaf holds between d and M entries; the
    // rightmost leaf (still receiving ascending inserts) may be partial.
    let (last, rest) = leaves.split_last().unwrap();
    for leaf in rest {
        assert!(
            (2..=4).contains(&leaf.entries.len()),
            "leaf has {} entries",
            leaf.entries.len()
        );
    }
    assert!(!last.entries.is_empty());

    // Ordered leaves: keys strictly increase across the whole chain.
    let mut previous = None;
    for leaf in &leaves {
        for entry in &leaf.entries {
            let k = i32::from_le_bytes(entry.key.clone().try_into().unwrap());
            if let Some(p) = previous {
                assert!(p < k, "leaf chain out of order: {} before {}", p, k);
            }
            previous = Some(k);
        }
    }

    close(h).unwrap();
    shutdown();
}

#[test]
fn two_independent_concurrent_scans() {
    let _guard = TEST_LOCK.lock().unwrap();
    init();
    let dir = tempdir().unwrap();
    let path = dir.path().join("concurrent_scans.idx");
    create(&path, small_config()).unwrap();
    let h = open(&path).unwrap();

    for k in 1..=10 {
        insert_entry(h, &kb(k), &kb(k * 100)).unwrap();
    }

    let scan_a = open_scan(h, CompareOp::NotEqual, &kb(3)).unwrap();
    let scan_b = open_scan(h, CompareOp::NotEqual, &kb(7)).unwrap();

    let mut a_out = Vec::new();
    let mut b_out = Vec::new();
    loop {
        let a = next_entry(scan_a).unwrap();
        let b = next_entry(scan_b).unwrap();
        if a.is_none() && b.is_none() {
            break;
        }
        if let Some(p) = a {
            a_out.push(i32::from_le_bytes(p.try_into().unwrap()));
        }
        if let Some(p) = b {
            b_out.push(i32::from_le_bytes(p.try_into().unwrap()));
        }
    }

    let expected_a: Vec<i32> = (1..=10).filter(|&k| k != 3).map(|k| k * 100).collect();
    let expected_b: Vec<i32> = (1..=10).filter(|&k| k != 7).map(|k| k * 100).collect();
    assert_eq!(a_out, expected_a);
    assert_eq!(b_out, expected_b);

    close_scan(scan_a).unwrap();
    close_scan(scan_b).unwrap();
    close(h).unwrap();
    shutdown();
}

#[test]
fn destroy_then_recreate() {
    let _guard = TEST_LOCK.lock().unwrap();
    init();
    let dir = tempdir().unwrap();
    let path = dir.path().join("destroy_recreate.idx");
    create(&path, small_config()).unwrap();
    let h = open(&path).unwrap();

    assert!(matches!(
        destroy(&path),
        Err(IndexError::Status(StatusCode::DestroyStillOpen))
    ));

    close(h).unwrap();
    destroy(&path).unwrap();
    assert!(!path.exists());

    create(&path, small_config()).unwrap();
    let h2 = open(&path).unwrap();
    insert_entry(h2, &kb(1), &kb(1)).unwrap();
    close(h2).unwrap();
    shutdown();
}

#[test]
fn routing_invariant_holds_after_many_splits() {
    let _guard = TEST_LOCK.lock().unwrap();
    init();
    let dir = tempdir().unwrap();
    let path = dir.path().join("routing.idx");
    create(&path, small_config()).unwrap();
    let h = open(&path).unwrap();

    // Insert out of order to exercise routing through more than one
    // internal level.
    let keys = [
        50, 10, 90, 30, 70, 20, 60, 80, 40, 5, 15, 25, 35, 45, 55, 65, 75, 85, 95, 100,
    ];
    for &k in &keys {
        insert_entry(h, &kb(k), &kb(k)).unwrap();
    }

    let scan = open_scan(h, CompareOp::GreaterOrEqual, &kb(i32::MIN)).unwrap();
    let out = drain_scan(scan);
    close_scan(scan).unwrap();

    let mut expected: Vec<i32> = keys.to_vec();
    expected.sort_unstable();
    assert_eq!(out, expected);

    close(h).unwrap();
    shutdown();
}
