//! Search descent: root-to-leaf routing shared by insert and scan
//! positioning.
//!
//! Mirrors `operations::key_ops::search_btree`'s pin -> parse-tag -> route ->
//! unpin -> recurse loop, adapted to this format's tag bytes (`'o'`/`'l'`
//! leaf, `'r'`/`'n'` internal) instead of Btrieve's.

use crate::error::IndexResult;
use crate::node::{self, is_leaf_tag, node_tag, InternalNode};
use crate::registry::FileSlot;

/// Descend from `start` to the leaf page that would contain `key`.
pub fn descend(slot: &mut FileSlot, handle: i32, start: u32, key: &[u8]) -> IndexResult<u32> {
    let mut page_id = start;
    loop {
        let page = slot.get_block(handle, page_id)?;
        let tag = node_tag(&page)?;
        if is_leaf_tag(tag) {
            slot.unpin(handle, &page, false)?;
            return Ok(page_id);
        }
        if !node::is_internal_tag(tag) {
            tracing::error!(handle, page_id, tag, "unrecognized node tag");
            return Err(node::fatal_tag_error(tag));
        }
        let internal = InternalNode::decode(&page, &slot.key)?;
        slot.unpin(handle, &page, false)?;
        page_id = internal.route(key, &slot.key);
    }
}

/// Descend to the leftmost leaf (always follow child 0), used to position
/// scans whose matching region starts at the smallest key (not-equal,
/// less-than, less-or-equal).
pub fn leftmost_leaf(slot: &mut FileSlot, handle: i32, start: u32) -> IndexResult<u32> {
    let mut page_id = start;
    loop {
        let page = slot.get_block(handle, page_id)?;
        let tag = node_tag(&page)?;
        if is_leaf_tag(tag) {
            slot.unpin(handle, &page, false)?;
            return Ok(page_id);
        }
        if !node::is_internal_tag(tag) {
            tracing::error!(handle, page_id, tag, "unrecognized node tag");
            return Err(node::fatal_tag_error(tag));
        }
        let internal = InternalNode::decode(&page, &slot.key)?;
        slot.unpin(handle, &page, false)?;
        page_id = internal.children[0];
    }
}

// Exercised end-to-end (including the leaf/root-split cases descent must
// route around correctly) by the scenarios in `tests/scenarios.rs`, which
// drive this through the public `lib.rs` API against a real file. A
// `FileSlot` can't be built without a registered, open index file, so
// there is nothing informative to unit-test in isolation here.
