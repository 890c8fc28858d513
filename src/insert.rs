//! Recursive insert: the central algorithm. Descends to a leaf, inserts in
//! sorted order, splits on overflow, and bubbles a *separator entry* back up
//! to the caller instead of through an out-parameter.
//!
//! Mirrors `storage::btree`'s split helpers and
//! `original_source/AM.c::insertEntry`'s control flow, with that function's
//! out-parameter bug replaced by an explicit `Option<SeparatorEntry>` return
//! threaded through every recursion level.

use crate::error::IndexResult;
use crate::node::{self, node_tag, InternalNode, LeafNode};
use crate::registry::FileSlot;
use std::cmp::Ordering;

/// A separator promoted up one level after a split: `(key, new_sibling)`.
pub struct SeparatorEntry {
    pub key: Vec<u8>,
    pub child: u32,
}

/// Entry point. Creates the first leaf if the tree is empty, otherwise
/// recurses from the root and promotes a new root if the root itself split.
pub fn insert_entry(
    slot: &mut FileSlot,
    handle: i32,
    key: Vec<u8>,
    payload: Vec<u8>,
) -> IndexResult<()> {
    if slot.root_page_id == 0 {
        let page = slot.allocate_block(handle)?;
        let mut leaf = LeafNode::new_root(page.page_id);
        leaf.insert_sorted(&slot.key, key, payload);
        let encoded = leaf.encode(slot.page_size, &slot.key, &slot.payload);
        slot.root_page_id = encoded.page_id;
        slot.unpin(handle, &encoded, true)?;
        slot.write_header(handle)?;
        tracing::info!(handle, root = slot.root_page_id, "created first leaf");
        return Ok(());
    }

    let root = slot.root_page_id;
    if let Some(sep) = insert_rec(slot, handle, root, key, payload)? {
        let page = slot.allocate_block(handle)?;
        let new_root = InternalNode::new_root(page.page_id, root, sep.key, sep.child);
        let encoded = new_root.encode(slot.page_size, &slot.key);
        slot.root_page_id = encoded.page_id;
        slot.unpin(handle, &encoded, true)?;
        slot.write_header(handle)?;
        tracing::info!(handle, new_root = slot.root_page_id, "promoted root");
    }
    Ok(())
}

fn insert_rec(
    slot: &mut FileSlot,
    handle: i32,
    node_id: u32,
    key: Vec<u8>,
    payload: Vec<u8>,
) -> IndexResult<Option<SeparatorEntry>> {
    let page = slot.get_block(handle, node_id)?;
    let tag = node_tag(&page)?;

    if node::is_leaf_tag(tag) {
        let mut leaf = LeafNode::decode(&page, &slot.key, &slot.payload)?;
        let m = node::max_fanout(slot.page_size, &slot.key, &slot.payload);

        if leaf.entries.len() < m {
            leaf.insert_sorted(&slot.key, key, payload);
            let encoded = leaf.encode(slot.page_size, &slot.key, &slot.payload);
            slot.unpin(handle, &encoded, true)?;
            return Ok(None);
        }

        // Leaf is full: split the existing M records first, then insert
        // the new record into whichever side it belongs.
        let d = node::split_threshold(slot.page_size, &slot.key, &slot.payload);
        let new_page = slot.allocate_block(handle)?;
        let mut right = leaf.split_off(d, new_page.page_id);
        let old_next = leaf.next;
        leaf.next = right.page_id as i32;
        leaf.is_root = false;

        if old_next >= 0 {
            let next_page = slot.get_block(handle, old_next as u32)?;
            let mut next_leaf = LeafNode::decode(&next_page, &slot.key, &slot.payload)?;
            next_leaf.prev = right.page_id as i32;
            let encoded = next_leaf.encode(slot.page_size, &slot.key, &slot.payload);
            slot.unpin(handle, &encoded, true)?;
        }

        if slot.key.compare(&key, right.smallest_key()) == Ordering::Less {
            leaf.insert_sorted(&slot.key, key, payload);
        } else {
            right.insert_sorted(&slot.key, key, payload);
        }

        let separator = SeparatorEntry {
            key: right.smallest_key().to_vec(),
            child: right.page_id,
        };
        let left_encoded = leaf.encode(slot.page_size, &slot.key, &slot.payload);
        let right_encoded = right.encode(slot.page_size, &slot.key, &slot.payload);
        slot.unpin(handle, &left_encoded, true)?;
        slot.unpin(handle, &right_encoded, true)?;
        tracing::info!(handle, left = node_id, right = separator.child, "split leaf");
        return Ok(Some(separator));
    }

    if !node::is_internal_tag(tag) {
        tracing::error!(handle, node_id, tag, "unrecognized node tag");
        return Err(node::fatal_tag_error(tag));
    }

    // Internal node: route to the child, recurse, then install whatever
    // separator (if any) comes back.
    let mut internal = InternalNode::decode(&page, &slot.key)?;
    let child = internal.route(&key, &slot.key);
    let child_sep = insert_rec(slot, handle, child, key, payload)?;

    let Some(child_sep) = child_sep else {
        slot.unpin(handle, &page, false)?;
        return Ok(None);
    };

    let m = node::max_fanout(slot.page_size, &slot.key, &slot.payload);
    if internal.keys.len() < m {
        internal.insert_separator(&slot.key, child_sep.key, child_sep.child);
        let encoded = internal.encode(slot.page_size, &slot.key);
        slot.unpin(handle, &encoded, true)?;
        return Ok(None);
    }

    // No room: insert the separator (temporarily overflowing to M+1 keys
    // in memory, never written to disk in that shape) and split at the
    // median. Because the node is kept sorted, this lands the separator
    // on whichever side it belongs, equivalent to comparing it against the
    // new sibling's smallest key and choosing explicitly.
    internal.insert_separator(&slot.key, child_sep.key, child_sep.child);
    let d = node::split_threshold(slot.page_size, &slot.key, &slot.payload);
    let new_page = slot.allocate_block(handle)?;
    let (promoted, mut right) = internal.split_off(d, new_page.page_id);
    internal.is_root = false;
    right.is_root = false;

    let left_encoded = internal.encode(slot.page_size, &slot.key);
    let right_encoded = right.encode(slot.page_size, &slot.key);
    slot.unpin(handle, &left_encoded, true)?;
    slot.unpin(handle, &right_encoded, true)?;
    tracing::info!(handle, left = node_id, right = right.page_id, "split internal node");

    Ok(Some(SeparatorEntry {
        key: promoted,
        child: right.page_id,
    }))
}
