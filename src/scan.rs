//! Scan iterator: walks the leaf sibling chain, filtering by a stored
//! comparator, resuming from exactly where the previous `next` call left
//! off.
//!
//! Mirrors the `operations::key_ops` family (`get_equal`/`get_next`/
//! `get_greater`/...), unified into one generic walk instead of nine
//! separate Btrieve ops, since every comparator here differs only in start
//! position and stop condition over the same sibling-chain walk.
//! `AM_FindNextEntry`/`AM_CloseIndexScan` were left unimplemented in
//! `original_source/AM.c`; this module is the implementation of that
//! contract.

use crate::error::IndexResult;
use crate::key::CompareOp;
use crate::node::LeafNode;
use crate::registry::FileSlot;
use crate::search::{descend, leftmost_leaf};
use std::cmp::Ordering;

/// Where a scan should pre-position, before any records are yielded.
pub fn start_position(
    slot: &mut FileSlot,
    handle: i32,
    op: CompareOp,
    ref_key: &[u8],
) -> IndexResult<(u32, usize)> {
    if slot.root_page_id == 0 {
        return Ok((0, 0));
    }
    let root = slot.root_page_id;
    let leaf = match op {
        CompareOp::NotEqual | CompareOp::LessThan | CompareOp::LessOrEqual => {
            leftmost_leaf(slot, handle, root)?
        }
        CompareOp::Equal | CompareOp::GreaterThan | CompareOp::GreaterOrEqual => {
            descend(slot, handle, root, ref_key)?
        }
    };
    Ok((leaf, 0))
}

/// `true` once the ascending key order guarantees no further record in the
/// chain can match `op`.
fn past_matching_region(op: CompareOp, ordering: Ordering) -> bool {
    matches!(
        (op, ordering),
        (CompareOp::Equal, Ordering::Greater)
            | (CompareOp::LessThan, Ordering::Greater | Ordering::Equal)
            | (CompareOp::LessOrEqual, Ordering::Greater)
    )
}

/// Advance a scan and return the next matching `(key, payload)`, or `None`
/// at end of stream. Updates `leaf_page_id`/`cursor` so the next call
/// resumes immediately after the returned record.
pub fn next_entry(
    slot: &mut FileSlot,
    handle: i32,
    op: CompareOp,
    ref_key: &[u8],
    leaf_page_id: &mut u32,
    cursor: &mut usize,
    exhausted: &mut bool,
) -> IndexResult<Option<(Vec<u8>, Vec<u8>)>> {
    if *exhausted || slot.root_page_id == 0 {
        *exhausted = true;
        return Ok(None);
    }

    let mut leaf_id = *leaf_page_id;
    let mut pos = *cursor;

    loop {
        let page = slot.get_block(handle, leaf_id)?;
        let leaf = LeafNode::decode(&page, &slot.key, &slot.payload)?;
        slot.unpin(handle, &page, false)?;

        while pos < leaf.entries.len() {
            let entry = &leaf.entries[pos];
            let ordering = slot.key.compare(&entry.key, ref_key);
            if past_matching_region(op, ordering) {
                *exhausted = true;
                return Ok(None);
            }
            pos += 1;
            if op.matches(ordering) {
                *leaf_page_id = leaf_id;
                *cursor = pos;
                return Ok(Some((entry.key.clone(), entry.payload.clone())));
            }
        }

        if leaf.next < 0 {
            *exhausted = true;
            return Ok(None);
        }
        leaf_id = leaf.next as u32;
        pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn past_matching_region_table() {
        assert!(past_matching_region(CompareOp::Equal, Ordering::Greater));
        assert!(!past_matching_region(CompareOp::Equal, Ordering::Less));
        assert!(past_matching_region(CompareOp::LessThan, Ordering::Equal));
        assert!(past_matching_region(CompareOp::LessOrEqual, Ordering::Greater));
        assert!(!past_matching_region(CompareOp::LessOrEqual, Ordering::Equal));
        assert!(!past_matching_region(CompareOp::GreaterThan, Ordering::Greater));
        assert!(!past_matching_region(CompareOp::NotEqual, Ordering::Greater));
    }
}
