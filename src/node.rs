//! Internal and leaf page codec, plus the split routines insert relies on.
//!
//! Mirrors `storage::btree::{IndexNode, split_leaf, split_internal}`, but the
//! wire layout here is this format's own, not Btrieve 5.1's, and records are
//! kept physically sorted, so the on-disk order array is always the identity
//! mapping over the sorted entries rather than a separately-maintained
//! insertion order.

use crate::error::{IndexError, IndexResult};
use crate::key::KeyDescriptor;
use crate::page::Page;
use byteorder::{ByteOrder, LittleEndian};

pub const LEAF_ROOT_TAG: u8 = b'o';
pub const LEAF_TAG: u8 = b'l';
pub const INTERNAL_ROOT_TAG: u8 = b'r';
pub const INTERNAL_TAG: u8 = b'n';

const LEAF_HEADER_LEN: usize = 1 + 4 + 4 + 4; // tag, entry_count, next, prev
const INTERNAL_HEADER_LEN: usize = 1 + 4; // tag, entry_count
const NO_SIBLING: i32 = -1;

/// Maximum fanout `M`, shared by leaf record slots and internal key slots.
pub fn max_fanout(page_size: u16, key: &KeyDescriptor, payload: &KeyDescriptor) -> usize {
    let entry_size = key.width() + payload.width() + 4;
    let mut m = (page_size as usize - LEAF_HEADER_LEN) / entry_size;
    if m % 2 == 1 {
        m -= 1;
    }
    m
}

/// Split threshold `d = M/2`.
pub fn split_threshold(page_size: u16, key: &KeyDescriptor, payload: &KeyDescriptor) -> usize {
    max_fanout(page_size, key, payload) / 2
}

fn read_tag(page: &Page) -> IndexResult<u8> {
    page.data
        .first()
        .copied()
        .ok_or_else(|| IndexError::InvalidFormat("empty page".into()))
}

/// Is this page's tag a leaf (root-leaf `'o'` or plain leaf `'l'`)?
pub fn is_leaf_tag(tag: u8) -> bool {
    tag == LEAF_ROOT_TAG || tag == LEAF_TAG
}

/// Is this page's tag an internal node (root-internal `'r'` or plain `'n'`)?
pub fn is_internal_tag(tag: u8) -> bool {
    tag == INTERNAL_ROOT_TAG || tag == INTERNAL_TAG
}

pub fn node_tag(page: &Page) -> IndexResult<u8> {
    read_tag(page)
}

#[derive(Debug, Clone)]
pub struct LeafEntry {
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
}

/// A decoded leaf page. `entries` is always kept sorted ascending by key.
#[derive(Debug, Clone)]
pub struct LeafNode {
    pub page_id: u32,
    pub is_root: bool,
    pub next: i32,
    pub prev: i32,
    pub entries: Vec<LeafEntry>,
}

impl LeafNode {
    pub fn new_root(page_id: u32) -> Self {
        LeafNode {
            page_id,
            is_root: true,
            next: NO_SIBLING,
            prev: NO_SIBLING,
            entries: Vec::new(),
        }
    }

    pub fn tag(&self) -> u8 {
        if self.is_root {
            LEAF_ROOT_TAG
        } else {
            LEAF_TAG
        }
    }

    pub fn smallest_key(&self) -> &[u8] {
        &self.entries[0].key
    }

    /// Insert `(key, payload)` keeping `entries` sorted; ties are broken by
    /// routing the new record after existing equal keys (duplicates allowed).
    pub fn insert_sorted(&mut self, key_desc: &KeyDescriptor, key: Vec<u8>, payload: Vec<u8>) {
        let pos = self
            .entries
            .iter()
            .position(|e| key_desc.compare(&key, &e.key) == std::cmp::Ordering::Less)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, LeafEntry { key, payload });
    }

    /// Split off the upper half (`entries[d..]`) into a new right sibling.
    /// Caller is responsible for relinking sibling pointers and page ids.
    pub fn split_off(&mut self, d: usize, new_page_id: u32) -> LeafNode {
        let right_entries = self.entries.split_off(d);
        LeafNode {
            page_id: new_page_id,
            is_root: false,
            next: self.next,
            prev: self.page_id as i32,
            entries: right_entries,
        }
    }

    pub fn decode(page: &Page, key: &KeyDescriptor, payload: &KeyDescriptor) -> IndexResult<Self> {
        let data = &page.data;
        let tag = read_tag(page)?;
        if !is_leaf_tag(tag) {
            return Err(IndexError::InvalidFormat(format!(
                "expected leaf tag, found {:#x}",
                tag
            )));
        }
        let entry_count = LittleEndian::read_i32(&data[1..5]) as usize;
        let next = LittleEndian::read_i32(&data[5..9]);
        let prev = LittleEndian::read_i32(&data[9..13]);

        let order_array_start = LEAF_HEADER_LEN;
        let entry_size = key.width() + payload.width();

        let mut entries = Vec::with_capacity(entry_count);
        for i in 0..entry_count {
            let order_entry_off = order_array_start + i * 4;
            let offset = LittleEndian::read_i32(&data[order_entry_off..order_entry_off + 4]);
            if offset < 0 {
                return Err(IndexError::InvalidFormat(
                    "order array entry missing for in-range slot".into(),
                ));
            }
            let rec_start = offset as usize;
            let rec_key = data[rec_start..rec_start + key.width()].to_vec();
            let rec_payload =
                data[rec_start + key.width()..rec_start + entry_size].to_vec();
            entries.push(LeafEntry {
                key: rec_key,
                payload: rec_payload,
            });
        }

        Ok(LeafNode {
            page_id: page.page_id,
            is_root: tag == LEAF_ROOT_TAG,
            next,
            prev,
            entries,
        })
    }

    pub fn encode(&self, page_size: u16, key: &KeyDescriptor, payload: &KeyDescriptor) -> Page {
        let mut data = vec![0u8; page_size as usize];
        data[0] = self.tag();
        LittleEndian::write_i32(&mut data[1..5], self.entries.len() as i32);
        LittleEndian::write_i32(&mut data[5..9], self.next);
        LittleEndian::write_i32(&mut data[9..13], self.prev);

        let m = max_fanout(page_size, key, payload);
        let order_array_start = LEAF_HEADER_LEN;
        let slots_start = order_array_start + m * 4;
        let entry_size = key.width() + payload.width();

        for i in 0..m {
            let off = order_array_start + i * 4;
            if i < self.entries.len() {
                let rec_off = (slots_start + i * entry_size) as i32;
                LittleEndian::write_i32(&mut data[off..off + 4], rec_off);
            } else {
                LittleEndian::write_i32(&mut data[off..off + 4], NO_SIBLING);
            }
        }

        for (i, entry) in self.entries.iter().enumerate() {
            let rec_start = slots_start + i * entry_size;
            data[rec_start..rec_start + key.width()].copy_from_slice(&entry.key);
            data[rec_start + key.width()..rec_start + entry_size]
                .copy_from_slice(&entry.payload);
        }

        Page::from_data(self.page_id, data)
    }
}

/// A decoded internal page. `children.len() == keys.len() + 1`.
#[derive(Debug, Clone)]
pub struct InternalNode {
    pub page_id: u32,
    pub is_root: bool,
    pub children: Vec<u32>,
    pub keys: Vec<Vec<u8>>,
}

impl InternalNode {
    pub fn new_root(page_id: u32, left: u32, separator: Vec<u8>, right: u32) -> Self {
        InternalNode {
            page_id,
            is_root: true,
            children: vec![left, right],
            keys: vec![separator],
        }
    }

    pub fn tag(&self) -> u8 {
        if self.is_root {
            INTERNAL_ROOT_TAG
        } else {
            INTERNAL_TAG
        }
    }

    /// Route `key` to the child that contains it: strict `<` on the left of
    /// a separator, `>=` on the right.
    pub fn route(&self, key: &[u8], key_desc: &KeyDescriptor) -> u32 {
        for (i, sep) in self.keys.iter().enumerate() {
            if key_desc.compare(key, sep) == std::cmp::Ordering::Less {
                return self.children[i];
            }
        }
        *self.children.last().unwrap()
    }

    /// Insert position for a new separator, matching `route`'s boundaries.
    fn insertion_index(&self, key: &[u8], key_desc: &KeyDescriptor) -> usize {
        self.keys
            .iter()
            .position(|k| key_desc.compare(key, k) == std::cmp::Ordering::Less)
            .unwrap_or(self.keys.len())
    }

    pub fn insert_separator(&mut self, key_desc: &KeyDescriptor, key: Vec<u8>, child: u32) {
        let pos = self.insertion_index(&key, key_desc);
        self.keys.insert(pos, key);
        self.children.insert(pos + 1, child);
    }

    /// Split off the upper half: this node keeps the first `d` keys and
    /// `d+1` children; the returned node takes the last `d` keys and `d+1`
    /// children; the middle key is promoted (not duplicated into either side).
    pub fn split_off(&mut self, d: usize, new_page_id: u32) -> (Vec<u8>, InternalNode) {
        let promoted = self.keys[d].clone();
        let right_keys = self.keys.split_off(d + 1);
        self.keys.truncate(d);
        let right_children = self.children.split_off(d + 1);

        let right = InternalNode {
            page_id: new_page_id,
            is_root: false,
            children: right_children,
            keys: right_keys,
        };
        (promoted, right)
    }

    pub fn decode(page: &Page, key: &KeyDescriptor) -> IndexResult<Self> {
        let data = &page.data;
        let tag = read_tag(page)?;
        if is_leaf_tag(tag) {
            return Err(IndexError::InvalidFormat(format!(
                "expected internal tag, found {:#x}",
                tag
            )));
        }
        let entry_count = LittleEndian::read_i32(&data[1..5]) as usize;

        let mut pos = INTERNAL_HEADER_LEN;
        let mut children = Vec::with_capacity(entry_count + 1);
        let mut keys = Vec::with_capacity(entry_count);
        children.push(LittleEndian::read_u32(&data[pos..pos + 4]));
        pos += 4;
        for _ in 0..entry_count {
            keys.push(data[pos..pos + key.width()].to_vec());
            pos += key.width();
            children.push(LittleEndian::read_u32(&data[pos..pos + 4]));
            pos += 4;
        }

        Ok(InternalNode {
            page_id: page.page_id,
            is_root: tag == INTERNAL_ROOT_TAG,
            children,
            keys,
        })
    }

    pub fn encode(&self, page_size: u16, key: &KeyDescriptor) -> Page {
        let mut data = vec![0u8; page_size as usize];
        data[0] = self.tag();
        LittleEndian::write_i32(&mut data[1..5], self.keys.len() as i32);

        let mut pos = INTERNAL_HEADER_LEN;
        LittleEndian::write_u32(&mut data[pos..pos + 4], self.children[0]);
        pos += 4;
        for (i, k) in self.keys.iter().enumerate() {
            data[pos..pos + key.width()].copy_from_slice(k);
            pos += key.width();
            LittleEndian::write_u32(&mut data[pos..pos + 4], self.children[i + 1]);
            pos += 4;
        }

        Page::from_data(self.page_id, data)
    }
}

pub(crate) fn fatal_tag_error(tag: u8) -> IndexError {
    IndexError::InvalidFormat(format!("unrecognized node tag {:#x}", tag))
}
