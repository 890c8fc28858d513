//! Open-file and open-scan registries: the two process-wide, fixed-size
//! tables backing the public API. A file slot also wraps the "buffer layer"
//! operations (`get_block`/`allocate_block`/`unpin`/`block_counter`), since
//! its shape (`path`, page-file descriptor, root page id, key/payload
//! descriptors) is exactly what pinning and unpinning pages needs; we hang
//! pin/unpin directly off the slot rather than inventing a separate
//! buffer-layer type with no distinct state of its own.
//!
//! Mirrors `file_manager::open_files::OpenFileTable` (path-keyed,
//! ref-counted `HashMap`), reshaped into a fixed slot array addressed by
//! handle = index (a fixed-size table of `MAX_OPEN_FILES` = 20 slots), and
//! `file_manager::cursor::Cursor` for the scan slot's position fields,
//! dropping the wire-format `PositionBlock` half (no gRPC layer here).

use crate::cache::PAGE_CACHE;
use crate::error::{IndexError, IndexResult, StatusCode};
use crate::header::Header;
use crate::key::{CompareOp, KeyDescriptor};
use crate::page::{Page, PageIO};
use parking_lot::Mutex;
use std::path::PathBuf;

pub const MAX_OPEN_FILES: usize = 20;
pub const MAX_OPEN_SCANS: usize = 20;

/// One open index file: its page I/O, and the header fields the rest of
/// the library consults on every call (root id, descriptors, page size).
pub struct FileSlot {
    pub path: PathBuf,
    io: PageIO,
    pub root_page_id: u32,
    pub key: KeyDescriptor,
    pub payload: KeyDescriptor,
    pub page_size: u16,
}

impl FileSlot {
    /// Pin a page: serve from the cache if present, else read through.
    pub fn get_block(&mut self, handle: i32, page_id: u32) -> IndexResult<Page> {
        if let Some(data) = PAGE_CACHE.get(handle, page_id) {
            return Ok(Page::from_data(page_id, data));
        }
        let page = self.io.read_page(page_id)?;
        PAGE_CACHE.put(handle, &page);
        tracing::debug!(handle, page_id, "pinned page");
        Ok(page)
    }

    /// Allocate a fresh page, appended to the file.
    pub fn allocate_block(&mut self, handle: i32) -> IndexResult<Page> {
        let page = self.io.allocate_page()?;
        tracing::debug!(handle, page_id = page.page_id, "allocated page");
        Ok(page)
    }

    /// Unpin a page. `dirty` pages are written through immediately, following
    /// a pin -> compute -> write -> mark-dirty-if-mutated -> unpin discipline,
    /// so the buffer layer has no deferred flush to get wrong.
    pub fn unpin(&mut self, handle: i32, page: &Page, dirty: bool) -> IndexResult<()> {
        if dirty {
            self.io.write_page(page)?;
            PAGE_CACHE.put(handle, page);
        }
        tracing::debug!(handle, page_id = page.page_id, dirty, "unpinned page");
        Ok(())
    }

    pub fn block_counter(&mut self) -> IndexResult<u32> {
        self.io.page_count()
    }

    /// Persist the header page after a root-id change (initial leaf
    /// creation, or root split/promotion).
    pub fn write_header(&mut self, handle: i32) -> IndexResult<()> {
        let header = Header {
            key: self.key,
            payload: self.payload,
            root_page_id: self.root_page_id,
            page_size: self.page_size,
        };
        self.unpin(handle, &header.encode(), true)
    }
}

/// One open scan: target file, comparator, owned reference key, and cursor.
pub struct ScanSlot {
    pub file_handle: i32,
    pub op: CompareOp,
    pub ref_key: Vec<u8>,
    pub leaf_page_id: u32,
    pub cursor: usize,
    pub exhausted: bool,
}

/// The two process-wide registries, guarded by one coarse mutex rather than
/// trying to lock within the tree: there is exactly one critical section,
/// the whole public call.
pub struct Registries {
    files: [Option<FileSlot>; MAX_OPEN_FILES],
    scans: [Option<ScanSlot>; MAX_OPEN_SCANS],
    initialized: bool,
}

impl Registries {
    fn new() -> Self {
        Registries {
            files: std::array::from_fn(|_| None),
            scans: std::array::from_fn(|_| None),
            initialized: false,
        }
    }

    pub fn init(&mut self) {
        for slot in self.files.iter_mut() {
            *slot = None;
        }
        for slot in self.scans.iter_mut() {
            *slot = None;
        }
        self.initialized = true;
    }

    pub fn shutdown(&mut self) {
        self.initialized = false;
        for slot in self.files.iter_mut() {
            *slot = None;
        }
        for slot in self.scans.iter_mut() {
            *slot = None;
        }
    }

    fn require_initialized(&self) -> IndexResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(IndexError::Status(StatusCode::InitError))
        }
    }

    pub fn register_file(
        &mut self,
        path: PathBuf,
        io: PageIO,
        header: Header,
    ) -> IndexResult<i32> {
        self.require_initialized()?;
        let slot_index = self
            .files
            .iter()
            .position(|s| s.is_none())
            .ok_or(IndexError::Status(StatusCode::TooManyFiles))?;
        self.files[slot_index] = Some(FileSlot {
            path,
            io,
            root_page_id: header.root_page_id,
            key: header.key,
            payload: header.payload,
            page_size: header.page_size,
        });
        Ok(slot_index as i32)
    }

    pub fn file(&mut self, handle: i32) -> IndexResult<&mut FileSlot> {
        self.require_initialized()?;
        self.files
            .get_mut(handle as usize)
            .and_then(|s| s.as_mut())
            .ok_or(IndexError::Status(StatusCode::FileNotFound))
    }

    pub fn close_file(&mut self, handle: i32) -> IndexResult<()> {
        self.require_initialized()?;
        if self.scans.iter().flatten().any(|s| s.file_handle == handle) {
            return Err(IndexError::Status(StatusCode::ScansStillOpen));
        }
        let slot = self
            .files
            .get_mut(handle as usize)
            .ok_or(IndexError::Status(StatusCode::NotOpen))?
            .take()
            .ok_or(IndexError::Status(StatusCode::NotOpen))?;
        drop(slot);
        PAGE_CACHE.invalidate_handle(handle);
        Ok(())
    }

    /// `destroy` must not compare against uninitialized path strings, only
    /// occupied slots.
    pub fn path_is_open(&self, path: &std::path::Path) -> bool {
        self.files
            .iter()
            .flatten()
            .any(|slot| slot.path == path)
    }

    pub fn register_scan(&mut self, scan: ScanSlot) -> IndexResult<i32> {
        self.require_initialized()?;
        let slot_index = self
            .scans
            .iter()
            .position(|s| s.is_none())
            .ok_or(IndexError::Status(StatusCode::TooManyScans))?;
        self.scans[slot_index] = Some(scan);
        Ok(slot_index as i32)
    }

    pub fn scan(&mut self, handle: i32) -> IndexResult<&mut ScanSlot> {
        self.require_initialized()?;
        self.scans
            .get_mut(handle as usize)
            .and_then(|s| s.as_mut())
            .ok_or(IndexError::Status(StatusCode::InvalidScan))
    }

    pub fn close_scan(&mut self, handle: i32) -> IndexResult<()> {
        self.require_initialized()?;
        let slot = self
            .scans
            .get_mut(handle as usize)
            .ok_or(IndexError::Status(StatusCode::InvalidScan))?
            .take()
            .ok_or(IndexError::Status(StatusCode::InvalidScan))?;
        drop(slot);
        Ok(())
    }
}

lazy_static::lazy_static! {
    pub static ref REGISTRIES: Mutex<Registries> = Mutex::new(Registries::new());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_registry_refuses_work() {
        let mut r = Registries::new();
        assert!(matches!(
            r.file(0),
            Err(IndexError::Status(StatusCode::InitError))
        ));
    }

    #[test]
    fn scan_handle_out_of_range_is_invalid() {
        let mut r = Registries::new();
        r.init();
        assert!(matches!(
            r.scan(0),
            Err(IndexError::Status(StatusCode::InvalidScan))
        ));
    }

    #[test]
    fn closing_unopened_handle_is_not_open() {
        let mut r = Registries::new();
        r.init();
        assert!(matches!(
            r.close_file(0),
            Err(IndexError::Status(StatusCode::NotOpen))
        ));
    }
}
