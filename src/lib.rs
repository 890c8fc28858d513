//! A disk-resident B+ tree index library storing two-column records
//! `(key, payload)` keyed by the first column, over a paginated on-disk
//! layout managed through a buffered page cache. Callers maintain many
//! concurrent indexes over the same process via small integer handles.
//!
//! The public surface is the lifecycle API in this module:
//! [`init`], [`create`], [`open`], [`close`], [`destroy`],
//! [`insert_entry`], [`open_scan`], [`next_entry`], [`close_scan`],
//! [`shutdown`]. Everything else (`page`, `header`, `node`, `cache`,
//! `registry`, `search`, `insert`, `scan`) is internal plumbing.
//!
//! Mirrors `operations::dispatcher::Engine`, which coordinates the
//! open-file/page-cache layer behind a small set of methods, flattened here
//! to a direct-call surface (no request/response envelope, since that
//! existed only to serve the dropped gRPC daemon; see DESIGN.md).

pub mod cache;
pub mod error;
pub mod header;
pub mod insert;
pub mod key;
pub mod node;
pub mod page;
pub mod registry;
pub mod scan;
pub mod search;

pub use error::{last_error, IndexError, IndexResult, StatusCode};
pub use key::{CompareOp, KeyDescriptor, KeyKind};

use error::track;
use header::Header;
use page::PageIO;
use registry::{ScanSlot, REGISTRIES};
use std::fs::OpenOptions;
use std::path::Path;

/// Index creation parameters. Validated once, in
/// [`KeyDescriptor::validate`], rather than re-checked at every call site.
#[derive(Debug, Clone, Copy)]
pub struct IndexConfig {
    pub key: KeyDescriptor,
    pub payload: KeyDescriptor,
    pub page_size: u16,
}

/// Historical Btrieve-era minimum page size; also the small page used by
/// the `M = 4` split-forcing test scenarios.
pub const MIN_PAGE_SIZE: u16 = 512;
pub const DEFAULT_PAGE_SIZE: u16 = 4096;

impl IndexConfig {
    pub fn new(key: KeyDescriptor, payload: KeyDescriptor) -> Self {
        IndexConfig {
            key,
            payload,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u16) -> Self {
        self.page_size = page_size;
        self
    }
}

/// Initialize the buffer layer (replacement policy fixed to LRU) and clear
/// both registries. Must be called before any other operation.
pub fn init() {
    let _span = tracing::info_span!("init").entered();
    REGISTRIES.lock().init();
}

/// Finalize the buffer layer and clear both registries. After this call,
/// every other operation fails with [`StatusCode::InitError`] until
/// `init()` runs again.
pub fn shutdown() {
    let _span = tracing::info_span!("shutdown").entered();
    REGISTRIES.lock().shutdown();
}

/// Create a new, empty index file: validate the descriptors, write page 0,
/// and close. The tree is empty on disk (root page id 0, no data pages).
pub fn create(path: impl AsRef<Path>, config: IndexConfig) -> IndexResult<()> {
    let path = path.as_ref();
    let _span = tracing::info_span!("create", path = %path.display()).entered();
    track(create_inner(path, config))
}

fn create_inner(path: &Path, config: IndexConfig) -> IndexResult<()> {
    config.key.validate()?;
    config.payload.validate()?;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                IndexError::Status(StatusCode::CreateError)
            } else {
                IndexError::Io(e)
            }
        })?;

    let mut io = PageIO::new(file, config.page_size);
    let header = Header::new(config.key, config.payload, config.page_size);
    io.write_page(&header.encode())?;
    io.sync()?;
    tracing::info!(page_size = config.page_size, "created empty index");
    Ok(())
}

/// Remove an index file from storage. Fails if any open handle still
/// references `path`.
pub fn destroy(path: impl AsRef<Path>) -> IndexResult<()> {
    let path = path.as_ref();
    let _span = tracing::info_span!("destroy", path = %path.display()).entered();
    track(destroy_inner(path))
}

fn destroy_inner(path: &Path) -> IndexResult<()> {
    let registries = REGISTRIES.lock();
    if registries.path_is_open(path) {
        return Err(IndexError::Status(StatusCode::DestroyStillOpen));
    }
    drop(registries);
    std::fs::remove_file(path).map_err(|_| IndexError::Status(StatusCode::RemoveError))?;
    tracing::info!("destroyed index");
    Ok(())
}

/// Open an index file, returning a nonnegative handle identifying it for
/// every subsequent call.
pub fn open(path: impl AsRef<Path>) -> IndexResult<i32> {
    let path = path.as_ref();
    let _span = tracing::info_span!("open", path = %path.display()).entered();
    track(open_inner(path))
}

fn open_inner(path: &Path) -> IndexResult<i32> {
    use std::io::Read;

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IndexError::Status(StatusCode::OpenError)
            } else {
                IndexError::Io(e)
            }
        })?;

    // Page size isn't one of the six canonical header fields, so a raw read
    // of just the fixed-length header prefix recovers it before we know how
    // large a page to read.
    let mut prefix = vec![0u8; Header::ENCODED_LEN];
    file.read_exact(&mut prefix)
        .map_err(|_| IndexError::Status(StatusCode::OpenError))?;
    let page_size = Header::decode_page_size(&prefix)?;

    let mut io = PageIO::new(file, page_size);
    let page0 = io.read_page(0)?;
    let header = Header::decode(&page0)?;

    let handle = REGISTRIES
        .lock()
        .register_file(path.to_path_buf(), io, header)?;
    tracing::info!(handle, root = header.root_page_id, "opened index");
    Ok(handle)
}

/// Close a previously opened handle. Fails while any scan still
/// references it.
pub fn close(handle: i32) -> IndexResult<()> {
    let _span = tracing::info_span!("close", handle).entered();
    track(REGISTRIES.lock().close_file(handle))
}

/// Insert `(key, payload)` into the index identified by `handle`.
pub fn insert_entry(handle: i32, key: &[u8], payload: &[u8]) -> IndexResult<()> {
    let _span = tracing::info_span!("insert_entry", handle).entered();
    track(insert_inner(handle, key, payload))
}

fn insert_inner(handle: i32, key: &[u8], payload: &[u8]) -> IndexResult<()> {
    let mut registries = REGISTRIES.lock();
    let slot = registries.file(handle)?;
    let key_buf = slot.key.pad(key);
    let payload_buf = slot.payload.pad(payload);
    insert::insert_entry(slot, handle, key_buf, payload_buf).map_err(matches_insert_error)
}

/// Wrap any failure from inside `insert_entry` as a single `insert-error`
/// status: any failure partway through is fatal to the operation and
/// surfaces as an insert error.
fn matches_insert_error(err: IndexError) -> IndexError {
    match err {
        IndexError::Status(StatusCode::TypeError) => err,
        _ => IndexError::Status(StatusCode::InsertError),
    }
}

/// Open a scan over `handle`'s index: comparator `op` against `ref_key`.
/// Pre-positions at the leaf the first matching record would occupy.
pub fn open_scan(handle: i32, op: CompareOp, ref_key: &[u8]) -> IndexResult<i32> {
    let _span = tracing::info_span!("open_scan", handle).entered();
    track(open_scan_inner(handle, op, ref_key))
}

fn open_scan_inner(handle: i32, op: CompareOp, ref_key: &[u8]) -> IndexResult<i32> {
    let mut registries = REGISTRIES.lock();
    let slot = registries.file(handle)?;
    let ref_key = slot.key.pad(ref_key);
    let (leaf_page_id, cursor) = scan::start_position(slot, handle, op, &ref_key)?;
    registries.register_scan(ScanSlot {
        file_handle: handle,
        op,
        ref_key,
        leaf_page_id,
        cursor,
        exhausted: false,
    })
}

/// Yield the next payload matching a scan's comparator, or `None` at
/// end of stream ([`StatusCode::EndOfStream`]).
pub fn next_entry(scan_handle: i32) -> IndexResult<Option<Vec<u8>>> {
    let _span = tracing::info_span!("next_entry", scan_handle).entered();
    match next_entry_inner(scan_handle) {
        Ok(Some(payload)) => Ok(Some(payload)),
        Ok(None) => {
            error::set_last_error(StatusCode::EndOfStream);
            Ok(None)
        }
        Err(e) => track(Err(e)),
    }
}

fn next_entry_inner(scan_handle: i32) -> IndexResult<Option<Vec<u8>>> {
    let mut registries = REGISTRIES.lock();
    let scan = registries.scan(scan_handle)?;
    let file_handle = scan.file_handle;
    let op = scan.op;
    let ref_key = scan.ref_key.clone();
    let mut leaf_page_id = scan.leaf_page_id;
    let mut cursor = scan.cursor;
    let mut exhausted = scan.exhausted;

    let slot = registries.file(file_handle)?;
    let result = scan::next_entry(
        slot,
        file_handle,
        op,
        &ref_key,
        &mut leaf_page_id,
        &mut cursor,
        &mut exhausted,
    )?;

    let scan = registries.scan(scan_handle)?;
    scan.leaf_page_id = leaf_page_id;
    scan.cursor = cursor;
    scan.exhausted = exhausted;

    Ok(result.map(|(_key, payload)| payload))
}

/// Release a scan handle. Invariant: a file handle cannot be closed while
/// any scan referencing it is still open (enforced in `close`/`close_file`).
pub fn close_scan(scan_handle: i32) -> IndexResult<()> {
    let _span = tracing::info_span!("close_scan", scan_handle).entered();
    track(REGISTRIES.lock().close_scan(scan_handle))
}
