//! Status codes and error handling for the index library.
//!
//! The original `AM_*` API reported failures through a single process-wide
//! `AM_errno` plus a distinct code per call. We keep that status-code
//! vocabulary (grouped below) but carry it as a typed `thiserror` error
//! instead of an integer, and also mirror the last error into a process-wide
//! slot for callers that want the C-style "check after a nonzero return"
//! idiom.

use parking_lot::Mutex;
use thiserror::Error;

/// Grouped status codes, matching the kinds enumerated in the library's
/// error handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    Success = 0,

    // Configuration
    TypeError = 1,

    // Resource
    TooManyFiles = 2,
    TooManyScans = 3,
    FileNotFound = 4,
    ScansStillOpen = 5,
    DestroyStillOpen = 6,

    // Storage
    CreateError = 7,
    OpenError = 8,
    CloseError = 9,
    RemoveError = 10,
    AllocateError = 11,
    GetBlockError = 12,
    BlockCounterError = 13,
    UnpinError = 14,

    // Logic
    InsertError = 15,
    InvalidScan = 16,
    FatalError = 17,

    // Sentinel
    EndOfStream = 18,

    // Misc
    NotOpen = 19,
    InitError = 20,
}

impl StatusCode {
    pub fn is_success(self) -> bool {
        matches!(self, StatusCode::Success)
    }

    pub fn is_eof(self) -> bool {
        matches!(self, StatusCode::EndOfStream)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            StatusCode::Success => "success",
            StatusCode::TypeError => "invalid key or payload descriptor",
            StatusCode::TooManyFiles => "too many open files",
            StatusCode::TooManyScans => "too many open scans",
            StatusCode::FileNotFound => "file not open",
            StatusCode::ScansStillOpen => "scans still open on this handle",
            StatusCode::DestroyStillOpen => "index has an open handle",
            StatusCode::CreateError => "could not create index file",
            StatusCode::OpenError => "could not open index file",
            StatusCode::CloseError => "could not close index file",
            StatusCode::RemoveError => "could not remove index file",
            StatusCode::AllocateError => "could not allocate a page",
            StatusCode::GetBlockError => "could not read a page",
            StatusCode::BlockCounterError => "could not determine page count",
            StatusCode::UnpinError => "could not write back a page",
            StatusCode::InsertError => "insert failed",
            StatusCode::InvalidScan => "invalid scan handle",
            StatusCode::FatalError => "fatal internal error",
            StatusCode::EndOfStream => "end of scan",
            StatusCode::NotOpen => "handle is not open",
            StatusCode::InitError => "library not initialized",
        };
        write!(f, "{} ({})", *self as u16, text)
    }
}

/// Main error type for the index library.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("{0}")]
    Status(StatusCode),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid on-disk format: {0}")]
    InvalidFormat(String),
}

impl IndexError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            IndexError::Status(code) => *code,
            IndexError::Io(_) => StatusCode::FatalError,
            IndexError::InvalidFormat(_) => StatusCode::FatalError,
        }
    }
}

impl From<StatusCode> for IndexError {
    fn from(code: StatusCode) -> Self {
        IndexError::Status(code)
    }
}

pub type IndexResult<T> = Result<T, IndexError>;

lazy_static::lazy_static! {
    static ref LAST_ERROR: Mutex<StatusCode> = Mutex::new(StatusCode::Success);
}

pub(crate) fn set_last_error(code: StatusCode) {
    *LAST_ERROR.lock() = code;
    if !code.is_success() {
        tracing::debug!(status = %code, "operation failed");
    }
}

/// The status code of the most recently failed call in this process.
pub fn last_error() -> StatusCode {
    *LAST_ERROR.lock()
}

/// Records `err`'s status code as the process-wide last error and returns it
/// unchanged, for use with `?` at call sites that want both behaviors.
pub(crate) fn track<T>(result: IndexResult<T>) -> IndexResult<T> {
    if let Err(ref e) = result {
        set_last_error(e.status_code());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_contains_code() {
        assert!(StatusCode::FileNotFound.to_string().contains('4'));
    }

    #[test]
    fn last_error_tracks_failures() {
        set_last_error(StatusCode::Success);
        assert!(last_error().is_success());
        let _ = track::<()>(Err(IndexError::Status(StatusCode::TooManyFiles)));
        assert_eq!(last_error(), StatusCode::TooManyFiles);
    }
}
