//! Fixed-size page I/O against a single index file.
//!
//! Mirrors `storage::page::{Page, PageIO}`: a page is a plain byte buffer
//! tagged with its page number, and `PageIO` is the only thing that touches
//! the underlying `File`.

use crate::error::{IndexError, IndexResult, StatusCode};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

/// An in-memory copy of one on-disk page.
#[derive(Clone)]
pub struct Page {
    pub page_id: u32,
    pub data: Vec<u8>,
}

impl Page {
    pub fn new(page_id: u32, page_size: u16) -> Self {
        Page {
            page_id,
            data: vec![0u8; page_size as usize],
        }
    }

    pub fn from_data(page_id: u32, data: Vec<u8>) -> Self {
        Page { page_id, data }
    }
}

/// Raw page-level I/O against one file. Does not cache; `cache::PageCache`
/// sits in front of this.
pub struct PageIO {
    file: File,
    page_size: u16,
}

impl PageIO {
    pub fn new(file: File, page_size: u16) -> Self {
        PageIO { file, page_size }
    }

    pub fn page_size(&self) -> u16 {
        self.page_size
    }

    pub fn read_page(&mut self, page_id: u32) -> IndexResult<Page> {
        let offset = (page_id as u64) * (self.page_size as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0u8; self.page_size as usize];
        self.file.read_exact(&mut data).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                IndexError::Status(StatusCode::GetBlockError)
            } else {
                IndexError::Io(e)
            }
        })?;
        Ok(Page::from_data(page_id, data))
    }

    pub fn write_page(&mut self, page: &Page) -> IndexResult<()> {
        let offset = (page.page_id as u64) * (self.page_size as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&page.data)?;
        Ok(())
    }

    /// Total number of pages currently in the file, including the header.
    pub fn page_count(&mut self) -> IndexResult<u32> {
        let end = self.file.seek(SeekFrom::End(0))?;
        Ok((end / self.page_size as u64) as u32)
    }

    /// Append a new zeroed page and return it, without writing it to disk
    /// yet (the caller initializes it and writes it back via `write_page`).
    pub fn allocate_page(&mut self) -> IndexResult<Page> {
        let page_id = self.page_count()?;
        let page = Page::new(page_id, self.page_size);
        self.write_page(&page)?;
        Ok(page)
    }

    pub fn sync(&mut self) -> IndexResult<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn page_io_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("idx.dat");
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .unwrap();
        let mut io = PageIO::new(file, 512);

        let mut page = io.allocate_page().unwrap();
        assert_eq!(page.page_id, 0);
        page.data[0] = 0xAB;
        io.write_page(&page).unwrap();

        let read_back = io.read_page(0).unwrap();
        assert_eq!(read_back.data[0], 0xAB);
        assert_eq!(io.page_count().unwrap(), 1);
    }
}
