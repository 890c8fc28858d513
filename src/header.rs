//! Header page (page 0) codec.
//!
//! Layout: marker byte `'b'`, key-kind byte, key-width i32, payload-kind
//! byte, payload-width i32, root page id i32. All integers little-endian.
//! Distinct from the Btrieve `FileControlRecord` (a 64+-byte structure with
//! key arrays, flags, and free-space thresholds). This format has none of
//! that because there is exactly one key and no variable-length/compressed
//! record support.

use crate::error::{IndexError, IndexResult, StatusCode};
use crate::key::{KeyDescriptor, KeyKind};
use crate::page::Page;
use byteorder::{ByteOrder, LittleEndian};

pub const MARKER: u8 = b'b';

/// Decoded contents of an index file's page 0.
///
/// `page_size` is not one of the canonical header fields, but without it
/// `open(path)` has no way to recover the fanout `M`. It is stored
/// immediately after them, at a fixed offset within the same page, rather
/// than changing the order or meaning of the documented fields.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub key: KeyDescriptor,
    pub payload: KeyDescriptor,
    pub root_page_id: u32,
    pub page_size: u16,
}

impl Header {
    pub const ENCODED_LEN: usize = 1 + 1 + 4 + 1 + 4 + 4 + 2;

    pub fn new(key: KeyDescriptor, payload: KeyDescriptor, page_size: u16) -> Self {
        Header {
            key,
            payload,
            root_page_id: 0,
            page_size,
        }
    }

    /// Decode just enough of page 0 (the first `ENCODED_LEN` bytes) to learn
    /// the page size, before the caller knows how large a page to read.
    pub fn decode_page_size(first_bytes: &[u8]) -> IndexResult<u16> {
        if first_bytes.len() < Self::ENCODED_LEN || first_bytes[0] != MARKER {
            return Err(IndexError::InvalidFormat(
                "page 0 is missing the index marker byte".into(),
            ));
        }
        Ok(LittleEndian::read_u16(&first_bytes[15..17]))
    }

    pub fn decode(page: &Page) -> IndexResult<Self> {
        let data = &page.data;
        if data.len() < Self::ENCODED_LEN || data[0] != MARKER {
            return Err(IndexError::InvalidFormat(
                "page 0 is missing the index marker byte".into(),
            ));
        }
        let key_kind = KeyKind::from_code(data[1])?;
        let key_width = LittleEndian::read_i32(&data[2..6]) as u32;
        let payload_kind = KeyKind::from_code(data[6])?;
        let payload_width = LittleEndian::read_i32(&data[7..11]) as u32;
        let root_page_id = LittleEndian::read_i32(&data[11..15]) as u32;
        let page_size = LittleEndian::read_u16(&data[15..17]);

        let key = KeyDescriptor::new(key_kind, key_width)
            .map_err(|_| IndexError::Status(StatusCode::FatalError))?;
        let payload = KeyDescriptor::new(payload_kind, payload_width)
            .map_err(|_| IndexError::Status(StatusCode::FatalError))?;

        Ok(Header {
            key,
            payload,
            root_page_id,
            page_size,
        })
    }

    pub fn encode(&self) -> Page {
        let mut data = vec![0u8; self.page_size as usize];
        data[0] = MARKER;
        data[1] = self.key.kind.code();
        LittleEndian::write_i32(&mut data[2..6], self.key.width as i32);
        data[6] = self.payload.kind.code();
        LittleEndian::write_i32(&mut data[7..11], self.payload.width as i32);
        LittleEndian::write_i32(&mut data[11..15], self.root_page_id as i32);
        LittleEndian::write_u16(&mut data[15..17], self.page_size);
        Page::from_data(0, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyKind;

    #[test]
    fn header_roundtrip() {
        let key = KeyDescriptor::new(KeyKind::Integer32, 4).unwrap();
        let payload = KeyDescriptor::new(KeyKind::Integer32, 4).unwrap();
        let mut header = Header::new(key, payload, 512);
        header.root_page_id = 7;

        let page = header.encode();
        let decoded = Header::decode(&page).unwrap();
        assert_eq!(decoded.key.kind, KeyKind::Integer32);
        assert_eq!(decoded.root_page_id, 7);
        assert_eq!(decoded.page_size, 512);
    }

    #[test]
    fn decode_page_size_reads_before_full_decode() {
        let key = KeyDescriptor::new(KeyKind::Integer32, 4).unwrap();
        let payload = KeyDescriptor::new(KeyKind::Integer32, 4).unwrap();
        let header = Header::new(key, payload, 4096);
        let page = header.encode();
        let size = Header::decode_page_size(&page.data[..Header::ENCODED_LEN]).unwrap();
        assert_eq!(size, 4096);
    }

    #[test]
    fn header_rejects_missing_marker() {
        let page = Page::new(0, 512);
        assert!(Header::decode(&page).is_err());
    }
}
