//! Key and payload descriptors, and the single comparator they dispatch to.
//!
//! Narrowed from the 14-variant `KeyType`/`KeySpec` down to the three kinds
//! this format actually needs: integer-32, float-32, and a fixed-width
//! string compared byte-for-byte with zero padding.

use crate::error::{IndexError, IndexResult, StatusCode};
use byteorder::{ByteOrder, LittleEndian};
use std::cmp::Ordering;

/// The storage kind of a key or payload column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Integer32,
    Float32,
    FixedString,
}

impl KeyKind {
    /// Decode the single-byte descriptor code used on disk and in the public API.
    pub fn from_code(code: u8) -> IndexResult<Self> {
        match code {
            b'i' => Ok(KeyKind::Integer32),
            b'f' => Ok(KeyKind::Float32),
            b'c' => Ok(KeyKind::FixedString),
            _ => Err(IndexError::Status(StatusCode::TypeError)),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            KeyKind::Integer32 => b'i',
            KeyKind::Float32 => b'f',
            KeyKind::FixedString => b'c',
        }
    }
}

/// `(kind, width)` describing how a key or payload column is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub kind: KeyKind,
    pub width: u32,
}

impl KeyDescriptor {
    pub fn new(kind: KeyKind, width: u32) -> IndexResult<Self> {
        let descriptor = KeyDescriptor { kind, width };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Validate `(kind, width)` per the descriptor rules: 4 for numeric
    /// kinds, 1..=255 for fixed strings.
    pub fn validate(&self) -> IndexResult<()> {
        let ok = match self.kind {
            KeyKind::Integer32 | KeyKind::Float32 => self.width == 4,
            KeyKind::FixedString => (1..=255).contains(&self.width),
        };
        if ok {
            Ok(())
        } else {
            Err(IndexError::Status(StatusCode::TypeError))
        }
    }

    pub fn width(&self) -> usize {
        self.width as usize
    }

    /// The sole key comparator. Dispatches on `kind`; numeric kinds compare
    /// numerically, fixed strings compare lexicographically byte-for-byte
    /// (both sides are always exactly `width` bytes, zero-padded by the
    /// caller, so no separate padding step is needed here).
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self.kind {
            KeyKind::Integer32 => {
                let ai = LittleEndian::read_i32(a);
                let bi = LittleEndian::read_i32(b);
                ai.cmp(&bi)
            }
            KeyKind::Float32 => {
                let af = LittleEndian::read_f32(a);
                let bf = LittleEndian::read_f32(b);
                af.partial_cmp(&bf).unwrap_or(Ordering::Equal)
            }
            KeyKind::FixedString => a.cmp(b),
        }
    }

    /// Zero-pad `raw` out to `width` bytes (fixed strings shorter than the
    /// declared width are right-padded with zero bytes).
    pub fn pad(&self, raw: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; self.width()];
        let n = raw.len().min(self.width());
        buf[..n].copy_from_slice(&raw[..n]);
        buf
    }
}

/// One of the six comparison operators a scan can be opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal = 1,
    NotEqual = 2,
    LessThan = 3,
    GreaterThan = 4,
    LessOrEqual = 5,
    GreaterOrEqual = 6,
}

impl CompareOp {
    pub fn from_code(code: i32) -> IndexResult<Self> {
        match code {
            1 => Ok(CompareOp::Equal),
            2 => Ok(CompareOp::NotEqual),
            3 => Ok(CompareOp::LessThan),
            4 => Ok(CompareOp::GreaterThan),
            5 => Ok(CompareOp::LessOrEqual),
            6 => Ok(CompareOp::GreaterOrEqual),
            _ => Err(IndexError::Status(StatusCode::InvalidScan)),
        }
    }

    /// Evaluate `key op ref_key` using `ordering = descriptor.compare(key, ref_key)`.
    pub fn matches(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Equal => ordering == Ordering::Equal,
            CompareOp::NotEqual => ordering != Ordering::Equal,
            CompareOp::LessThan => ordering == Ordering::Less,
            CompareOp::GreaterThan => ordering == Ordering::Greater,
            CompareOp::LessOrEqual => ordering != Ordering::Greater,
            CompareOp::GreaterOrEqual => ordering != Ordering::Less,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_descriptor_rejects_bad_width() {
        assert!(KeyDescriptor::new(KeyKind::Integer32, 8).is_err());
        assert!(KeyDescriptor::new(KeyKind::Integer32, 4).is_ok());
    }

    #[test]
    fn string_descriptor_rejects_out_of_range_width() {
        assert!(KeyDescriptor::new(KeyKind::FixedString, 0).is_err());
        assert!(KeyDescriptor::new(KeyKind::FixedString, 256).is_err());
        assert!(KeyDescriptor::new(KeyKind::FixedString, 255).is_ok());
    }

    #[test]
    fn integer_comparison() {
        let d = KeyDescriptor::new(KeyKind::Integer32, 4).unwrap();
        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        LittleEndian::write_i32(&mut a, 3);
        LittleEndian::write_i32(&mut b, 5);
        assert_eq!(d.compare(&a, &b), Ordering::Less);
        assert_eq!(d.compare(&b, &a), Ordering::Greater);
        assert_eq!(d.compare(&a, &a), Ordering::Equal);
    }

    #[test]
    fn string_comparison_is_zero_padded_lexicographic() {
        let d = KeyDescriptor::new(KeyKind::FixedString, 5).unwrap();
        let a = d.pad(b"ab");
        let b = d.pad(b"abc");
        assert_eq!(d.compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn compare_op_matches() {
        assert!(CompareOp::Equal.matches(Ordering::Equal));
        assert!(!CompareOp::Equal.matches(Ordering::Less));
        assert!(CompareOp::GreaterOrEqual.matches(Ordering::Equal));
        assert!(CompareOp::GreaterOrEqual.matches(Ordering::Greater));
        assert!(!CompareOp::GreaterOrEqual.matches(Ordering::Less));
    }
}
