//! Bounds-checked little-endian cursor
//!
//! `ByteCursor` owns a borrowed slice and an index into it. Every read checks
//! the remaining length first and fails with [`SnaError::Truncated`] instead of
//! reading past the end, so the container walk, the relocation walk and the
//! structure readers built on the resolver all share the same guarantees.

use crate::{Result, SnaError};

/// Sequential reader over a borrowed byte slice
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

macro_rules! impl_read_le {
    ($name:ident, $ty:ty) => {
        #[doc = concat!("Read a little-endian `", stringify!($ty), "`")]
        pub fn $name(&mut self) -> Result<$ty> {
            let mut buf = [0u8; std::mem::size_of::<$ty>()];
            buf.copy_from_slice(self.take(std::mem::size_of::<$ty>())?);
            Ok(<$ty>::from_le_bytes(buf))
        }
    };
}

impl<'a> ByteCursor<'a> {
    /// Create a cursor at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a cursor positioned at `pos`
    ///
    /// A position past the end is allowed; the first read will fail.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    /// Current position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move to an absolute position
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Bytes left after the current position
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Whether the cursor has reached the end of the slice
    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    /// The underlying slice
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    fn truncated(&self, needed: usize) -> SnaError {
        SnaError::Truncated {
            offset: self.pos,
            needed,
            available: self.remaining(),
        }
    }

    /// Borrow the next `count` bytes and advance past them
    pub fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return Err(self.truncated(count));
        }
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    /// Advance `count` bytes without reading them
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read one signed byte
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    impl_read_le!(read_u16, u16);
    impl_read_le!(read_i16, i16);
    impl_read_le!(read_u32, u32);
    impl_read_le!(read_i32, i32);
    impl_read_le!(read_f32, f32);

    /// Read a fixed-length latin-1 string, dropping trailing NULs
    pub fn read_fixed_string(&mut self, length: usize) -> Result<String> {
        let bytes = self.take(length)?;
        let end = bytes
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |last| last + 1);
        Ok(latin1(&bytes[..end]))
    }

    /// Read a NUL-terminated byte string, consuming the terminator
    pub fn read_cstring_bytes(&mut self) -> Result<&'a [u8]> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        match rest.iter().position(|&b| b == 0) {
            Some(len) => {
                self.pos += len + 1;
                Ok(&rest[..len])
            }
            None => Err(self.truncated(rest.len() + 1)),
        }
    }

    /// Read a NUL-terminated latin-1 string
    pub fn read_cstring(&mut self) -> Result<String> {
        self.read_cstring_bytes().map(latin1)
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_reads() {
        let data = [
            0x01, 0x34, 0x12, 0xFE, 0xFF, 0x78, 0x56, 0x34, 0x12, 0xFF, 0xFF, 0xFF, 0xFF, 0x00,
            0x00, 0x80, 0x3F,
        ];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_u8().unwrap(), 0x01);
        assert_eq!(cursor.read_u16().unwrap(), 0x1234);
        assert_eq!(cursor.read_i16().unwrap(), -2);
        assert_eq!(cursor.read_u32().unwrap(), 0x12345678);
        assert_eq!(cursor.read_i32().unwrap(), -1);
        assert_eq!(cursor.read_f32().unwrap(), 1.0);
        assert!(cursor.is_at_end());
    }

    #[test]
    fn test_truncated_read_does_not_advance() {
        let data = [0x01, 0x02, 0x03];
        let mut cursor = ByteCursor::at(&data, 1);
        match cursor.read_u32() {
            Err(SnaError::Truncated {
                offset,
                needed,
                available,
            }) => {
                assert_eq!(offset, 1);
                assert_eq!(needed, 4);
                assert_eq!(available, 2);
            }
            other => panic!("expected Truncated, got {other:?}"),
        }
        assert_eq!(cursor.position(), 1);
        assert_eq!(cursor.read_u16().unwrap(), 0x0302);
    }

    #[test]
    fn test_seek_past_end() {
        let data = [0u8; 4];
        let mut cursor = ByteCursor::at(&data, 10);
        assert_eq!(cursor.remaining(), 0);
        assert!(cursor.read_u8().is_err());
        assert!(cursor.read_cstring().is_err());
    }

    #[test]
    fn test_strings() {
        let data = b"abc\0\0\0def\0gh";
        let mut cursor = ByteCursor::new(data);
        assert_eq!(cursor.read_fixed_string(6).unwrap(), "abc");
        assert_eq!(cursor.read_cstring().unwrap(), "def");
        assert_eq!(cursor.position(), 10);
        assert!(matches!(
            cursor.read_cstring(),
            Err(SnaError::Truncated { .. })
        ));
    }

    #[test]
    fn test_latin1_high_bytes() {
        let data = [0xE9, 0x00];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_cstring().unwrap(), "é");
    }
}
