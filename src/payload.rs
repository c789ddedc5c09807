//! Compressed-payload header
//!
//! Container blocks and relocation lists share the same 20-byte envelope:
//!
//! ```text
//! u32 is_compressed
//! u32 compressed_size
//! u32 compressed_checksum
//! u32 decompressed_size
//! u32 decompressed_checksum
//! u8  payload[compressed_size]
//! ```
//!
//! The checksums are carried through untouched; nothing in this crate
//! verifies them.

use crate::cursor::ByteCursor;
use crate::{lzo, Result, SnaError};

/// Envelope preceding every compressed payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PayloadHeader {
    /// Whether the payload is LZO compressed
    pub is_compressed: bool,
    /// Number of payload bytes following the header
    pub compressed_size: u32,
    /// Checksum over the stored bytes
    pub compressed_checksum: u32,
    /// Size of the payload once decoded
    pub decompressed_size: u32,
    /// Checksum over the decoded bytes
    pub decompressed_checksum: u32,
}

impl PayloadHeader {
    /// Read the 20-byte header
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        Ok(Self {
            is_compressed: cursor.read_u32()? != 0,
            compressed_size: cursor.read_u32()?,
            compressed_checksum: cursor.read_u32()?,
            decompressed_size: cursor.read_u32()?,
            decompressed_checksum: cursor.read_u32()?,
        })
    }

    /// Read the header and borrow the `compressed_size` bytes behind it
    pub fn read_with_payload<'a>(cursor: &mut ByteCursor<'a>) -> Result<(Self, &'a [u8])> {
        let header = Self::read(cursor)?;
        let chunk = cursor.take(header.compressed_size as usize)?;
        Ok((header, chunk))
    }

    /// Decode the stored bytes into the payload
    ///
    /// Compressed chunks go through the LZO decoder with `decompressed_size`
    /// as the target; stored chunks yield their first `decompressed_size`
    /// bytes.
    pub fn decode(&self, chunk: &[u8]) -> Result<Vec<u8>> {
        let size = self.decompressed_size as usize;
        if self.is_compressed {
            // An empty chunk decodes to nothing regardless of the target size
            let payload = lzo::decompress(chunk, size)?;
            if payload.len() != size {
                return Err(SnaError::CorruptStream(format!(
                    "payload decoded to {} bytes, header declares {}",
                    payload.len(),
                    size
                )));
            }
            Ok(payload)
        } else {
            match chunk.get(..size) {
                Some(stored) => Ok(stored.to_vec()),
                None => Err(SnaError::Truncated {
                    offset: 0,
                    needed: size,
                    available: chunk.len(),
                }),
            }
        }
    }
}
