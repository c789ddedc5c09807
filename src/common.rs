//! Common types and constants for OpenSpace snapshot decoding
//!
//! This module defines the error type, the format profiles that select between
//! sibling engine variants, and the statistics record shared by the
//! decompressor and the container loader.

use crate::cipher::XorMask;
use thiserror::Error;

/// Width in bytes of one pointer record inside a relocation list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryWidth {
    /// 6 bytes: `u32 offset, u8 module, u8 block` (Montreal)
    Six = 6,
    /// 8 bytes: the 6-byte record followed by two padding bytes
    Eight = 8,
}

impl EntryWidth {
    /// Create an EntryWidth from a raw byte count
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            6 => Ok(EntryWidth::Six),
            8 => Ok(EntryWidth::Eight),
            _ => Err(SnaError::InvalidEntryWidth(value)),
        }
    }

    /// Number of bytes one pointer record occupies
    pub fn bytes(&self) -> usize {
        *self as usize
    }
}

/// How the pointer records of a relocation file are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationLayout {
    /// Stride of one pointer record
    pub entry_width: EntryWidth,
    /// Whether each non-empty list is wrapped in a payload header
    pub inner_compression: bool,
}

impl Default for RelocationLayout {
    fn default() -> Self {
        Self {
            entry_width: EntryWidth::Six,
            inner_compression: true,
        }
    }
}

/// Format profile describing one engine variant
///
/// The byte streams carry no magic that tells the variants apart, so the
/// profile has to be supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatProfile {
    /// Stream cipher applied to the whole file before parsing, if any
    pub cipher: Option<XorMask>,
    /// Relocation record layout
    pub relocation: RelocationLayout,
}

impl FormatProfile {
    /// The validated Montreal profile: plain files, 6-byte entries, compressed lists
    pub fn montreal() -> Self {
        Self::default()
    }

    /// Set the stream cipher
    pub fn with_cipher(mut self, cipher: XorMask) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Set the relocation entry width
    pub fn with_entry_width(mut self, width: EntryWidth) -> Self {
        self.relocation.entry_width = width;
        self
    }

    /// Enable or disable payload headers around relocation lists
    pub fn with_inner_compression(mut self, enabled: bool) -> Self {
        self.relocation.inner_compression = enabled;
        self
    }

    /// Every known relocation layout, validated profile first
    ///
    /// Meant for tooling that probes a file of unknown origin.
    pub fn candidates() -> [FormatProfile; 4] {
        let base = FormatProfile::montreal();
        [
            base,
            base.with_entry_width(EntryWidth::Eight),
            base.with_inner_compression(false),
            base.with_entry_width(EntryWidth::Eight)
                .with_inner_compression(false),
        ]
    }
}

/// Error type for snapshot decoding
#[derive(Debug, Error)]
pub enum SnaError {
    /// Fewer bytes available than a fixed-width field requires
    #[error("Truncated data at offset {offset:#x}: need {needed} bytes, {available} available")]
    Truncated {
        /// Cursor position of the failed read
        offset: usize,
        /// Bytes the read required
        needed: usize,
        /// Bytes left at that position
        available: usize,
    },

    /// Illegal LZO instruction, bad back-reference or length mismatch
    #[error("Corrupt compressed stream: {0}")]
    CorruptStream(String),

    /// A relocation entry names a block absent from the container
    #[error("Relocation target block ({module}, {block_id}) is not in the container")]
    UnresolvedTarget {
        /// Target module
        module: u8,
        /// Target block id
        block_id: u8,
    },

    /// A resolution query names a source block absent from the container
    #[error("Block ({module}, {block_id}) is not in the container")]
    UnknownBlock {
        /// Module
        module: u8,
        /// Block id
        block_id: u8,
    },

    /// A computed offset falls outside a payload
    #[error("Address {address:#010x} is outside the block payload ({block_len} bytes)")]
    OutOfRange {
        /// Address or offset that failed the bounds check
        address: u32,
        /// Length of the payload it was checked against
        block_len: usize,
    },

    /// The configured profile does not match the byte stream
    #[error("Unsupported format variant: {0}")]
    UnsupportedVariant(String),

    /// Invalid relocation entry width
    #[error("Invalid relocation entry width: {0} (expected 6 or 8)")]
    InvalidEntryWidth(u8),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for snapshot decoding
pub type Result<T> = std::result::Result<T, SnaError>;

/// Size of the payload header in bytes
pub const PAYLOAD_HEADER_SIZE: usize = 20;

/// Base address value that marks the terminator record
pub const TERMINATOR_BASE: i32 = -1;

/// Largest back-reference distance the LZO variant can encode
pub const MAX_DISTANCE: usize = 0xBFFF;

/// Width of a stored pointer value
pub const POINTER_SIZE: usize = 4;

/// Statistics for a decompression run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecompressionStats {
    /// Instructions decoded (the leading literal byte counts as one)
    pub instructions: usize,
    /// Number of literal bytes copied from the input
    pub literal_bytes: usize,
    /// Number of back-reference copies
    pub match_count: usize,
    /// Longest back-reference copy
    pub longest_match: usize,
    /// Input bytes consumed
    pub input_bytes: usize,
    /// Output bytes produced
    pub output_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_width() {
        assert_eq!(EntryWidth::from_u8(6).unwrap(), EntryWidth::Six);
        assert_eq!(EntryWidth::from_u8(8).unwrap(), EntryWidth::Eight);
        assert!(matches!(
            EntryWidth::from_u8(7),
            Err(SnaError::InvalidEntryWidth(7))
        ));

        assert_eq!(EntryWidth::Six.bytes(), 6);
        assert_eq!(EntryWidth::Eight.bytes(), 8);
    }

    #[test]
    fn test_montreal_profile() {
        let profile = FormatProfile::montreal();
        assert!(profile.cipher.is_none());
        assert_eq!(profile.relocation.entry_width, EntryWidth::Six);
        assert!(profile.relocation.inner_compression);
    }

    #[test]
    fn test_candidates_are_distinct() {
        let candidates = FormatProfile::candidates();
        assert_eq!(candidates[0], FormatProfile::montreal());
        for (i, a) in candidates.iter().enumerate() {
            for b in &candidates[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_constants() {
        assert_eq!(PAYLOAD_HEADER_SIZE, 20);
        assert_eq!(MAX_DISTANCE, 49151);
    }
}
