//! OpenSNA - Rust reader for OpenSpace (Montreal) memory snapshots
//!
//! The OpenSpace engine saves a level as a sequence of compressed memory
//! blocks (`.sna`) plus a side table (`.rtb`, `.rtp`, `.rtt`) listing every
//! location that held a pointer and the block it referred to. This crate
//! rebuilds that address space offline so structure decoders can follow
//! pointers again.
//!
//! # Features
//!
//! - **LZO1X decompression** of the engine's payload variant
//! - **Container parsing** into addressable [`MemoryBlock`]s
//! - **Relocation tables** with configurable entry width and inner compression
//! - **Pointer resolution** from save-time addresses to block offsets
//! - **Legacy XOR stream cipher** used by sibling engine releases
//! - Concurrent block decompression with the `async` feature
//!
//! # Example
//!
//! ```no_run
//! use opensna::{open_level, FormatProfile};
//!
//! let level = open_level("levels/brigand.sna", &FormatProfile::montreal())?;
//! let resolver = level.into_resolver();
//!
//! if let Some(ptr) = resolver.resolve(0, 3, 0x0048_1C20)? {
//!     let mut cursor = ptr.cursor();
//!     let value = cursor.read_u32()?;
//!     println!("{:?} holds {:#x}", ptr, value);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Example - Decompression
//!
//! ```
//! // One literal run of "ABC" followed by the end-of-stream marker
//! let data = opensna::decompress(&[0x14, b'A', b'B', b'C', 0x11, 0x00, 0x00], 3)?;
//! assert_eq!(data, b"ABC");
//! # Ok::<(), opensna::SnaError>(())
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

// Public modules
pub mod cipher;
pub mod common;
pub mod container;
pub mod cursor;
pub mod error;
pub mod level;
pub mod lzo;
pub mod payload;
pub mod relocation;
pub mod resolver;

// Async modules (only available with async feature)
#[cfg(feature = "async")]
pub mod async_container;

// Re-export commonly used types
pub use cipher::{MaskSeed, MaskStep, StreamTransform, XorMask};
pub use common::{
    DecompressionStats, EntryWidth, FormatProfile, RelocationLayout, Result, SnaError, MAX_DISTANCE,
    PAYLOAD_HEADER_SIZE, POINTER_SIZE, TERMINATOR_BASE,
};
pub use container::{relocation_key, Container, MemoryBlock};
pub use cursor::ByteCursor;
pub use level::Level;
pub use lzo::decompress_with_stats;
pub use payload::PayloadHeader;
pub use relocation::{RelocationEntry, RelocationList, RelocationTable};
pub use resolver::{LinkReport, ResolvedPointer, Resolver, Triangle, Vector2, Vector3};

// Re-export async types when async feature is enabled
#[cfg(feature = "async")]
pub use async_container::{
    open_container_async, open_level_async, open_relocation_table_async, AsyncContainerLoader,
};

use std::path::Path;

// Convenience functions

/// Decompress an LZO1X payload
///
/// # Arguments
/// * `input` - The compressed bytes
/// * `expected_size` - Size of the decoded payload
///
/// # Returns
/// A vector of at most `expected_size` bytes
pub fn decompress(input: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    lzo::decompress(input, expected_size)
}

/// Open a Montreal container file
pub fn open_container<P: AsRef<Path>>(path: P) -> Result<Container> {
    open_container_with(path, &FormatProfile::montreal())
}

/// Open a container file with an explicit format profile
///
/// The container is named after the file stem.
pub fn open_container_with<P: AsRef<Path>>(path: P, profile: &FormatProfile) -> Result<Container> {
    let path = path.as_ref();
    let raw = std::fs::read(path)?;
    let data = profile.transform(&raw)?;
    Ok(Container::parse(&data)?.with_name(file_stem(path)))
}

/// Open a relocation table file
pub fn open_relocation_table<P: AsRef<Path>>(
    path: P,
    profile: &FormatProfile,
) -> Result<RelocationTable> {
    let raw = std::fs::read(path)?;
    let data = profile.transform(&raw)?;
    RelocationTable::parse(&data, &profile.relocation)
}

/// Open a `.sna` container together with the sibling `.rtb` table
///
/// A missing table is not an error; the level simply has no relocations.
pub fn open_level<P: AsRef<Path>>(sna_path: P, profile: &FormatProfile) -> Result<Level> {
    let sna_path = sna_path.as_ref();
    let container = open_container_with(sna_path, profile)?;

    let rtb_path = level::relocation_path_for(sna_path);
    let relocations = if rtb_path.is_file() {
        Some(open_relocation_table(&rtb_path, profile)?)
    } else {
        log::warn!("no relocation table next to {}", sna_path.display());
        None
    };

    Ok(Level::new(container, relocations))
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports() {
        let _ = FormatProfile::montreal();
        let _ = EntryWidth::Six;
        let _ = XorMask::rotating();

        assert_eq!(decompress(&[], 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem(Path::new("a/b/fix.sna")), "fix");
        assert_eq!(file_stem(Path::new("")), "");
    }
}
