//! Resolved pointers

use crate::container::MemoryBlock;
use crate::cursor::ByteCursor;
use std::fmt;

/// A pointer value translated into a block and an offset inside its payload
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPointer<'a> {
    /// Block the pointer refers to
    pub block: &'a MemoryBlock,
    /// Offset within `block`'s payload
    pub offset: usize,
    /// The raw save-time address that was stored
    pub address: u32,
}

impl<'a> ResolvedPointer<'a> {
    /// Cursor positioned at the pointed-to data
    pub fn cursor(&self) -> ByteCursor<'a> {
        self.block.cursor_at(self.offset)
    }

    /// Pointer `bytes` further into the same block
    ///
    /// The result is not bounds-checked; reads through it are.
    pub fn offset_by(&self, bytes: usize) -> Self {
        Self {
            block: self.block,
            offset: self.offset.saturating_add(bytes),
            address: self.address.wrapping_add(bytes as u32),
        }
    }
}

impl fmt::Debug for ResolvedPointer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ResolvedPointer({:#010x} -> ({}, {})+{:#x})",
            self.address,
            self.block.module(),
            self.block.block_id(),
            self.offset
        )
    }
}
