//! Pointer resolution across blocks
//!
//! The engine wrote raw addresses into its snapshots. A stored value only
//! means something once two facts are joined: the relocation table says the
//! location holds a pointer and names the target block, and the container
//! says where that block lived at save time. [`Resolver`] performs that join
//! and hands back block-relative offsets.
//!
//! Both inputs are read-only once the resolver is built, so one resolver can
//! serve any number of concurrent readers.

mod geometry;
mod pointer;

pub use geometry::{read_triangles, read_uvs, read_vertices, Triangle, Vector2, Vector3};
pub use pointer::ResolvedPointer;

use crate::container::{relocation_key, Container, MemoryBlock};
use crate::cursor::ByteCursor;
use crate::relocation::{RelocationEntry, RelocationTable};
use crate::{Result, SnaError, POINTER_SIZE};
use std::collections::HashMap;

/// Joining view over a container and its relocation table
#[derive(Debug, Clone)]
pub struct Resolver {
    container: Container,
    table: RelocationTable,
    blocks: HashMap<u16, usize>,
    sites: HashMap<u16, HashMap<u32, RelocationEntry>>,
}

impl Resolver {
    /// Build lookup tables over a parsed container and relocation table
    pub fn new(container: Container, table: RelocationTable) -> Self {
        let mut blocks = HashMap::new();
        for (index, block) in container.blocks().iter().enumerate() {
            if !block.is_terminator() {
                blocks.entry(block.relocation_key()).or_insert(index);
            }
        }
        let sites = table.index();

        Self {
            container,
            table,
            blocks,
            sites,
        }
    }

    /// The container
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// The relocation table
    pub fn table(&self) -> &RelocationTable {
        &self.table
    }

    /// Give back the joined inputs
    pub fn into_parts(self) -> (Container, RelocationTable) {
        (self.container, self.table)
    }

    /// Look up a block by identity
    pub fn block(&self, module: u8, block_id: u8) -> Option<&MemoryBlock> {
        self.blocks
            .get(&relocation_key(module, block_id))
            .map(|&index| &self.container.blocks()[index])
    }

    /// Relocation entry for the pointer stored at `address` in block `(module, block_id)`
    pub fn relocation_at(&self, module: u8, block_id: u8, address: u32) -> Option<&RelocationEntry> {
        self.sites
            .get(&relocation_key(module, block_id))?
            .get(&address)
    }

    /// Whether `address` in block `(module, block_id)` holds a relocated pointer
    pub fn is_pointer(&self, module: u8, block_id: u8, address: u32) -> bool {
        self.relocation_at(module, block_id, address).is_some()
    }

    /// Resolve the pointer stored at save-time address `offset_in_memory`
    ///
    /// Returns `Ok(None)` when the location is not a listed pointer site: the
    /// value there is a scalar or a null pointer, which the caller tells apart
    /// from the structure layout it is decoding.
    pub fn resolve(
        &self,
        module: u8,
        block_id: u8,
        offset_in_memory: u32,
    ) -> Result<Option<ResolvedPointer<'_>>> {
        let source = self
            .block(module, block_id)
            .ok_or(SnaError::UnknownBlock { module, block_id })?;
        let Some(entry) = self.relocation_at(module, block_id, offset_in_memory) else {
            return Ok(None);
        };

        let target = self
            .block(entry.target_module, entry.target_block_id)
            .ok_or(SnaError::UnresolvedTarget {
                module: entry.target_module,
                block_id: entry.target_block_id,
            })?;

        let site = source
            .offset_of(offset_in_memory)
            .ok_or(SnaError::OutOfRange {
                address: offset_in_memory,
                block_len: source.payload().len(),
            })?;
        let address = source.cursor_at(site).read_u32()?;

        let offset = target.offset_of(address).ok_or(SnaError::OutOfRange {
            address,
            block_len: target.payload().len(),
        })?;

        Ok(Some(ResolvedPointer {
            block: target,
            offset,
            address,
        }))
    }

    /// Find the block and offset a raw address falls into
    ///
    /// This ignores relocation data and simply searches every block's range.
    pub fn locate(&self, address: u32) -> Option<ResolvedPointer<'_>> {
        let block = self.container.block_containing(address)?;
        let offset = block.offset_of(address)?;
        Some(ResolvedPointer {
            block,
            offset,
            address,
        })
    }

    /// Resolve the pointer stored at payload offset `offset` of `block`
    pub fn read_pointer_at(
        &self,
        block: &MemoryBlock,
        offset: usize,
    ) -> Result<Option<ResolvedPointer<'_>>> {
        let address = block.base().wrapping_add(offset as u32);
        self.resolve(block.module(), block.block_id(), address)
    }

    /// Read a pointer field at the cursor and advance past it
    ///
    /// `cursor` must walk `block`'s payload.
    pub fn read_pointer_field(
        &self,
        block: &MemoryBlock,
        cursor: &mut ByteCursor<'_>,
    ) -> Result<Option<ResolvedPointer<'_>>> {
        let offset = cursor.position();
        cursor.skip(POINTER_SIZE)?;
        self.read_pointer_at(block, offset)
    }

    /// Follow the pointer stored where `ptr` points
    pub fn follow(&self, ptr: &ResolvedPointer<'_>) -> Result<Option<ResolvedPointer<'_>>> {
        self.read_pointer_at(ptr.block, ptr.offset)
    }

    /// Follow the pointer field at `field_offset` and read `count` vertices
    ///
    /// An unlisted or null field yields an empty array.
    pub fn seek_and_read_vertices(
        &self,
        block: &MemoryBlock,
        field_offset: usize,
        count: usize,
    ) -> Result<Vec<Vector3>> {
        match self.read_pointer_at(block, field_offset)? {
            Some(ptr) => read_vertices(&ptr, count),
            None => Ok(Vec::new()),
        }
    }

    /// Follow the pointer field at `field_offset` and read `count` triangles
    pub fn seek_and_read_triangles(
        &self,
        block: &MemoryBlock,
        field_offset: usize,
        count: usize,
    ) -> Result<Vec<Triangle>> {
        match self.read_pointer_at(block, field_offset)? {
            Some(ptr) => read_triangles(&ptr, count),
            None => Ok(Vec::new()),
        }
    }

    /// Follow the pointer field at `field_offset` and read `count` UVs
    pub fn seek_and_read_uvs(
        &self,
        block: &MemoryBlock,
        field_offset: usize,
        count: usize,
    ) -> Result<Vec<Vector2>> {
        match self.read_pointer_at(block, field_offset)? {
            Some(ptr) => read_uvs(&ptr, count),
            None => Ok(Vec::new()),
        }
    }

    /// Check every relocation entry against the container
    pub fn verify(&self) -> LinkReport {
        let mut report = LinkReport::default();

        for list in self.table.lists() {
            report.lists += 1;
            let Some(source) = self.block(list.module, list.block_id) else {
                report.missing_sources.push((list.module, list.block_id));
                report.pointers += list.entries.len();
                continue;
            };

            for entry in &list.entries {
                report.pointers += 1;
                let issue = PointerIssue {
                    module: list.module,
                    block_id: list.block_id,
                    entry: *entry,
                };

                let in_bounds = source
                    .offset_of(entry.memory_offset)
                    .is_some_and(|site| site + POINTER_SIZE <= source.payload().len());
                if !in_bounds {
                    report.sites_out_of_bounds.push(issue);
                    continue;
                }

                match self.resolve(list.module, list.block_id, entry.memory_offset) {
                    Ok(_) => report.resolved += 1,
                    Err(SnaError::UnresolvedTarget { .. }) => report.dangling_targets.push(issue),
                    Err(_) => report.values_out_of_bounds.push(issue),
                }
            }
        }

        report
    }
}

/// A relocation entry that failed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerIssue {
    /// Source module
    pub module: u8,
    /// Source block id
    pub block_id: u8,
    /// Offending entry
    pub entry: RelocationEntry,
}

/// Outcome of [`Resolver::verify`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    /// Relocation lists examined
    pub lists: usize,
    /// Pointer entries examined
    pub pointers: usize,
    /// Entries that resolved cleanly
    pub resolved: usize,
    /// Lists whose source block is missing from the container
    pub missing_sources: Vec<(u8, u8)>,
    /// Entries whose site lies outside the source payload
    pub sites_out_of_bounds: Vec<PointerIssue>,
    /// Entries whose target block is missing
    pub dangling_targets: Vec<PointerIssue>,
    /// Entries whose stored value falls outside the target payload
    pub values_out_of_bounds: Vec<PointerIssue>,
}

impl LinkReport {
    /// Whether every entry resolved
    pub fn is_clean(&self) -> bool {
        self.resolved == self.pointers
    }
}
