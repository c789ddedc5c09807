//! Snapshot container (`.sna`) parsing
//!
//! A container is a sequence of block records. Each record names a block by
//! `(module, block_id)`, gives the address the block occupied when the level
//! was saved, and carries the block's payload behind a [`PayloadHeader`]:
//!
//! ```text
//! u8  module
//! u8  block_id
//! i32 base_address          -1 ends the container
//! u32 reserved[3]
//! u32 block_size            0 means no payload header follows
//! PayloadHeader + payload
//! ```
//!
//! Parsing happens in two steps. [`scan_blocks`] walks the records strictly
//! left to right (a record's length is only known once its header is read)
//! and returns a [`BlockLocation`] per record. [`BlockLocation::load`] then
//! decodes one payload; locations are independent, so that step may run on
//! several workers at once.

use crate::cursor::ByteCursor;
use crate::payload::PayloadHeader;
use crate::{Result, SnaError, TERMINATOR_BASE};
use std::ops::Range;

/// One memory region captured at save time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBlock {
    module: u8,
    block_id: u8,
    base_address: i32,
    reserved: [u32; 3],
    block_size: u32,
    header: Option<PayloadHeader>,
    data_position: usize,
    payload: Vec<u8>,
}

impl MemoryBlock {
    /// Module half of the block identity
    pub fn module(&self) -> u8 {
        self.module
    }

    /// Block half of the block identity
    pub fn block_id(&self) -> u8 {
        self.block_id
    }

    /// Address the block occupied at save time (`-1` for the terminator)
    pub fn base_address(&self) -> i32 {
        self.base_address
    }

    /// Base address as an unsigned pointer value
    pub fn base(&self) -> u32 {
        self.base_address as u32
    }

    /// The three reserved words of the record, uninterpreted
    pub fn reserved(&self) -> [u32; 3] {
        self.reserved
    }

    /// Declared block size field
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Payload header, absent for empty blocks and the terminator
    pub fn header(&self) -> Option<&PayloadHeader> {
        self.header.as_ref()
    }

    /// Offset of this payload within [`Container::combined_payload`]
    pub fn data_position(&self) -> usize {
        self.data_position
    }

    /// Decoded payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// `(module << 8) | block_id`, the key relocation entries refer to
    pub fn relocation_key(&self) -> u16 {
        relocation_key(self.module, self.block_id)
    }

    /// Whether this is the end-of-container sentinel
    pub fn is_terminator(&self) -> bool {
        self.base_address == TERMINATOR_BASE
    }

    /// Whether `address` falls inside `[base, base + len)`
    pub fn contains(&self, address: u32) -> bool {
        self.offset_of(address).is_some()
    }

    /// Convert a save-time address into an offset within the payload
    pub fn offset_of(&self, address: u32) -> Option<usize> {
        if self.is_terminator() {
            return None;
        }
        let offset = address.checked_sub(self.base())? as usize;
        (offset < self.payload.len()).then_some(offset)
    }

    /// Cursor over the payload starting at `offset`
    pub fn cursor_at(&self, offset: usize) -> ByteCursor<'_> {
        ByteCursor::at(&self.payload, offset)
    }
}

/// Build a relocation key from its two halves
pub fn relocation_key(module: u8, block_id: u8) -> u16 {
    (u16::from(module) << 8) | u16::from(block_id)
}

/// A block record located by the header walk, payload not yet decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLocation {
    /// Module
    pub module: u8,
    /// Block id
    pub block_id: u8,
    /// Save-time base address
    pub base_address: i32,
    /// Reserved words
    pub reserved: [u32; 3],
    /// Declared block size
    pub block_size: u32,
    /// Payload header, if the block has one
    pub header: Option<PayloadHeader>,
    /// Byte range of the stored payload within the raw container
    pub chunk: Range<usize>,
    /// Offset of the decoded payload within the combined payload
    pub data_position: usize,
}

impl BlockLocation {
    /// Decode the payload and build the block
    pub fn load(&self, raw: &[u8]) -> Result<MemoryBlock> {
        let payload = match &self.header {
            Some(header) => {
                let chunk = raw.get(self.chunk.clone()).ok_or(SnaError::Truncated {
                    offset: self.chunk.start,
                    needed: self.chunk.len(),
                    available: raw.len().saturating_sub(self.chunk.start),
                })?;
                header.decode(chunk)?
            }
            None => Vec::new(),
        };

        log::debug!(
            "block ({}, {}) @ {:#010x}: {} bytes",
            self.module,
            self.block_id,
            self.base_address as u32,
            payload.len()
        );

        Ok(MemoryBlock {
            module: self.module,
            block_id: self.block_id,
            base_address: self.base_address,
            reserved: self.reserved,
            block_size: self.block_size,
            header: self.header,
            data_position: self.data_position,
            payload,
        })
    }
}

/// Result of the sequential header walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockScan {
    /// Located records in file order
    pub locations: Vec<BlockLocation>,
    /// Bytes of the raw container the walk consumed
    pub consumed: usize,
    /// Whether the walk ended on a terminator record
    pub terminated: bool,
}

/// Walk the block records without decoding any payload
///
/// Stops right after the terminator record; trailing bytes are not looked at.
pub fn scan_blocks(raw: &[u8]) -> Result<BlockScan> {
    let mut cursor = ByteCursor::new(raw);
    let mut scan = BlockScan::default();
    let mut data_position = 0;

    while !cursor.is_at_end() {
        let record = scan.locations.len();
        let location =
            scan_record(&mut cursor, data_position).map_err(|err| record_error(record, err))?;

        let is_terminator = location.base_address == TERMINATOR_BASE;
        data_position += location
            .header
            .map_or(0, |header| header.decompressed_size as usize);
        scan.locations.push(location);

        if is_terminator {
            scan.terminated = true;
            break;
        }
    }

    scan.consumed = cursor.position();
    if !scan.terminated {
        log::warn!(
            "container ended after {} records without a terminator",
            scan.locations.len()
        );
    }
    Ok(scan)
}

/// Classify a failure in record `index`
///
/// A first record that cannot be read or decoded means the container does
/// not follow the configured layout at all.
pub(crate) fn record_error(index: usize, err: SnaError) -> SnaError {
    match err {
        SnaError::Truncated { .. } | SnaError::CorruptStream(_) if index == 0 => {
            SnaError::UnsupportedVariant(format!("first container record unreadable: {err}"))
        }
        err => err,
    }
}

fn scan_record(cursor: &mut ByteCursor<'_>, data_position: usize) -> Result<BlockLocation> {
    let module = cursor.read_u8()?;
    let block_id = cursor.read_u8()?;
    let base_address = cursor.read_i32()?;

    let mut location = BlockLocation {
        module,
        block_id,
        base_address,
        reserved: [0; 3],
        block_size: 0,
        header: None,
        chunk: cursor.position()..cursor.position(),
        data_position,
    };
    if base_address == TERMINATOR_BASE {
        return Ok(location);
    }

    for word in &mut location.reserved {
        *word = cursor.read_u32()?;
    }
    location.block_size = cursor.read_u32()?;

    if location.block_size > 0 {
        let header = PayloadHeader::read(cursor)?;
        let start = cursor.position();
        cursor.skip(header.compressed_size as usize)?;
        location.header = Some(header);
        location.chunk = start..cursor.position();
    } else {
        location.chunk = cursor.position()..cursor.position();
    }

    Ok(location)
}

/// Parsed snapshot container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    name: String,
    blocks: Vec<MemoryBlock>,
    consumed: usize,
    terminated: bool,
}

impl Container {
    /// Parse a raw (already unmasked) container
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let scan = scan_blocks(raw)?;
        let blocks = scan
            .locations
            .iter()
            .enumerate()
            .map(|(index, location)| {
                location
                    .load(raw)
                    .map_err(|err| record_error(index, err))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_blocks(blocks, scan.consumed, scan.terminated))
    }

    /// Assemble a container from blocks decoded elsewhere
    pub fn from_blocks(blocks: Vec<MemoryBlock>, consumed: usize, terminated: bool) -> Self {
        Self {
            name: String::new(),
            blocks,
            consumed,
            terminated,
        }
    }

    /// Attach a name (normally the file stem)
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Container name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All blocks in file order, terminator included
    pub fn blocks(&self) -> &[MemoryBlock] {
        &self.blocks
    }

    /// Blocks that carry an address range (the terminator excluded)
    pub fn data_blocks(&self) -> impl Iterator<Item = &MemoryBlock> {
        self.blocks.iter().filter(|block| !block.is_terminator())
    }

    /// Look up a block by identity
    pub fn get_block(&self, module: u8, block_id: u8) -> Option<&MemoryBlock> {
        self.data_blocks()
            .find(|block| block.module == module && block.block_id == block_id)
    }

    /// Block whose address range covers `address`
    pub fn block_containing(&self, address: u32) -> Option<&MemoryBlock> {
        self.data_blocks().find(|block| block.contains(address))
    }

    /// The terminator block, if the container had one
    pub fn terminator(&self) -> Option<&MemoryBlock> {
        self.blocks.last().filter(|block| block.is_terminator())
    }

    /// Whether parsing ended on a terminator record
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Raw bytes consumed by the parse
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Sum of all payload lengths
    pub fn total_payload_len(&self) -> usize {
        self.blocks.iter().map(|block| block.payload.len()).sum()
    }

    /// All payloads concatenated in file order
    pub fn combined_payload(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.total_payload_len());
        for block in &self.blocks {
            data.extend_from_slice(&block.payload);
        }
        data
    }
}
