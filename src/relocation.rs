//! Relocation table (`.rtb`, `.rtp`, `.rtt`) parsing
//!
//! The side file lists, for every block that contains pointers, each address
//! holding a pointer and the block that pointer refers to:
//!
//! ```text
//! u8 list_count
//! list_count x {
//!     u8  source_module
//!     u8  source_block_id
//!     u32 pointer_count
//!     PayloadHeader + payload     (inner compression)
//!   | u8 entries[pointer_count * entry_width]
//! }
//! entry = u32 memory_offset, u8 target_module, u8 target_block_id, padding
//! ```
//!
//! Entry width and inner compression differ between engine releases and are
//! taken from a [`RelocationLayout`].

use crate::container::relocation_key;
use crate::cursor::ByteCursor;
use crate::payload::PayloadHeader;
use crate::{RelocationLayout, Result, SnaError};
use std::collections::HashMap;

/// One pointer site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelocationEntry {
    /// Save-time address holding the pointer, in the source block's coordinates
    pub memory_offset: u32,
    /// Module of the block the pointer refers to
    pub target_module: u8,
    /// Block id of the block the pointer refers to
    pub target_block_id: u8,
}

impl RelocationEntry {
    /// Relocation key of the target block
    pub fn target_key(&self) -> u16 {
        relocation_key(self.target_module, self.target_block_id)
    }
}

/// All pointer sites of one source block
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelocationList {
    /// Source module
    pub module: u8,
    /// Source block id
    pub block_id: u8,
    /// Pointer sites in file order
    pub entries: Vec<RelocationEntry>,
}

impl RelocationList {
    /// Relocation key of the source block
    pub fn source_key(&self) -> u16 {
        relocation_key(self.module, self.block_id)
    }

    /// Entry for the pointer stored at `memory_offset`, if it is listed
    pub fn find(&self, memory_offset: u32) -> Option<&RelocationEntry> {
        self.entries
            .iter()
            .find(|entry| entry.memory_offset == memory_offset)
    }
}

/// Parsed relocation table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelocationTable {
    lists: Vec<RelocationList>,
}

impl RelocationTable {
    /// Parse a raw (already unmasked) relocation file
    ///
    /// An empty file is an empty table. A failure inside the first list means
    /// the layout most likely does not match the file and is reported as
    /// [`SnaError::UnsupportedVariant`].
    pub fn parse(raw: &[u8], layout: &RelocationLayout) -> Result<Self> {
        let mut table = RelocationTable::default();
        if raw.is_empty() {
            return Ok(table);
        }

        let mut cursor = ByteCursor::new(raw);
        let list_count = cursor.read_u8()?;

        for index in 0..list_count {
            match read_list(&mut cursor, layout) {
                Ok(list) => table.lists.push(list),
                Err(err @ (SnaError::Truncated { .. } | SnaError::CorruptStream(_)))
                    if index == 0 =>
                {
                    return Err(SnaError::UnsupportedVariant(format!(
                        "first relocation list unreadable with {}-byte entries{}: {err}",
                        layout.entry_width.bytes(),
                        if layout.inner_compression {
                            " and payload headers"
                        } else {
                            ""
                        },
                    )));
                }
                Err(err) => return Err(err),
            }
        }

        Ok(table)
    }

    /// Build a table from lists assembled elsewhere
    pub fn from_lists(lists: Vec<RelocationList>) -> Self {
        Self { lists }
    }

    /// All lists in file order
    pub fn lists(&self) -> &[RelocationList] {
        &self.lists
    }

    /// List of pointer sites for a source block
    pub fn get_list_for_block(&self, module: u8, block_id: u8) -> Option<&RelocationList> {
        self.lists
            .iter()
            .find(|list| list.module == module && list.block_id == block_id)
    }

    /// Total number of pointer sites
    pub fn pointer_count(&self) -> usize {
        self.lists.iter().map(|list| list.entries.len()).sum()
    }

    /// Index every pointer site by source key, then by address
    ///
    /// A site listed twice keeps its first entry in file order, matching
    /// [`RelocationList::find`].
    pub fn index(&self) -> HashMap<u16, HashMap<u32, RelocationEntry>> {
        let mut index: HashMap<u16, HashMap<u32, RelocationEntry>> = HashMap::new();
        for list in &self.lists {
            let sites = index.entry(list.source_key()).or_default();
            for entry in &list.entries {
                sites.entry(entry.memory_offset).or_insert(*entry);
            }
        }
        index
    }
}

fn read_list(cursor: &mut ByteCursor<'_>, layout: &RelocationLayout) -> Result<RelocationList> {
    let module = cursor.read_u8()?;
    let block_id = cursor.read_u8()?;
    let pointer_count = cursor.read_u32()? as usize;

    let mut list = RelocationList {
        module,
        block_id,
        entries: Vec::new(),
    };
    if pointer_count == 0 {
        return Ok(list);
    }

    let width = layout.entry_width.bytes();
    let needed = pointer_count.saturating_mul(width);

    let records = if layout.inner_compression {
        let (header, chunk) = PayloadHeader::read_with_payload(cursor)?;
        header.decode(chunk)?
    } else {
        cursor.take(needed)?.to_vec()
    };

    if records.len() < needed {
        return Err(SnaError::Truncated {
            offset: 0,
            needed,
            available: records.len(),
        });
    }

    list.entries = records
        .chunks_exact(width)
        .take(pointer_count)
        .map(|record| RelocationEntry {
            memory_offset: u32::from_le_bytes([record[0], record[1], record[2], record[3]]),
            target_module: record[4],
            target_block_id: record[5],
        })
        .collect();

    log::debug!(
        "relocation list ({}, {}): {} pointers",
        module,
        block_id,
        list.entries.len()
    );
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntryWidth;

    fn raw_layout(width: EntryWidth) -> RelocationLayout {
        RelocationLayout {
            entry_width: width,
            inner_compression: false,
        }
    }

    fn entry(offset: u32, module: u8, block: u8, width: usize) -> Vec<u8> {
        let mut bytes = offset.to_le_bytes().to_vec();
        bytes.push(module);
        bytes.push(block);
        bytes.resize(width, 0xEE);
        bytes
    }

    #[test]
    fn test_empty_file() {
        let table = RelocationTable::parse(&[], &RelocationLayout::default()).unwrap();
        assert!(table.lists().is_empty());
    }

    #[test]
    fn test_duplicate_site_keeps_first_entry() {
        let mut raw = vec![1, 0, 0];
        raw.extend_from_slice(&2u32.to_le_bytes());
        raw.extend(entry(0x1004, 0, 1, 6));
        raw.extend(entry(0x1004, 0, 2, 6));

        let table = RelocationTable::parse(&raw, &raw_layout(EntryWidth::Six)).unwrap();
        let listed = table.get_list_for_block(0, 0).unwrap().find(0x1004).unwrap();
        let indexed = table.index()[&0x0000][&0x1004];
        assert_eq!(listed.target_block_id, 1);
        assert_eq!(indexed, *listed);
    }

    #[test]
    fn test_uncompressed_six_byte_entries() {
        let mut raw = vec![2, 0, 0];
        raw.extend_from_slice(&2u32.to_le_bytes());
        raw.extend(entry(0x1004, 0, 1, 6));
        raw.extend(entry(0x1008, 0, 2, 6));
        raw.extend_from_slice(&[0, 1]);
        raw.extend_from_slice(&0u32.to_le_bytes());

        let table = RelocationTable::parse(&raw, &raw_layout(EntryWidth::Six)).unwrap();
        assert_eq!(table.lists().len(), 2);
        assert_eq!(table.pointer_count(), 2);

        let list = table.get_list_for_block(0, 0).unwrap();
        assert_eq!(list.source_key(), 0x0000);
        let found = list.find(0x1008).unwrap();
        assert_eq!(found.target_block_id, 2);
        assert_eq!(found.target_key(), 0x0002);
        assert!(list.find(0x100C).is_none());

        assert!(table.get_list_for_block(0, 1).unwrap().entries.is_empty());
    }

    #[test]
    fn test_eight_byte_padding_ignored() {
        let mut raw = vec![1, 3, 7];
        raw.extend_from_slice(&1u32.to_le_bytes());
        raw.extend(entry(0xDEAD_0000, 3, 9, 8));

        let table = RelocationTable::parse(&raw, &raw_layout(EntryWidth::Eight)).unwrap();
        let list = table.get_list_for_block(3, 7).unwrap();
        assert_eq!(
            list.entries,
            vec![RelocationEntry {
                memory_offset: 0xDEAD_0000,
                target_module: 3,
                target_block_id: 9,
            }]
        );
    }

    #[test]
    fn test_stored_payload_header() {
        let records = entry(0x2000, 1, 1, 6);
        let mut raw = vec![1, 1, 0];
        raw.extend_from_slice(&1u32.to_le_bytes());
        for word in [0u32, 6, 0, 6, 0] {
            raw.extend_from_slice(&word.to_le_bytes());
        }
        raw.extend(records);

        let table = RelocationTable::parse(&raw, &RelocationLayout::default()).unwrap();
        assert_eq!(table.lists()[0].entries[0].memory_offset, 0x2000);
    }

    #[test]
    fn test_wrong_width_is_variant_mismatch() {
        let mut raw = vec![1, 0, 0];
        raw.extend_from_slice(&2u32.to_le_bytes());
        raw.extend(entry(0x1004, 0, 1, 6));
        raw.extend(entry(0x1008, 0, 1, 6));

        let result = RelocationTable::parse(&raw, &raw_layout(EntryWidth::Eight));
        assert!(matches!(result, Err(SnaError::UnsupportedVariant(_))));
    }

    #[test]
    fn test_truncated_later_list() {
        let mut raw = vec![2, 0, 0];
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw.extend_from_slice(&[0, 1, 5]);

        let result = RelocationTable::parse(&raw, &raw_layout(EntryWidth::Six));
        assert!(matches!(result, Err(SnaError::Truncated { .. })));
    }

    #[test]
    fn test_index() {
        let table = RelocationTable::from_lists(vec![RelocationList {
            module: 1,
            block_id: 2,
            entries: vec![RelocationEntry {
                memory_offset: 0x10,
                target_module: 1,
                target_block_id: 3,
            }],
        }]);
        let index = table.index();
        assert_eq!(index[&0x0102][&0x10].target_block_id, 3);
    }
}
