//! A saved level: one container and, usually, its relocation table
//!
//! Levels ship as a `.sna` snapshot next to an `.rtb` table with the same
//! stem. Some fixed data containers carry no pointers and have no table.

use crate::container::Container;
use crate::relocation::RelocationTable;
use crate::resolver::Resolver;
use std::path::{Path, PathBuf};

/// Extension of the level relocation table
pub const LEVEL_RELOCATION_EXTENSION: &str = "rtb";

/// Container plus optional relocation table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Level {
    /// The snapshot
    pub container: Container,
    /// Pointer sites, if the table was found
    pub relocations: Option<RelocationTable>,
}

impl Level {
    /// Pair a container with its table
    pub fn new(container: Container, relocations: Option<RelocationTable>) -> Self {
        Self {
            container,
            relocations,
        }
    }

    /// Level name (the container's file stem)
    pub fn name(&self) -> &str {
        self.container.name()
    }

    /// Whether a relocation table was loaded
    pub fn has_relocations(&self) -> bool {
        self.relocations.is_some()
    }

    /// Build a resolver; a missing table resolves nothing
    pub fn into_resolver(self) -> Resolver {
        Resolver::new(self.container, self.relocations.unwrap_or_default())
    }
}

/// Path of the relocation table that belongs to `sna_path`
pub fn relocation_path_for(sna_path: &Path) -> PathBuf {
    sna_path.with_extension(LEVEL_RELOCATION_EXTENSION)
}
