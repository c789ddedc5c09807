//! Async container loading
//!
//! Block records have to be located one after another, but once located the
//! payloads are independent. The loader walks the headers on the calling task
//! and fans the decompression out to blocking workers, keeping block order.

use crate::container::{record_error, scan_blocks, Container};
use crate::level::{relocation_path_for, Level};
use crate::relocation::RelocationTable;
use crate::{file_stem, FormatProfile, Result, SnaError};
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::Path;
use tokio::task::JoinError;

/// Loads containers with concurrent block decompression
#[derive(Debug, Clone)]
pub struct AsyncContainerLoader {
    concurrency: usize,
    profile: FormatProfile,
}

impl Default for AsyncContainerLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncContainerLoader {
    /// Create a loader using one worker per CPU and the Montreal profile
    pub fn new() -> Self {
        Self {
            concurrency: num_cpus::get(),
            profile: FormatProfile::montreal(),
        }
    }

    /// Set the number of blocks decompressed at once
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    /// Set the format profile
    pub fn with_profile(mut self, profile: FormatProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Blocks decompressed at once
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Format profile in use
    pub fn profile(&self) -> &FormatProfile {
        &self.profile
    }

    /// Parse a raw container image
    pub async fn load_bytes(&self, raw: Bytes) -> Result<Container> {
        let raw = self.unmask(raw)?;
        let scan = scan_blocks(&raw)?;
        log::debug!(
            "decompressing {} blocks with {} workers",
            scan.locations.len(),
            self.concurrency
        );

        let blocks: Vec<_> = stream::iter(scan.locations.into_iter().enumerate().map(
            |(index, location)| {
                let raw = raw.clone();
                async move {
                    tokio::task::spawn_blocking(move || location.load(&raw))
                        .await
                        .map_err(join_error)?
                        .map_err(|err| record_error(index, err))
                }
            },
        ))
        .buffered(self.concurrency)
        .try_collect()
        .await?;

        Ok(Container::from_blocks(blocks, scan.consumed, scan.terminated))
    }

    /// Read and parse a container file
    pub async fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<Container> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await?;
        let container = self.load_bytes(Bytes::from(raw)).await?;
        Ok(container.with_name(file_stem(path)))
    }

    /// Read and parse a relocation table file
    pub async fn load_relocation_file<P: AsRef<Path>>(&self, path: P) -> Result<RelocationTable> {
        let raw = self.unmask(Bytes::from(tokio::fs::read(path).await?))?;
        let layout = self.profile.relocation;
        tokio::task::spawn_blocking(move || RelocationTable::parse(&raw, &layout))
            .await
            .map_err(join_error)?
    }

    /// Read a `.sna` container and its sibling `.rtb` table, if present
    pub async fn load_level<P: AsRef<Path>>(&self, sna_path: P) -> Result<Level> {
        let sna_path = sna_path.as_ref();
        let rtb_path = relocation_path_for(sna_path);
        let has_table = tokio::fs::try_exists(&rtb_path).await?;

        let (container, relocations) = futures::try_join!(self.load_file(sna_path), async {
            if has_table {
                self.load_relocation_file(&rtb_path).await.map(Some)
            } else {
                log::warn!("no relocation table next to {}", sna_path.display());
                Ok(None)
            }
        })?;

        Ok(Level::new(container, relocations))
    }

    fn unmask(&self, raw: Bytes) -> Result<Bytes> {
        match &self.profile.cipher {
            Some(mask) => mask.apply(&raw).map(Bytes::from),
            None => Ok(raw),
        }
    }
}

fn join_error(err: JoinError) -> SnaError {
    SnaError::Io(std::io::Error::other(err))
}

/// Open a Montreal container file asynchronously
pub async fn open_container_async<P: AsRef<Path>>(path: P) -> Result<Container> {
    AsyncContainerLoader::new().load_file(path).await
}

/// Open a relocation table file asynchronously
pub async fn open_relocation_table_async<P: AsRef<Path>>(
    path: P,
    profile: &FormatProfile,
) -> Result<RelocationTable> {
    AsyncContainerLoader::new()
        .with_profile(*profile)
        .load_relocation_file(path)
        .await
}

/// Open a level (`.sna` plus sibling `.rtb`) asynchronously
pub async fn open_level_async<P: AsRef<Path>>(
    sna_path: P,
    profile: &FormatProfile,
) -> Result<Level> {
    AsyncContainerLoader::new()
        .with_profile(*profile)
        .load_level(sna_path)
        .await
}
