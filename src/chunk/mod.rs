//! Column chunks — page writers for one column of one row group.
//!
//! A chunk owns a file path, a monotonic write offset, and one active
//! page.  `add` appends to the active page; when the page reports no
//! room, the chunk flushes it at the current offset, advances the offset
//! by one page size, allocates a fresh page, and re-attempts the append
//! (re-encoding the entry, since codec state resets on a page boundary).
//!
//! `save` flushes the active page **without** advancing the offset, so
//! the page can keep growing across flushes; `load` reopens a chunk in
//! append mode by reading the page at the recorded tail offset and
//! restoring codec continuation state.

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::page::{PageError, TimestampPage, TombstonePage, ValuePage};
use crate::store::{PageStore, StoreError};

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced by chunk operations.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A page failed to round-trip.
    #[error("page error: {0}")]
    Page(#[from] PageError),

    /// An entry did not fit even on a fresh page.
    #[error("entry does not fit in an empty page of {0} bytes")]
    EntryTooLarge(u64),
}

// ------------------------------------------------------------------------------------------------
// Timestamp chunk
// ------------------------------------------------------------------------------------------------

/// Writer for a `timestamp.db` column file.
#[derive(Debug)]
pub struct TimestampChunk {
    path: PathBuf,
    offset: u64,
    active: TimestampPage,
}

impl TimestampChunk {
    /// Create a fresh chunk backed by a new file.
    pub fn create(store: &mut PageStore, path: &Path) -> Result<Self, ChunkError> {
        store.create_file(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            offset: 0,
            active: TimestampPage::new(store.page_size()),
        })
    }

    /// Append a timestamp, spilling the active page when full.
    pub fn add(&mut self, store: &mut PageStore, timestamp: u64) -> Result<(), ChunkError> {
        if self.active.try_add(timestamp) {
            return Ok(());
        }
        store.write_page(&self.active, &self.path, self.offset)?;
        self.offset += store.page_size();
        self.active = TimestampPage::new(store.page_size());
        if !self.active.try_add(timestamp) {
            return Err(ChunkError::EntryTooLarge(store.page_size()));
        }
        Ok(())
    }

    /// Persist the active page at the current offset without advancing.
    pub fn save(&mut self, store: &mut PageStore) -> Result<(), ChunkError> {
        store.write_page(&self.active, &self.path, self.offset)?;
        Ok(())
    }

    /// Reopen the chunk in append mode at the recorded tail offset.
    pub fn load(store: &mut PageStore, path: &Path, offset: u64) -> Result<Self, ChunkError> {
        let bytes = store.read_page(path, offset)?;
        let (active, _) = TimestampPage::deserialize(&bytes)?;
        Ok(Self {
            path: path.to_path_buf(),
            offset,
            active,
        })
    }

    /// Offset of the active (tail) page.
    pub fn tail_offset(&self) -> u64 {
        self.offset
    }
}

// ------------------------------------------------------------------------------------------------
// Value chunk
// ------------------------------------------------------------------------------------------------

/// Writer for a `value.db` column file.
#[derive(Debug)]
pub struct ValueChunk {
    path: PathBuf,
    offset: u64,
    active: ValuePage,
}

impl ValueChunk {
    /// Create a fresh chunk backed by a new file.
    pub fn create(store: &mut PageStore, path: &Path) -> Result<Self, ChunkError> {
        store.create_file(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            offset: 0,
            active: ValuePage::new(store.page_size()),
        })
    }

    /// Append a value, spilling the active page when full.
    ///
    /// The entry is re-compressed against the fresh page after a spill —
    /// the XOR window state resets on a page boundary.
    pub fn add(&mut self, store: &mut PageStore, value: f64) -> Result<(), ChunkError> {
        if self.active.try_add(value) {
            return Ok(());
        }
        store.write_page(&self.active, &self.path, self.offset)?;
        self.offset += store.page_size();
        self.active = ValuePage::new(store.page_size());
        if !self.active.try_add(value) {
            return Err(ChunkError::EntryTooLarge(store.page_size()));
        }
        Ok(())
    }

    /// Persist the active page at the current offset without advancing.
    pub fn save(&mut self, store: &mut PageStore) -> Result<(), ChunkError> {
        store.write_page(&self.active, &self.path, self.offset)?;
        Ok(())
    }

    /// Reopen the chunk in append mode at the recorded tail offset.
    pub fn load(store: &mut PageStore, path: &Path, offset: u64) -> Result<Self, ChunkError> {
        let bytes = store.read_page(path, offset)?;
        let (active, _) = ValuePage::deserialize(&bytes)?;
        Ok(Self {
            path: path.to_path_buf(),
            offset,
            active,
        })
    }

    /// Offset of the active (tail) page.
    pub fn tail_offset(&self) -> u64 {
        self.offset
    }
}

// ------------------------------------------------------------------------------------------------
// Tombstone chunk
// ------------------------------------------------------------------------------------------------

/// Writer for a `delete.db` column file — one bit per row.
#[derive(Debug)]
pub struct TombstoneChunk {
    path: PathBuf,
    offset: u64,
    active: TombstonePage,
}

impl TombstoneChunk {
    /// Create a fresh chunk backed by a new file.
    pub fn create(store: &mut PageStore, path: &Path) -> Result<Self, ChunkError> {
        store.create_file(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            offset: 0,
            active: TombstonePage::new(store.page_size()),
        })
    }

    /// Append one row's deletion bit, spilling the active page when full.
    pub fn add(&mut self, store: &mut PageStore, deleted: bool) -> Result<(), ChunkError> {
        if self.active.try_add(deleted) {
            return Ok(());
        }
        store.write_page(&self.active, &self.path, self.offset)?;
        self.offset += store.page_size();
        self.active = TombstonePage::new(store.page_size());
        if !self.active.try_add(deleted) {
            return Err(ChunkError::EntryTooLarge(store.page_size()));
        }
        Ok(())
    }

    /// Persist the active page at the current offset without advancing.
    pub fn save(&mut self, store: &mut PageStore) -> Result<(), ChunkError> {
        store.write_page(&self.active, &self.path, self.offset)?;
        Ok(())
    }

    /// Reopen the chunk in append mode at the recorded tail offset.
    pub fn load(store: &mut PageStore, path: &Path, offset: u64) -> Result<Self, ChunkError> {
        let bytes = store.read_page(path, offset)?;
        let active = TombstonePage::deserialize(&bytes)?;
        Ok(Self {
            path: path.to_path_buf(),
            offset,
            active,
        })
    }

    /// Offset of the active (tail) page.
    pub fn tail_offset(&self) -> u64 {
        self.offset
    }
}
