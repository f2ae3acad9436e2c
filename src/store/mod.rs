//! Page store — positional file I/O for pages and structures.
//!
//! The store is the only component that touches the filesystem for column
//! and WAL data.  It distinguishes two kinds of reads and writes:
//!
//! - **Pages** — fixed-size blocks, cached in the [`BufferPool`].  Writes
//!   are write-through: the cache is refreshed only when the page was
//!   already present, never populated on a write miss.
//! - **Structures** — variable-length records (metadata blobs) prefixed
//!   with an 8-byte big-endian length, read once and never cached.
//!
//! File handles are opened per call and closed on return; there are no
//! long-lived descriptors.  `remove` deletes a file or directory tree and
//! evicts every matching cache entry.

#[cfg(test)]
mod tests;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, trace};

use crate::page::Page;
use crate::pool::BufferPool;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read returned fewer bytes than requested.
    #[error("short read of {path} at offset {offset}")]
    ShortRead {
        /// File being read.
        path: String,
        /// Offset of the failed read.
        offset: u64,
    },

    /// A structure length prefix exceeded the sanity limit.
    #[error("structure length {0} exceeds limit")]
    StructureTooLarge(u64),
}

/// Upper bound on a structure payload (metadata records are tiny).
const MAX_STRUCTURE_LEN: u64 = 16 * 1024 * 1024;

// ------------------------------------------------------------------------------------------------
// PageStore
// ------------------------------------------------------------------------------------------------

/// Positional I/O over the filesystem with page caching.
#[derive(Debug)]
pub struct PageStore {
    page_size: u64,
    pool: BufferPool,
}

impl PageStore {
    /// Create a store for `page_size`-byte pages with a pool of
    /// `pool_capacity` cached pages.
    pub fn new(page_size: u64, pool_capacity: u64) -> Self {
        Self {
            page_size,
            pool: BufferPool::new(pool_capacity),
        }
    }

    /// The configured page size in bytes.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Read the page at `offset`, serving from the cache when possible.
    pub fn read_page(&mut self, path: &Path, offset: u64) -> Result<Vec<u8>, StoreError> {
        if let Some(bytes) = self.pool.get(path, offset) {
            trace!(path = %path.display(), offset, "page cache hit");
            return Ok(bytes.clone());
        }

        let bytes = self.read_bytes(path, offset, self.page_size)?;
        self.pool.put(bytes.clone(), path, offset);
        Ok(bytes)
    }

    /// Serialize `page` and write it at `offset`.
    ///
    /// The cache entry is refreshed only when one already exists — a write
    /// never populates the pool on a miss.
    pub fn write_page<P: Page>(
        &mut self,
        page: &P,
        path: &Path,
        offset: u64,
    ) -> Result<(), StoreError> {
        let bytes = page.serialize();
        self.write_bytes(path, offset, &bytes)?;
        if self.pool.contains(path, offset) {
            self.pool.put(bytes, path, offset);
        }
        trace!(path = %path.display(), offset, count = page.entry_count(), "page written");
        Ok(())
    }

    /// Write a variable-length structure: 8-byte big-endian length prefix,
    /// then the payload.
    pub fn write_structure(
        &mut self,
        data: &[u8],
        path: &Path,
        offset: u64,
    ) -> Result<(), StoreError> {
        let mut file = open_for_write(path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&(data.len() as u64).to_be_bytes())?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    }

    /// Read a variable-length structure written by
    /// [`PageStore::write_structure`].
    pub fn read_structure(&mut self, path: &Path, offset: u64) -> Result<Vec<u8>, StoreError> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes).map_err(|e| map_short(e, path, offset))?;
        let len = u64::from_be_bytes(len_bytes);
        if len > MAX_STRUCTURE_LEN {
            return Err(StoreError::StructureTooLarge(len));
        }

        let mut data = vec![0u8; len as usize];
        file.read_exact(&mut data).map_err(|e| map_short(e, path, offset))?;
        Ok(data)
    }

    /// Read exactly `length` raw bytes at `offset`.
    pub fn read_bytes(&mut self, path: &Path, offset: u64, length: u64) -> Result<Vec<u8>, StoreError> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut bytes = vec![0u8; length as usize];
        file.read_exact(&mut bytes).map_err(|e| map_short(e, path, offset))?;
        Ok(bytes)
    }

    /// Write raw bytes at `offset`, creating the file when absent.
    pub fn write_bytes(&mut self, path: &Path, offset: u64, bytes: &[u8]) -> Result<(), StoreError> {
        let mut file = open_for_write(path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    }

    /// Create an empty file (no-op when it already exists).
    pub fn create_file(&mut self, path: &Path) -> Result<(), StoreError> {
        OpenOptions::new().create(true).append(true).open(path)?;
        Ok(())
    }

    /// Delete a file or directory tree and evict every matching cache
    /// entry.
    pub fn remove(&mut self, path: &Path) -> Result<(), StoreError> {
        self.pool.remove_prefix(path);
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else if path.exists() {
            fs::remove_file(path)?;
        }
        debug!(path = %path.display(), "removed");
        Ok(())
    }

    /// Direct access to the pool, for tests and cache inspection.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

/// Open for writing without truncation, creating the file when absent.
fn open_for_write(path: &Path) -> Result<File, StoreError> {
    Ok(OpenOptions::new()
        .write(true)
        .create(true)
        .open(path)?)
}

/// Turn an `UnexpectedEof` from `read_exact` into a [`StoreError::ShortRead`].
fn map_short(e: io::Error, path: &Path, offset: u64) -> StoreError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        StoreError::ShortRead {
            path: path.display().to_string(),
            offset,
        }
    } else {
        StoreError::Io(e)
    }
}
