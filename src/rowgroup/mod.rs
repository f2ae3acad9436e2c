//! Row groups — the unit of columnar persistence.
//!
//! A row group wraps three column chunks sharing a single row index: row
//! `i` of `timestamp.db` corresponds to row `i` of `value.db` and bit `i`
//! of `delete.db`.  Its metadata record tracks min/max timestamp and
//! value, the row count, the group's index within its parquet, and the
//! tail offset of each chunk so a later reader can reopen the chunks in
//! append mode.
//!
//! On-disk layout: a `rowgroupNNNN/` directory holding `metadata.db`
//! (an 8-byte-length-prefixed structure at offset 0) plus the three
//! column files.

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::chunk::{ChunkError, TimestampChunk, TombstoneChunk, ValueChunk};
use crate::encoding::{Decode, Encode, EncodingError};
use crate::series::Point;
use crate::store::{PageStore, StoreError};

/// Column file names within a row-group directory.
pub const TIMESTAMP_FILE: &str = "timestamp.db";
pub const VALUE_FILE: &str = "value.db";
pub const DELETE_FILE: &str = "delete.db";
pub const METADATA_FILE: &str = "metadata.db";

/// Format a row-group directory name, e.g. `rowgroup0007`.
pub fn dir_name(index: u64) -> String {
    format!("rowgroup{index:04}")
}

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced by row-group operations.
#[derive(Debug, Error)]
pub enum RowGroupError {
    /// Underlying chunk failure.
    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),

    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Metadata record failed to decode.
    #[error("metadata error: {0}")]
    Encoding(#[from] EncodingError),

    /// Directory creation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// Metadata
// ------------------------------------------------------------------------------------------------

/// The persisted row-group metadata record.
///
/// Wire format (big-endian): `min_ts | max_ts | min_value | max_value |
/// points | row_group_index | timestamp_offset | value_offset |
/// delete_offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowGroupMeta {
    /// Smallest timestamp in the group.
    pub min_timestamp: u64,
    /// Largest timestamp in the group.
    pub max_timestamp: u64,
    /// Smallest value in the group.
    pub min_value: f64,
    /// Largest value in the group.
    pub max_value: f64,
    /// Number of rows.
    pub points: u64,
    /// Index of this group within its parquet.
    pub row_group_index: u64,
    /// Tail offset of `timestamp.db`.
    pub timestamp_offset: u64,
    /// Tail offset of `value.db`.
    pub value_offset: u64,
    /// Tail offset of `delete.db`.
    pub delete_offset: u64,
}

impl RowGroupMeta {
    /// Metadata for an empty group with the given index.
    pub fn new(row_group_index: u64) -> Self {
        Self {
            min_timestamp: u64::MAX,
            max_timestamp: 0,
            min_value: f64::INFINITY,
            max_value: f64::NEG_INFINITY,
            points: 0,
            row_group_index,
            timestamp_offset: 0,
            value_offset: 0,
            delete_offset: 0,
        }
    }

    /// Fold one point into the min/max/count fields.
    pub fn update(&mut self, point: &Point) {
        self.min_timestamp = self.min_timestamp.min(point.timestamp);
        self.max_timestamp = self.max_timestamp.max(point.timestamp);
        self.min_value = self.min_value.min(point.value);
        self.max_value = self.max_value.max(point.value);
        self.points += 1;
    }

    /// Whether `[min, max]` overlaps this group's timestamp interval.
    pub fn overlaps(&self, min: u64, max: u64) -> bool {
        self.min_timestamp <= max && self.max_timestamp >= min
    }
}

impl Encode for RowGroupMeta {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.min_timestamp.encode_to(buf);
        self.max_timestamp.encode_to(buf);
        self.min_value.encode_to(buf);
        self.max_value.encode_to(buf);
        self.points.encode_to(buf);
        self.row_group_index.encode_to(buf);
        self.timestamp_offset.encode_to(buf);
        self.value_offset.encode_to(buf);
        self.delete_offset.encode_to(buf);
    }
}

impl Decode for RowGroupMeta {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let mut read_u64 = |buf: &[u8]| -> Result<u64, EncodingError> {
            let (v, n) = u64::decode_from(&buf[offset..])?;
            offset += n;
            Ok(v)
        };
        let min_timestamp = read_u64(buf)?;
        let max_timestamp = read_u64(buf)?;
        let min_value = f64::from_bits(read_u64(buf)?);
        let max_value = f64::from_bits(read_u64(buf)?);
        let points = read_u64(buf)?;
        let row_group_index = read_u64(buf)?;
        let timestamp_offset = read_u64(buf)?;
        let value_offset = read_u64(buf)?;
        let delete_offset = read_u64(buf)?;
        Ok((
            Self {
                min_timestamp,
                max_timestamp,
                min_value,
                max_value,
                points,
                row_group_index,
                timestamp_offset,
                value_offset,
                delete_offset,
            },
            offset,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// RowGroup
// ------------------------------------------------------------------------------------------------

/// A writable row group: metadata plus three column chunks.
#[derive(Debug)]
pub struct RowGroup {
    dir: PathBuf,
    meta: RowGroupMeta,
    timestamps: TimestampChunk,
    values: ValueChunk,
    tombstones: TombstoneChunk,
}

impl RowGroup {
    /// Create a fresh row group directory under `parquet_dir`.
    pub fn create(
        store: &mut PageStore,
        parquet_dir: &Path,
        index: u64,
    ) -> Result<Self, RowGroupError> {
        let dir = parquet_dir.join(dir_name(index));
        fs::create_dir_all(&dir)?;

        let timestamps = TimestampChunk::create(store, &dir.join(TIMESTAMP_FILE))?;
        let values = ValueChunk::create(store, &dir.join(VALUE_FILE))?;
        let tombstones = TombstoneChunk::create(store, &dir.join(DELETE_FILE))?;

        Ok(Self {
            dir,
            meta: RowGroupMeta::new(index),
            timestamps,
            values,
            tombstones,
        })
    }

    /// Append one point — a live row across all three columns.
    pub fn add_point(&mut self, store: &mut PageStore, point: &Point) -> Result<(), RowGroupError> {
        self.meta.update(point);
        self.timestamps.add(store, point.timestamp)?;
        self.values.add(store, point.value)?;
        self.tombstones.add(store, false)?;
        Ok(())
    }

    /// Persist the three active pages and then the metadata record at
    /// offset 0 of `metadata.db`, recording each chunk's tail offset.
    pub fn save(&mut self, store: &mut PageStore) -> Result<(), RowGroupError> {
        self.timestamps.save(store)?;
        self.values.save(store)?;
        self.tombstones.save(store)?;

        self.meta.timestamp_offset = self.timestamps.tail_offset();
        self.meta.value_offset = self.values.tail_offset();
        self.meta.delete_offset = self.tombstones.tail_offset();

        let bytes = crate::encoding::encode_to_vec(&self.meta);
        store.write_structure(&bytes, &self.dir.join(METADATA_FILE), 0)?;
        Ok(())
    }

    /// Reopen a saved row group in append mode.
    pub fn load(store: &mut PageStore, dir: &Path) -> Result<Self, RowGroupError> {
        let meta = read_meta(store, dir)?;
        let timestamps =
            TimestampChunk::load(store, &dir.join(TIMESTAMP_FILE), meta.timestamp_offset)?;
        let values = ValueChunk::load(store, &dir.join(VALUE_FILE), meta.value_offset)?;
        let tombstones = TombstoneChunk::load(store, &dir.join(DELETE_FILE), meta.delete_offset)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            meta,
            timestamps,
            values,
            tombstones,
        })
    }

    /// Number of rows in the group.
    pub fn points(&self) -> u64 {
        self.meta.points
    }

    /// The group's metadata as currently accumulated.
    pub fn meta(&self) -> &RowGroupMeta {
        &self.meta
    }

    /// The group's directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Read and decode a row-group metadata record from `dir/metadata.db`.
pub fn read_meta(store: &mut PageStore, dir: &Path) -> Result<RowGroupMeta, RowGroupError> {
    let bytes = store.read_structure(&dir.join(METADATA_FILE), 0)?;
    let (meta, _) = RowGroupMeta::decode_from(&bytes)?;
    Ok(meta)
}
