//! Parquets — all points of one time series within one time window.
//!
//! A parquet is a `parquetNNNN/` directory holding a `metadata.db` record
//! and one `rowgroupNNNN/` subdirectory per row group.  The active row
//! group rolls over when it reaches the configured row count; `close`
//! saves the active group and writes the parquet-level metadata
//! (including `sum_value`, which makes whole-parquet averages cheap).
//!
//! The [`ParquetManager`] routes flushed series to the right parquet
//! within the current window: on a series change it closes the active
//! parquet, then either reopens an existing directory whose metadata
//! matches the series hash or creates a fresh one.


use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::encoding::{Decode, Encode, EncodingError};
use crate::rowgroup::{RowGroup, RowGroupError};
use crate::series::Point;
use crate::store::{PageStore, StoreError};

/// Metadata file name within a parquet directory.
pub const METADATA_FILE: &str = "metadata.db";

/// Format a parquet directory name, e.g. `parquet0003`.
pub fn dir_name(index: u64) -> String {
    format!("parquet{index:04}")
}

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced by parquet operations.
#[derive(Debug, Error)]
pub enum ParquetError {
    /// Underlying row-group failure.
    #[error("row group error: {0}")]
    RowGroup(#[from] RowGroupError),

    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Metadata record failed to decode.
    #[error("metadata error: {0}")]
    Encoding(#[from] EncodingError),

    /// Directory creation or listing failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// Metadata
// ------------------------------------------------------------------------------------------------

/// The persisted parquet metadata record.
///
/// Wire format (big-endian): `min_ts | max_ts | points | min_value |
/// max_value | sum_value | hash_len | hash`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParquetMeta {
    /// Smallest timestamp in the parquet.
    pub min_timestamp: u64,
    /// Largest timestamp in the parquet.
    pub max_timestamp: u64,
    /// Total number of points.
    pub points: u64,
    /// Smallest value.
    pub min_value: f64,
    /// Largest value.
    pub max_value: f64,
    /// Sum of all values.
    pub sum_value: f64,
    /// Hex SHA-256 identity of the series this parquet belongs to.
    pub series_hash: String,
}

impl ParquetMeta {
    /// Metadata for an empty parquet bound to `series_hash`.
    pub fn new(series_hash: String) -> Self {
        Self {
            min_timestamp: u64::MAX,
            max_timestamp: 0,
            points: 0,
            min_value: f64::INFINITY,
            max_value: f64::NEG_INFINITY,
            sum_value: 0.0,
            series_hash,
        }
    }

    /// Fold one point into the aggregate fields.
    pub fn update(&mut self, point: &Point) {
        self.min_timestamp = self.min_timestamp.min(point.timestamp);
        self.max_timestamp = self.max_timestamp.max(point.timestamp);
        self.min_value = self.min_value.min(point.value);
        self.max_value = self.max_value.max(point.value);
        self.sum_value += point.value;
        self.points += 1;
    }

    /// Whether `[min, max]` overlaps this parquet's timestamp interval.
    pub fn overlaps(&self, min: u64, max: u64) -> bool {
        self.min_timestamp <= max && self.max_timestamp >= min
    }
}

impl Encode for ParquetMeta {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.min_timestamp.encode_to(buf);
        self.max_timestamp.encode_to(buf);
        self.points.encode_to(buf);
        self.min_value.encode_to(buf);
        self.max_value.encode_to(buf);
        self.sum_value.encode_to(buf);
        self.series_hash.encode_to(buf);
    }
}

impl Decode for ParquetMeta {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (min_timestamp, mut offset) = u64::decode_from(buf)?;
        let (max_timestamp, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (points, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (min_value, n) = f64::decode_from(&buf[offset..])?;
        offset += n;
        let (max_value, n) = f64::decode_from(&buf[offset..])?;
        offset += n;
        let (sum_value, n) = f64::decode_from(&buf[offset..])?;
        offset += n;
        let (series_hash, n) = String::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                min_timestamp,
                max_timestamp,
                points,
                min_value,
                max_value,
                sum_value,
                series_hash,
            },
            offset,
        ))
    }
}

/// Read and decode a parquet metadata record from `dir/metadata.db`.
pub fn read_meta(store: &mut PageStore, dir: &Path) -> Result<ParquetMeta, ParquetError> {
    let bytes = store.read_structure(&dir.join(METADATA_FILE), 0)?;
    let (meta, _) = ParquetMeta::decode_from(&bytes)?;
    Ok(meta)
}

// ------------------------------------------------------------------------------------------------
// Parquet
// ------------------------------------------------------------------------------------------------

/// A writable parquet: metadata, its directory, and the active row group.
#[derive(Debug)]
pub struct Parquet {
    dir: PathBuf,
    meta: ParquetMeta,
    active: RowGroup,
    row_group_size: u64,
}

impl Parquet {
    /// Create a fresh parquet directory under `window_dir`.
    pub fn create(
        store: &mut PageStore,
        window_dir: &Path,
        index: u64,
        series_hash: String,
        row_group_size: u64,
    ) -> Result<Self, ParquetError> {
        let dir = window_dir.join(dir_name(index));
        fs::create_dir_all(&dir)?;
        let active = RowGroup::create(store, &dir, 0)?;
        debug!(dir = %dir.display(), "parquet created");
        Ok(Self {
            dir,
            meta: ParquetMeta::new(series_hash),
            active,
            row_group_size,
        })
    }

    /// Reopen a saved parquet in append mode, loading its highest-index
    /// row group as the active one.
    pub fn load(
        store: &mut PageStore,
        dir: &Path,
        meta: ParquetMeta,
        row_group_size: u64,
    ) -> Result<Self, ParquetError> {
        let mut last: Option<(u64, PathBuf)> = None;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(index) = name
                .strip_prefix("rowgroup")
                .and_then(|s| s.parse::<u64>().ok())
                && last.as_ref().is_none_or(|(max, _)| index > *max)
            {
                last = Some((index, entry.path()));
            }
        }

        let active = match last {
            Some((_, rg_dir)) => RowGroup::load(store, &rg_dir)?,
            None => RowGroup::create(store, dir, 0)?,
        };

        debug!(dir = %dir.display(), rows = active.points(), "parquet reopened");
        Ok(Self {
            dir: dir.to_path_buf(),
            meta,
            active,
            row_group_size,
        })
    }

    /// Append one point, rolling the row group over when it reaches the
    /// configured size.
    pub fn add_point(&mut self, store: &mut PageStore, point: &Point) -> Result<(), ParquetError> {
        if self.active.points() >= self.row_group_size {
            self.active.save(store)?;
            let next_index = self.active.meta().row_group_index + 1;
            self.active = RowGroup::create(store, &self.dir, next_index)?;
        }
        self.active.add_point(store, point)?;
        self.meta.update(point);
        Ok(())
    }

    /// Save the active row group and write the parquet metadata record.
    pub fn close(&mut self, store: &mut PageStore) -> Result<(), ParquetError> {
        self.active.save(store)?;
        let bytes = crate::encoding::encode_to_vec(&self.meta);
        store.write_structure(&bytes, &self.dir.join(METADATA_FILE), 0)?;
        debug!(dir = %self.dir.display(), points = self.meta.points, "parquet closed");
        Ok(())
    }

    /// The parquet's aggregate metadata.
    pub fn meta(&self) -> &ParquetMeta {
        &self.meta
    }

    /// The parquet's directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

// ------------------------------------------------------------------------------------------------
// ParquetManager
// ------------------------------------------------------------------------------------------------

/// Routes flushed points to parquets within the current time window.
#[derive(Debug)]
pub struct ParquetManager {
    window_path: PathBuf,
    active: Option<Parquet>,
    active_hash: String,
    next_index: u64,
    row_group_size: u64,
}

impl ParquetManager {
    /// Create a manager targeting `window_path`.
    pub fn new(window_path: PathBuf, row_group_size: u64) -> Result<Self, ParquetError> {
        let next_index = next_parquet_index(&window_path)?;
        Ok(Self {
            window_path,
            active: None,
            active_hash: String::new(),
            next_index,
            row_group_size,
        })
    }

    /// Re-target the manager at a different window directory, dropping any
    /// active parquet state.
    pub fn retarget(&mut self, window_path: PathBuf) -> Result<(), ParquetError> {
        self.next_index = next_parquet_index(&window_path)?;
        self.window_path = window_path;
        self.active = None;
        self.active_hash.clear();
        Ok(())
    }

    /// Append `points` (in order) to the parquet owning `series_hash`.
    ///
    /// On a series change the current parquet is closed first, then an
    /// existing parquet with a matching hash is reopened, or a fresh one
    /// is created.
    pub fn flush_series(
        &mut self,
        store: &mut PageStore,
        series_hash: &str,
        points: &[Point],
    ) -> Result<(), ParquetError> {
        if self.active_hash != series_hash {
            if let Some(active) = self.active.as_mut() {
                active.close(store)?;
            }

            self.active = match self.find_parquet(store, series_hash)? {
                Some((dir, meta)) => Some(Parquet::load(store, &dir, meta, self.row_group_size)?),
                None => {
                    let parquet = Parquet::create(
                        store,
                        &self.window_path,
                        self.next_index,
                        series_hash.to_string(),
                        self.row_group_size,
                    )?;
                    self.next_index += 1;
                    Some(parquet)
                }
            };
            self.active_hash = series_hash.to_string();
        }

        if let Some(active) = self.active.as_mut() {
            for point in points {
                active.add_point(store, point)?;
            }
        }
        Ok(())
    }

    /// Flush every series group, then close the final parquet.
    pub fn flush_all(
        &mut self,
        store: &mut PageStore,
        groups: &[(String, Vec<Point>)],
    ) -> Result<(), ParquetError> {
        for (hash, points) in groups {
            self.flush_series(store, hash, points)?;
        }
        if let Some(mut active) = self.active.take() {
            active.close(store)?;
        }
        self.active_hash.clear();
        Ok(())
    }

    /// Scan the window directory for a parquet whose metadata carries
    /// `series_hash`, returning its directory and metadata.
    fn find_parquet(
        &self,
        store: &mut PageStore,
        series_hash: &str,
    ) -> Result<Option<(PathBuf, ParquetMeta)>, ParquetError> {
        for entry in fs::read_dir(&self.window_path)? {
            let entry = entry?;
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let meta = match read_meta(store, &dir) {
                Ok(meta) => meta,
                Err(e) => {
                    // A parquet without readable metadata was never closed;
                    // skip it rather than fail the whole flush.
                    warn!(dir = %dir.display(), error = %e, "skipping unreadable parquet metadata");
                    continue;
                }
            };
            if meta.series_hash == series_hash {
                return Ok(Some((dir, meta)));
            }
        }
        Ok(None)
    }
}

/// Next free `parquetNNNN` index under `window_path`.
fn next_parquet_index(window_path: &Path) -> Result<u64, ParquetError> {
    let mut next = 0;
    for entry in fs::read_dir(window_path)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(index) = name
            .strip_prefix("parquet")
            .and_then(|s| s.parse::<u64>().ok())
        {
            next = next.max(index + 1);
        }
    }
    Ok(next)
}
