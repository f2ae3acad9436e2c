//! Disk scan — range reads over the window / parquet / row-group tree.
//!
//! [`get`] walks the on-disk hierarchy top-down, pruning at every level
//! by metadata: windows whose interval misses the query range are
//! skipped, parquets are filtered by series hash and interval, row
//! groups by their metadata record.  Surviving row groups are read
//! through three [`ColumnIterator`]s in lockstep: the timestamp iterator
//! is positioned with [`ColumnIterator::skip`], the value and tombstone
//! iterators are advanced by the same row count, and rows whose
//! tombstone bit is set are dropped.
//!
//! All scans are iterative — one page is resident per column at a time.

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::trace;

use crate::page::{PageError, PageMeta, TimestampPage, TombstonePage, ValuePage};
use crate::parquet::{self, ParquetError};
use crate::rowgroup::{self, RowGroupError, DELETE_FILE, TIMESTAMP_FILE, VALUE_FILE};
use crate::series::{Point, TimeSeries};
use crate::store::{PageStore, StoreError};
use crate::window::{self, WindowError};

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced during a disk scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A column page failed to decode.
    #[error("page error: {0}")]
    Page(#[from] PageError),

    /// Parquet metadata failed to load.
    #[error("parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// Row-group metadata failed to load.
    #[error("row group error: {0}")]
    RowGroup(#[from] RowGroupError),

    /// Window listing failed.
    #[error("window error: {0}")]
    Window(#[from] WindowError),

    /// Directory listing failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The three column files of a row group disagree on row count.
    #[error("column desync in {0}")]
    ColumnDesync(String),
}

// ------------------------------------------------------------------------------------------------
// Column iterator
// ------------------------------------------------------------------------------------------------

/// Which column file an iterator decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// `timestamp.db` — u64 entries.
    Timestamp,
    /// `value.db` — f64 entries.
    Value,
    /// `delete.db` — one bit per row.
    Tombstone,
}

/// Entries of the currently loaded page, decoded eagerly.
#[derive(Debug)]
enum PageEntries {
    Timestamps(Vec<u64>),
    Values(Vec<f64>),
    Tombstones(Vec<bool>),
}

impl PageEntries {
    fn len(&self) -> usize {
        match self {
            PageEntries::Timestamps(v) => v.len(),
            PageEntries::Values(v) => v.len(),
            PageEntries::Tombstones(v) => v.len(),
        }
    }
}

/// One decoded column entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnEntry {
    /// A timestamp row.
    Timestamp(u64),
    /// A value row.
    Value(f64),
    /// A tombstone row.
    Tombstone(bool),
}

/// Forward iterator over one column file, loading a page at a time.
#[derive(Debug)]
pub struct ColumnIterator {
    kind: ColumnKind,
    path: PathBuf,
    file_size: u64,
    page_size: u64,
    /// Offset of the next page to load.
    next_page_offset: u64,
    meta: PageMeta,
    entries: PageEntries,
    /// Next entry index within the loaded page.
    index: usize,
}

impl ColumnIterator {
    /// Open an iterator over `path`, positioned at the first entry.
    pub fn new(store: &mut PageStore, path: &Path, kind: ColumnKind) -> Result<Self, ScanError> {
        let file_size = fs::metadata(path)?.len();
        let mut iterator = Self {
            kind,
            path: path.to_path_buf(),
            file_size,
            page_size: store.page_size(),
            next_page_offset: 0,
            meta: PageMeta::new(),
            entries: match kind {
                ColumnKind::Timestamp => PageEntries::Timestamps(Vec::new()),
                ColumnKind::Value => PageEntries::Values(Vec::new()),
                ColumnKind::Tombstone => PageEntries::Tombstones(Vec::new()),
            },
            index: 0,
        };
        iterator.load_next_page(store)?;
        Ok(iterator)
    }

    /// Load the page at `next_page_offset`; `false` means end of file.
    fn load_next_page(&mut self, store: &mut PageStore) -> Result<bool, ScanError> {
        if self.next_page_offset + self.page_size > self.file_size {
            return Ok(false);
        }
        let bytes = store.read_page(&self.path, self.next_page_offset)?;
        match self.kind {
            ColumnKind::Timestamp => {
                let (page, timestamps) = TimestampPage::deserialize(&bytes)?;
                self.meta = crate::page::Page::metadata(&page);
                self.entries = PageEntries::Timestamps(timestamps);
            }
            ColumnKind::Value => {
                let (page, values) = ValuePage::deserialize(&bytes)?;
                self.meta = crate::page::Page::metadata(&page);
                self.entries = PageEntries::Values(values);
            }
            ColumnKind::Tombstone => {
                let page = TombstonePage::deserialize(&bytes)?;
                self.meta = crate::page::Page::metadata(&page);
                self.entries = PageEntries::Tombstones(page.bits().to_vec());
            }
        }
        self.next_page_offset += self.page_size;
        self.index = 0;
        Ok(true)
    }

    /// The next entry without consuming it; `None` at end of file.
    pub fn peek(&mut self, store: &mut PageStore) -> Result<Option<ColumnEntry>, ScanError> {
        while self.index >= self.entries.len() {
            if !self.load_next_page(store)? {
                return Ok(None);
            }
        }
        Ok(Some(match &self.entries {
            PageEntries::Timestamps(v) => ColumnEntry::Timestamp(v[self.index]),
            PageEntries::Values(v) => ColumnEntry::Value(v[self.index]),
            PageEntries::Tombstones(v) => ColumnEntry::Tombstone(v[self.index]),
        }))
    }

    /// Consume and return the next entry; `None` at end of file.
    pub fn next_entry(&mut self, store: &mut PageStore) -> Result<Option<ColumnEntry>, ScanError> {
        let entry = self.peek(store)?;
        if entry.is_some() {
            self.index += 1;
        }
        Ok(entry)
    }

    /// Advance a **timestamp** iterator to the first entry with
    /// `timestamp >= min`, returning the number of rows bypassed.
    ///
    /// Pages whose metadata proves no overlap with `[min, max]` are
    /// skipped whole; within the first overlapping page entries advance
    /// one by one.  The matching entry itself is *not* consumed.
    pub fn skip(&mut self, store: &mut PageStore, min: u64, max: u64) -> Result<u64, ScanError> {
        let mut skipped: u64 = 0;

        // Whole-page skip while the page interval lies entirely below the
        // range.
        loop {
            if self.index >= self.entries.len() && !self.load_next_page(store)? {
                return Ok(skipped);
            }
            let overlaps = self.meta.min <= max && self.meta.max >= min;
            if overlaps {
                break;
            }
            skipped += (self.entries.len() - self.index) as u64;
            self.index = self.entries.len();
        }

        // Per-entry advance inside the overlapping page.
        while let Some(ColumnEntry::Timestamp(ts)) = self.peek(store)? {
            if ts >= min {
                break;
            }
            self.index += 1;
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Consume exactly `count` entries, page-skipping where possible.
    pub fn advance(&mut self, store: &mut PageStore, mut count: u64) -> Result<(), ScanError> {
        while count > 0 {
            let remaining = (self.entries.len() - self.index) as u64;
            if remaining == 0 {
                if !self.load_next_page(store)? {
                    return Err(ScanError::ColumnDesync(self.path.display().to_string()));
                }
                continue;
            }
            let step = remaining.min(count);
            self.index += step as usize;
            count -= step;
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Disk scan
// ------------------------------------------------------------------------------------------------

/// Collect every live on-disk point of `series` with timestamp in
/// `[min, max]`, in ascending order within each parquet.
pub fn get(
    store: &mut PageStore,
    windows_dir: &Path,
    series: &TimeSeries,
    min: u64,
    max: u64,
) -> Result<Vec<Point>, ScanError> {
    let hash = series.hash();
    let mut points = Vec::new();

    for (start, end, window_path) in window::list_windows(windows_dir)? {
        if start > max || end < min {
            continue;
        }
        scan_window(store, &window_path, &hash, min, max, &mut points)?;
    }
    Ok(points)
}

/// Scan one window directory for parquets of the series.
fn scan_window(
    store: &mut PageStore,
    window_path: &Path,
    hash: &str,
    min: u64,
    max: u64,
    points: &mut Vec<Point>,
) -> Result<(), ScanError> {
    for entry in fs::read_dir(window_path)? {
        let entry = entry?;
        let parquet_dir = entry.path();
        if !parquet_dir.is_dir() {
            continue;
        }
        let meta = match parquet::read_meta(store, &parquet_dir) {
            Ok(meta) => meta,
            // A parquet that was never closed has no metadata; skip it.
            Err(_) => continue,
        };
        if meta.series_hash != hash || !meta.overlaps(min, max) {
            continue;
        }
        trace!(dir = %parquet_dir.display(), "scanning parquet");
        scan_parquet(store, &parquet_dir, min, max, points)?;
    }
    Ok(())
}

/// Scan one parquet's row groups in index order.
fn scan_parquet(
    store: &mut PageStore,
    parquet_dir: &Path,
    min: u64,
    max: u64,
    points: &mut Vec<Point>,
) -> Result<(), ScanError> {
    let mut row_groups: Vec<(u64, PathBuf)> = Vec::new();
    for entry in fs::read_dir(parquet_dir)? {
        let entry = entry?;
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(index) = name
            .strip_prefix("rowgroup")
            .and_then(|s| s.parse::<u64>().ok())
        {
            row_groups.push((index, dir));
        }
    }
    row_groups.sort_unstable_by_key(|(index, _)| *index);

    for (_, rg_dir) in row_groups {
        let meta = rowgroup::read_meta(store, &rg_dir)?;
        if !meta.overlaps(min, max) {
            continue;
        }
        scan_row_group(store, &rg_dir, min, max, points)?;
    }
    Ok(())
}

/// Read one row group through three lockstep column iterators.
fn scan_row_group(
    store: &mut PageStore,
    rg_dir: &Path,
    min: u64,
    max: u64,
    points: &mut Vec<Point>,
) -> Result<(), ScanError> {
    let mut timestamps =
        ColumnIterator::new(store, &rg_dir.join(TIMESTAMP_FILE), ColumnKind::Timestamp)?;
    let skipped = timestamps.skip(store, min, max)?;

    let mut values = ColumnIterator::new(store, &rg_dir.join(VALUE_FILE), ColumnKind::Value)?;
    values.advance(store, skipped)?;

    let mut tombstones =
        ColumnIterator::new(store, &rg_dir.join(DELETE_FILE), ColumnKind::Tombstone)?;
    tombstones.advance(store, skipped)?;

    loop {
        let Some(ColumnEntry::Timestamp(ts)) = timestamps.next_entry(store)? else {
            break;
        };
        if ts > max {
            break;
        }

        let Some(ColumnEntry::Value(value)) = values.next_entry(store)? else {
            return Err(ScanError::ColumnDesync(rg_dir.display().to_string()));
        };
        let Some(ColumnEntry::Tombstone(deleted)) = tombstones.next_entry(store)? else {
            return Err(ScanError::ColumnDesync(rg_dir.display().to_string()));
        };

        if !deleted {
            points.push(Point::new(ts, value));
        }
    }
    Ok(())
}

/// Row-group scan geometry shared with the engine's on-disk delete path:
/// the number of rows strictly before `min` and the number of rows with
/// timestamps in `[min, max]`.
pub fn locate_rows(
    store: &mut PageStore,
    rg_dir: &Path,
    min: u64,
    max: u64,
) -> Result<(u64, u64), ScanError> {
    let mut timestamps =
        ColumnIterator::new(store, &rg_dir.join(TIMESTAMP_FILE), ColumnKind::Timestamp)?;
    let skipped = timestamps.skip(store, min, max)?;

    let mut matching: u64 = 0;
    while let Some(ColumnEntry::Timestamp(ts)) = timestamps.next_entry(store)? {
        if ts > max {
            break;
        }
        matching += 1;
    }
    Ok((skipped, matching))
}
