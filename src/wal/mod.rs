//! Write-ahead log — segmented, paged, CRC-protected intent records.
//!
//! The WAL is the durability boundary of the engine: a successful
//! [`Wal::put`] guarantees that, after a crash, recovery re-applies the
//! point to the memtable as if the operation had returned.
//!
//! # On-disk layout
//!
//! Segments are files named `wal_<index>.log` (zero-padded to the
//! configured width).  Each file begins with an 8-byte big-endian segment
//! index, followed by full pages at offsets `8 + k * P`:
//!
//! ```text
//! [ segment_index:u64 ]
//! [ P-byte page ]  page 0
//! [ P-byte page ]  page 1
//! ...
//! ```
//!
//! A page carries the common 24-byte header and then concatenated
//! [`WalEntry`] records; entry boundaries are implicit — fields are
//! self-delimited and a trailing CRC of zero marks the end of the page's
//! entries.
//!
//! Every append rewrites the whole active page in place.  A torn write
//! corrupts the CRC of the tail entry, which stops recovery exactly
//! there — the page is atomic from the reader's point of view.
//!
//! # Recovery
//!
//! [`Wal::replay`] scans pages sequentially across segments starting at
//! the persisted unstaged offset, yielding each valid entry with its
//! coordinates.  A checksum mismatch or short read is treated as the end
//! of the log.

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};

use crc32fast::Hasher as Crc32;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::encoding::{Decode, Encode, EncodingError};
use crate::page::{PAGE_META_SIZE, Page, PageError, PageMeta};
use crate::series::{Point, Tags, TimeSeries};
use crate::store::{PageStore, StoreError};

/// Size of the per-segment index header in bytes.
pub const SEGMENT_HEADER_SIZE: u64 = 8;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors returned by WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Underlying filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A wire primitive failed to decode.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A page header failed to decode.
    #[error("page error: {0}")]
    Page(#[from] PageError),

    /// An entry is larger than an empty page body.
    #[error("WAL entry of {0} bytes exceeds page capacity")]
    EntryTooLarge(u64),
}

// ------------------------------------------------------------------------------------------------
// WAL entry
// ------------------------------------------------------------------------------------------------

/// Kind discriminant of a WAL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalKind {
    /// A point insertion (`min = max = timestamp`, value carried).
    Put,
    /// A range deletion (`[min, max]` carried, value zero).
    Delete,
}

/// A single CRC-protected intent record.
///
/// Wire format (big-endian): `crc32:u32 | kind:u8 | mname_len:u64 |
/// mname | num_tags:u64 | tags | min_ts:u64 | max_ts:u64 | value:f64`.
/// The CRC covers every byte from `kind` through `value` inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct WalEntry {
    /// Checksum over the payload fields.
    pub crc: u32,
    /// Put or Delete.
    pub kind: WalKind,
    /// Measurement name of the series.
    pub measurement: String,
    /// Sorted tag set of the series.
    pub tags: Tags,
    /// Start of the affected range (the point timestamp for a Put).
    pub min_timestamp: u64,
    /// End of the affected range (the point timestamp for a Put).
    pub max_timestamp: u64,
    /// The point value; zero for a Delete.
    pub value: f64,
}

impl WalEntry {
    /// Build a Put entry for one point of `series`.
    pub fn put(series: &TimeSeries, point: &Point) -> Self {
        let mut entry = Self {
            crc: 0,
            kind: WalKind::Put,
            measurement: series.measurement.clone(),
            tags: series.tags.clone(),
            min_timestamp: point.timestamp,
            max_timestamp: point.timestamp,
            value: point.value,
        };
        entry.crc = entry.compute_crc();
        entry
    }

    /// Build a Delete entry covering `[min, max]` of `series`.
    pub fn delete(series: &TimeSeries, min_timestamp: u64, max_timestamp: u64) -> Self {
        let mut entry = Self {
            crc: 0,
            kind: WalKind::Delete,
            measurement: series.measurement.clone(),
            tags: series.tags.clone(),
            min_timestamp,
            max_timestamp,
            value: 0.0,
        };
        entry.crc = entry.compute_crc();
        entry
    }

    /// The series this entry refers to.
    pub fn series(&self) -> TimeSeries {
        TimeSeries::new(self.measurement.clone(), self.tags.clone())
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> u64 {
        // crc + kind + mname_len + mname + num_tags + tags + 2 ts + value
        4 + 1 + 8 + self.measurement.len() as u64 + 8 + self.tags.wire_size() + 8 + 8 + 8
    }

    /// Every field from `kind` through `value`, as covered by the CRC.
    fn payload_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size() as usize - 4);
        let kind_byte: u8 = match self.kind {
            WalKind::Put => 0,
            WalKind::Delete => 1,
        };
        kind_byte.encode_to(&mut buf);
        self.measurement.encode_to(&mut buf);
        (self.tags.len() as u64).encode_to(&mut buf);
        self.tags.encode_to(&mut buf);
        self.min_timestamp.encode_to(&mut buf);
        self.max_timestamp.encode_to(&mut buf);
        self.value.encode_to(&mut buf);
        buf
    }

    /// Recompute the checksum over the payload fields.
    pub fn compute_crc(&self) -> u32 {
        let mut hasher = Crc32::new();
        hasher.update(&self.payload_bytes());
        hasher.finalize()
    }

    /// Serialize the full record, CRC first.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size() as usize);
        self.crc.encode_to(&mut buf);
        buf.extend_from_slice(&self.payload_bytes());
        buf
    }

    /// Parse one entry from `buf`.
    ///
    /// Returns `Ok(None)` on a zero CRC (clean end of a page's entries) or
    /// on a checksum mismatch (torn tail write) — both terminate the scan.
    pub fn deserialize(buf: &[u8]) -> Result<Option<(Self, usize)>, WalError> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let (crc, mut offset) = u32::decode_from(buf)?;
        if crc == 0 {
            return Ok(None);
        }

        let (kind_byte, n) = u8::decode_from(&buf[offset..])?;
        offset += n;
        let kind = match kind_byte {
            0 => WalKind::Put,
            1 => WalKind::Delete,
            other => {
                warn!(kind = other, "unknown WAL entry kind, truncating scan");
                return Ok(None);
            }
        };

        let (measurement, n) = String::decode_from(&buf[offset..])?;
        offset += n;
        let (num_tags, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (tags, n) = Tags::decode_n(&buf[offset..], num_tags)?;
        offset += n;
        let (min_timestamp, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (max_timestamp, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (value, n) = f64::decode_from(&buf[offset..])?;
        offset += n;

        let entry = Self {
            crc,
            kind,
            measurement,
            tags,
            min_timestamp,
            max_timestamp,
            value,
        };
        if entry.compute_crc() != crc {
            warn!("WAL entry checksum mismatch, truncating scan");
            return Ok(None);
        }
        Ok(Some((entry, offset)))
    }
}

// ------------------------------------------------------------------------------------------------
// WAL page
// ------------------------------------------------------------------------------------------------

/// A page of concatenated WAL entries.
///
/// The header's min/max fields track entry timestamps; the padding budget
/// counts body bytes.
#[derive(Debug)]
pub struct WalPage {
    page_size: u64,
    meta: PageMeta,
    entries: Vec<WalEntry>,
    /// Bytes remaining in the body.
    padding: u64,
}

impl WalPage {
    /// Create an empty page of `page_size` bytes.
    pub fn new(page_size: u64) -> Self {
        Self {
            page_size,
            meta: PageMeta::new(),
            entries: Vec::new(),
            padding: page_size - PAGE_META_SIZE,
        }
    }

    /// Append `entry` if it fits; `false` signals the log to roll the
    /// page or segment.
    pub fn try_add(&mut self, entry: WalEntry) -> bool {
        if entry.size() > self.padding {
            return false;
        }
        self.padding -= entry.size();
        self.meta.update(entry.min_timestamp);
        self.meta.update(entry.max_timestamp);
        self.meta.count += 1;
        self.entries.push(entry);
        true
    }

    /// Bytes remaining in the body.
    pub fn padding(&self) -> u64 {
        self.padding
    }

    /// Byte offset of the next entry within the page body.
    pub fn body_used(&self) -> u64 {
        (self.page_size - PAGE_META_SIZE) - self.padding
    }

    /// The entries currently on the page.
    pub fn entries(&self) -> &[WalEntry] {
        &self.entries
    }

    /// Rebuild a page from its serialized form.
    ///
    /// Parsing stops at a zero CRC, a checksum mismatch, or a decode
    /// failure — everything before the stop point is kept, which is what
    /// truncates a torn tail write on recovery.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, WalError> {
        let page_size = bytes.len() as u64;
        let _header = PageMeta::deserialize(bytes)?;
        let body = &bytes[PAGE_META_SIZE as usize..];

        let mut page = Self::new(page_size);
        let mut offset = 0;
        while offset + 4 < body.len() {
            match WalEntry::deserialize(&body[offset..]) {
                Ok(Some((entry, n))) => {
                    offset += n;
                    page.try_add(entry);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "corrupt WAL entry, truncating page");
                    break;
                }
            }
        }
        Ok(page)
    }
}

impl Page for WalPage {
    fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.page_size as usize);
        bytes.extend_from_slice(&self.meta.serialize());
        for entry in &self.entries {
            bytes.extend_from_slice(&entry.serialize());
        }
        bytes.resize(self.page_size as usize, 0);
        bytes
    }

    fn entry_count(&self) -> u64 {
        self.meta.count
    }

    fn metadata(&self) -> PageMeta {
        self.meta
    }
}

// ------------------------------------------------------------------------------------------------
// WAL position
// ------------------------------------------------------------------------------------------------

/// Coordinates of an entry inside the log: segment index plus absolute
/// byte offset within the segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalPosition {
    /// Segment index (from the 8-byte file header).
    pub segment: u64,
    /// Absolute byte offset within the segment file.
    pub offset: u64,
}

// ------------------------------------------------------------------------------------------------
// Write-ahead log
// ------------------------------------------------------------------------------------------------

/// The segmented write-ahead log.
#[derive(Debug)]
pub struct Wal {
    logs_dir: PathBuf,
    /// Sorted indices of the segments currently on disk.
    segments: Vec<u64>,
    active_segment: u64,
    active_page_index: u64,
    active_page: WalPage,
    segment_size_in_pages: u64,
    filename_width: usize,
    page_size: u64,
}

impl Wal {
    /// Open the log in `logs_dir`, creating segment 1 when the directory
    /// is empty, otherwise restoring the active segment and its tail page.
    ///
    /// Segment files whose names disagree with their headers are renamed
    /// to the canonical form before sorting.
    pub fn load(
        store: &mut PageStore,
        logs_dir: &Path,
        segment_size_in_pages: u64,
        filename_width: usize,
    ) -> Result<Self, WalError> {
        let page_size = store.page_size();
        let mut wal = Self {
            logs_dir: logs_dir.to_path_buf(),
            segments: Vec::new(),
            active_segment: 0,
            active_page_index: 0,
            active_page: WalPage::new(page_size),
            segment_size_in_pages,
            filename_width,
            page_size,
        };

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(logs_dir)? {
            let entry = entry?;
            if entry.path().is_file() {
                files.push(entry.path());
            }
        }

        if files.is_empty() {
            wal.create_segment(store, 1)?;
            info!(dir = %logs_dir.display(), "WAL initialized with first segment");
            return Ok(wal);
        }

        for file in files {
            if fs::metadata(&file)?.len() < SEGMENT_HEADER_SIZE {
                warn!(path = %file.display(), "skipping undersized file in WAL directory");
                continue;
            }
            let header = store.read_bytes(&file, 0, SEGMENT_HEADER_SIZE)?;
            let mut index_bytes = [0u8; 8];
            index_bytes.copy_from_slice(&header);
            let index = u64::from_be_bytes(index_bytes);

            let canonical = wal.segment_path(index);
            if file != canonical {
                warn!(
                    from = %file.display(),
                    to = %canonical.display(),
                    "renaming WAL segment to match its header"
                );
                fs::rename(&file, &canonical)?;
            }
            wal.segments.push(index);
        }
        wal.segments.sort_unstable();

        if wal.segments.is_empty() {
            wal.create_segment(store, 1)?;
            info!(dir = %logs_dir.display(), "WAL directory held no usable segments, starting fresh");
            return Ok(wal);
        }

        let active = *wal.segments.last().unwrap_or(&1);
        wal.active_segment = active;
        let active_path = wal.segment_path(active);
        let file_size = fs::metadata(&active_path)?.len();

        if file_size <= SEGMENT_HEADER_SIZE {
            wal.active_page = WalPage::new(page_size);
            wal.active_page_index = 0;
        } else {
            // The tail page may be torn by a crash mid-write; read whatever
            // is there and zero-pad to a full page — the entry CRCs sort
            // the valid prefix out.
            let pages = (file_size - SEGMENT_HEADER_SIZE).div_ceil(page_size);
            let index = pages.saturating_sub(1);
            let bytes = read_page_padded(
                store,
                &active_path,
                SEGMENT_HEADER_SIZE + index * page_size,
                page_size,
                file_size,
            )?;
            wal.active_page = WalPage::deserialize(&bytes)?;
            wal.active_page_index = index;
        }

        info!(
            dir = %logs_dir.display(),
            segments = wal.segments.len(),
            active = wal.active_segment,
            "WAL loaded"
        );
        Ok(wal)
    }

    /// Canonical file name for a segment index.
    pub fn segment_name(&self, index: u64) -> String {
        format!("wal_{index:0width$}.log", width = self.filename_width)
    }

    /// Canonical path for a segment index.
    pub fn segment_path(&self, index: u64) -> PathBuf {
        self.logs_dir.join(self.segment_name(index))
    }

    /// Append a Put intent, returning the entry's coordinates.
    pub fn put(
        &mut self,
        store: &mut PageStore,
        series: &TimeSeries,
        point: &Point,
    ) -> Result<WalPosition, WalError> {
        self.append(store, WalEntry::put(series, point))
    }

    /// Append a Delete intent, returning the entry's coordinates.
    pub fn delete(
        &mut self,
        store: &mut PageStore,
        series: &TimeSeries,
        min_timestamp: u64,
        max_timestamp: u64,
    ) -> Result<WalPosition, WalError> {
        self.append(store, WalEntry::delete(series, min_timestamp, max_timestamp))
    }

    /// The coordinates at which the next entry will be appended.
    pub fn tail_position(&self) -> WalPosition {
        WalPosition {
            segment: self.active_segment,
            offset: SEGMENT_HEADER_SIZE
                + self.active_page_index * self.page_size
                + PAGE_META_SIZE
                + self.active_page.body_used(),
        }
    }

    /// Append `entry`, rolling the page or segment when it does not fit,
    /// and rewrite the whole active page in place.
    fn append(&mut self, store: &mut PageStore, entry: WalEntry) -> Result<WalPosition, WalError> {
        let entry_size = entry.size();
        if entry_size > self.page_size - PAGE_META_SIZE {
            return Err(WalError::EntryTooLarge(entry_size));
        }

        if entry_size > self.active_page.padding() {
            if self.active_page_index < self.segment_size_in_pages - 1 {
                self.active_page_index += 1;
                self.active_page = WalPage::new(self.page_size);
            } else {
                let next = self.active_segment + 1;
                self.create_segment(store, next)?;
            }
        }

        let position = self.tail_position();
        // Guaranteed to fit after the roll above.
        if !self.active_page.try_add(entry) {
            return Err(WalError::EntryTooLarge(entry_size));
        }

        let path = self.segment_path(self.active_segment);
        let page_offset = SEGMENT_HEADER_SIZE + self.active_page_index * self.page_size;
        store.write_page(&self.active_page, &path, page_offset)?;

        trace!(
            segment = position.segment,
            offset = position.offset,
            "WAL entry appended"
        );
        Ok(position)
    }

    /// Create a fresh segment file and make it active.
    fn create_segment(&mut self, store: &mut PageStore, index: u64) -> Result<(), WalError> {
        let path = self.segment_path(index);
        store.create_file(&path)?;
        store.write_bytes(&path, 0, &index.to_be_bytes())?;

        self.segments.push(index);
        self.active_segment = index;
        self.active_page_index = 0;
        self.active_page = WalPage::new(self.page_size);
        debug!(segment = index, "WAL segment created");
        Ok(())
    }

    /// Delete every segment strictly older than `until_segment`.
    pub fn delete_segments_older_than(
        &mut self,
        store: &mut PageStore,
        until_segment: u64,
    ) -> Result<(), WalError> {
        let doomed: Vec<u64> = self
            .segments
            .iter()
            .copied()
            .filter(|&s| s < until_segment)
            .collect();
        for &segment in &doomed {
            store.remove(&self.segment_path(segment))?;
            debug!(segment, "WAL segment reclaimed");
        }
        self.segments.retain(|s| *s >= until_segment);
        Ok(())
    }

    /// Sorted indices of the segments currently on disk.
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// Scan the log from `unstaged_offset` (interpreted within the oldest
    /// remaining segment; zero means the first data offset), yielding each
    /// valid entry with its coordinates.
    ///
    /// A checksum mismatch, unknown kind, or short read ends the scan —
    /// everything after a torn write is unreachable by design.
    pub fn replay(
        &self,
        store: &mut PageStore,
        unstaged_offset: u64,
    ) -> Result<Vec<(WalEntry, WalPosition)>, WalError> {
        let mut replayed = Vec::new();
        let start_offset = if unstaged_offset == 0 {
            SEGMENT_HEADER_SIZE
        } else {
            unstaged_offset
        };

        for (i, &segment) in self.segments.iter().enumerate() {
            let path = self.segment_path(segment);
            let file_size = fs::metadata(&path)?.len();
            let pages = file_size.saturating_sub(SEGMENT_HEADER_SIZE).div_ceil(self.page_size);

            for page_index in 0..pages {
                let page_offset = SEGMENT_HEADER_SIZE + page_index * self.page_size;
                let bytes = match read_page_padded(store, &path, page_offset, self.page_size, file_size)
                {
                    Ok(bytes) => bytes,
                    Err(StoreError::ShortRead { .. }) => {
                        warn!(segment, page_index, "short page read, ending WAL replay");
                        return Ok(replayed);
                    }
                    Err(e) => return Err(e.into()),
                };
                let page = WalPage::deserialize(&bytes)?;

                let mut entry_offset = page_offset + PAGE_META_SIZE;
                for entry in page.entries() {
                    let position = WalPosition {
                        segment,
                        offset: entry_offset,
                    };
                    entry_offset += entry.size();

                    // Entries before the unstaged watermark in the oldest
                    // segment were already flushed to parquets.
                    if i == 0 && position.offset < start_offset {
                        continue;
                    }
                    replayed.push((entry.clone(), position));
                }
            }
        }

        debug!(entries = replayed.len(), "WAL replay complete");
        Ok(replayed)
    }
}

/// Read the page at `offset`, zero-padding when the file ends inside it
/// (a torn tail write).  Bypasses the page cache — only recovery reads
/// through here.
fn read_page_padded(
    store: &mut PageStore,
    path: &Path,
    offset: u64,
    page_size: u64,
    file_size: u64,
) -> Result<Vec<u8>, StoreError> {
    let available = file_size.saturating_sub(offset).min(page_size);
    let mut bytes = store.read_bytes(path, offset, available)?;
    bytes.resize(page_size as usize, 0);
    Ok(bytes)
}
