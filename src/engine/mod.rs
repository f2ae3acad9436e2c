//! The storage engine — orchestration of WAL, memtable, and columnar disk.
//!
//! ## Lifecycle
//!
//! 1. **Initializing** — [`Engine::open`] builds the collaborators from a
//!    resolved [`Config`], resolves retention, picks or creates the
//!    current time window, reaps expired windows, and replays the WAL
//!    into the memtable (recovery).
//! 2. **Serving** — [`Engine::put`], [`Engine::delete_range`],
//!    [`Engine::list`], [`Engine::aggregate`].
//! 3. **Shutdown** — [`Engine::close`] persists the mutated configuration
//!    fields and drops the instance; buffered points remain recoverable
//!    from the WAL.
//!
//! ## Write path
//!
//! `put` appends to the WAL first, then buffers the point in the
//! memtable.  The write that fills the memtable drains it: every drained
//! point is routed to its destination time window (a drain may straddle
//! a window boundary), flushed through the parquet manager, and only
//! after all row-group metadata is durable does the engine advance the
//! persisted unstaged offset and reclaim old WAL segments.
//!
//! ## Read path
//!
//! `list` and `aggregate` merge the memtable's view with a pruned disk
//! scan; deleted rows are masked by tombstone bits.
//!
//! ## Guarantees
//!
//! - **Durability** — every operation is in the WAL before it is
//!   acknowledged; recovery replays exactly the unflushed suffix.
//! - **Flush ordering** — row groups, then parquet metadata, then the
//!   unstaged offset, then segment deletion.
//! - **Retention** — windows whose interval has aged out are deleted
//!   before each mutation; failures there are logged, never fatal.

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError};
use crate::memtable::{MemTable, RangeSummary};
use crate::page::{Page, TombstonePage};
use crate::parquet::{self, ParquetError, ParquetManager};
use crate::rowgroup::{self, DELETE_FILE, RowGroupError};
use crate::scan::{self, ScanError};
use crate::series::{Point, TimeSeries};
use crate::store::{PageStore, StoreError};
use crate::wal::{Wal, WalError, WalKind};
use crate::window::{self, TimeWindow, WindowError};

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration persistence failure.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// WAL failure.
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    /// Time-window failure.
    #[error("window error: {0}")]
    Window(#[from] WindowError),

    /// Parquet failure.
    #[error("parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// Row-group failure.
    #[error("row group error: {0}")]
    RowGroup(#[from] RowGroupError),

    /// Disk scan failure.
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    /// Page round-trip failure.
    #[error("page error: {0}")]
    Page(#[from] crate::page::PageError),

    /// Underlying filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// Aggregation
// ------------------------------------------------------------------------------------------------

/// Aggregation function over a time range.
///
/// The operator menu's "Mean" is an alias for `Average`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Smallest value in the range.
    Min,
    /// Largest value in the range.
    Max,
    /// Arithmetic mean of the values in the range.
    Average,
}

// ------------------------------------------------------------------------------------------------
// Engine
// ------------------------------------------------------------------------------------------------

/// A single-threaded embedded time-series storage engine.
///
/// The engine exclusively owns its WAL, memtable, page store (and thus
/// the buffer pool), time window, and parquet manager; all mutation goes
/// through its methods.
#[derive(Debug)]
pub struct Engine {
    config: Config,
    config_path: Option<PathBuf>,
    store: PageStore,
    wal: Wal,
    memtable: MemTable,
    manager: ParquetManager,
    window: TimeWindow,
    retention_seconds: u64,
    recovering: bool,
}

impl Engine {
    /// Open (or create) an engine from a resolved configuration.
    ///
    /// When `config_path` is given, mutated fields (`wal.unstaged_offset`,
    /// `time_window.start`) are persisted back to it.
    ///
    /// The only fatal startup condition is failure to open the WAL
    /// directory; everything else degrades with a warning.
    pub fn open(mut config: Config, config_path: Option<PathBuf>) -> Result<Self, EngineError> {
        fs::create_dir_all(&config.wal.logs_dir_path)?;
        fs::create_dir_all(&config.time_window.windows_dir_path)?;

        let mut store = PageStore::new(config.page.page_size, config.page.buffer_pool_capacity);
        let retention_seconds = config.retention_seconds();

        // Pick or create the current window from the persisted start.
        let anchor = config.time_window.start;
        let window = match TimeWindow::load_existing(anchor, &config.time_window.windows_dir_path)?
        {
            Some(window) => window,
            None => TimeWindow::new(
                anchor,
                config.time_window.duration,
                &config.time_window.windows_dir_path,
            )?,
        };
        config.time_window.start = window.start;

        let manager = ParquetManager::new(window.path.clone(), config.parquet.row_group_size)?;
        let wal = Wal::load(
            &mut store,
            &config.wal.logs_dir_path,
            config.wal.segment_size_in_pages,
            config.page.filename_length,
        )?;
        let memtable = MemTable::new(config.memtable.max_size);

        let mut engine = Self {
            config,
            config_path,
            store,
            wal,
            memtable,
            manager,
            window,
            retention_seconds,
            recovering: true,
        };

        engine.reap_expired(now_seconds());
        engine.recover()?;
        engine.recovering = false;
        engine.persist_config();

        info!(
            window_start = engine.window.start,
            window_end = engine.window.end,
            buffered = engine.memtable.len(),
            "engine opened"
        );
        Ok(engine)
    }

    /// Replay the WAL suffix behind the unstaged offset into the
    /// memtable.  Entries are not re-logged, and drained points falling
    /// outside any known window are dropped silently.
    ///
    /// A drain during replay flushes and advances the unstaged watermark
    /// to the entry *after* the one that caused it, so a second crash
    /// never re-applies already-flushed points.
    fn recover(&mut self) -> Result<(), EngineError> {
        let replayed = self
            .wal
            .replay(&mut self.store, self.config.wal.unstaged_offset)?;
        let count = replayed.len();

        for (i, (entry, position)) in replayed.iter().enumerate() {
            let series = entry.series();
            match entry.kind {
                WalKind::Put => {
                    let point = Point::new(entry.min_timestamp, entry.value);
                    if let Some(groups) = self.memtable.write(&series, point, *position) {
                        self.flush_groups(groups)?;

                        let resume = replayed
                            .get(i + 1)
                            .map(|(_, next)| *next)
                            .unwrap_or_else(|| self.wal.tail_position());
                        self.config.wal.unstaged_offset = resume.offset;
                        self.persist_config();
                        self.wal
                            .delete_segments_older_than(&mut self.store, resume.segment)?;
                    }
                }
                WalKind::Delete => {
                    self.memtable
                        .delete_range(&series, entry.min_timestamp, entry.max_timestamp);
                }
            }
        }

        debug!(entries = count, buffered = self.memtable.len(), "recovery complete");
        Ok(())
    }

    /// Insert one point of `series`.
    pub fn put(&mut self, series: &TimeSeries, point: Point) -> Result<(), EngineError> {
        self.reap_expired(now_seconds());
        self.roll_window_forward(point.timestamp)?;

        let position = self.wal.put(&mut self.store, series, &point)?;
        if let Some(groups) = self.memtable.write(series, point, position) {
            self.flush_groups(groups)?;
            self.advance_unstaged()?;
        }
        Ok(())
    }

    /// Delete every point of `series` with timestamp in `[min, max]`,
    /// both buffered and on disk.
    ///
    /// An inverted range is a no-op.
    pub fn delete_range(
        &mut self,
        series: &TimeSeries,
        min: u64,
        max: u64,
    ) -> Result<(), EngineError> {
        if min > max {
            return Ok(());
        }
        self.reap_expired(now_seconds());

        self.wal.delete(&mut self.store, series, min, max)?;
        self.memtable.delete_range(series, min, max);
        self.delete_on_disk(series, min, max)?;
        Ok(())
    }

    /// The live points of `series` with timestamps in `[min, max]`,
    /// ascending.
    pub fn list(&mut self, series: &TimeSeries, min: u64, max: u64) -> Result<Vec<Point>, EngineError> {
        if min > max {
            return Ok(Vec::new());
        }
        let mut points = scan::get(
            &mut self.store,
            &self.config.time_window.windows_dir_path,
            series,
            min,
            max,
        )?;
        points.extend(self.memtable.list(series, min, max));
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }

    /// Aggregate the live points of `series` in `[min, max]`.
    ///
    /// Returns `None` when the range holds no points (the identity of the
    /// requested function).
    pub fn aggregate(
        &mut self,
        series: &TimeSeries,
        min: u64,
        max: u64,
        function: Aggregation,
    ) -> Result<Option<f64>, EngineError> {
        if min > max {
            return Ok(None);
        }

        let mut summary = self.memtable.aggregate(series, min, max);
        let disk_points = scan::get(
            &mut self.store,
            &self.config.time_window.windows_dir_path,
            series,
            min,
            max,
        )?;
        let mut disk_summary = RangeSummary::empty();
        for point in &disk_points {
            disk_summary.observe(point.value);
        }
        summary = summary.merge(&disk_summary);

        if summary.count == 0 {
            return Ok(None);
        }
        Ok(Some(match function {
            Aggregation::Min => summary.min_value,
            Aggregation::Max => summary.max_value,
            Aggregation::Average => summary.sum / summary.count as f64,
        }))
    }

    /// Gracefully shut the engine down.
    ///
    /// Buffered points stay in the WAL and are replayed on the next open;
    /// every page write already reached disk synchronously.
    pub fn close(mut self) -> Result<(), EngineError> {
        self.persist_config();
        info!(buffered = self.memtable.len(), "engine closed");
        Ok(())
    }

    /// Total points currently buffered in the memtable.
    pub fn buffered_points(&self) -> u64 {
        self.memtable.len()
    }

    /// Indices of the WAL segments currently on disk.
    pub fn wal_segments(&self) -> &[u64] {
        self.wal.segments()
    }

    /// The current time window's `[start, end]`.
    pub fn current_window(&self) -> (u64, u64) {
        (self.window.start, self.window.end)
    }

    // --------------------------------------------------------------------------------------------
    // Write-path internals
    // --------------------------------------------------------------------------------------------

    /// Advance the current window until it contains `timestamp`, staying
    /// on the `start + k * duration` grid.  Timestamps at or before the
    /// current window's end leave it unchanged.
    fn roll_window_forward(&mut self, timestamp: u64) -> Result<(), EngineError> {
        if timestamp <= self.window.end {
            return Ok(());
        }
        let duration = self.config.time_window.duration;
        let steps = (timestamp - self.window.start) / duration;
        let new_start = self.window.start + steps * duration;

        info!(
            old_start = self.window.start,
            new_start, timestamp, "rolling time window forward"
        );
        self.window = TimeWindow::new(
            new_start,
            duration,
            &self.config.time_window.windows_dir_path,
        )?;
        self.manager.retarget(self.window.path.clone())?;
        self.config.time_window.start = self.window.start;
        self.persist_config();
        Ok(())
    }

    /// Route drained points to their destination windows and flush each
    /// window's share through the parquet manager.
    ///
    /// Every point is routed individually — a drain may straddle a window
    /// boundary.  Points matching no window are dropped (silently during
    /// recovery, with a warning otherwise).
    fn flush_groups(&mut self, groups: Vec<(String, Vec<Point>)>) -> Result<(), EngineError> {
        // (window, per-series groups in hash order)
        let mut destinations: Vec<(TimeWindow, Vec<(String, Vec<Point>)>)> = Vec::new();

        for (hash, points) in groups {
            for point in points {
                let Some(window_index) = self.resolve_window(point.timestamp, &mut destinations)?
                else {
                    if !self.recovering {
                        warn!(
                            timestamp = point.timestamp,
                            series = %hash,
                            "no window for flushed point, dropping"
                        );
                    }
                    continue;
                };

                let series_groups = &mut destinations[window_index].1;
                match series_groups.iter_mut().find(|(h, _)| *h == hash) {
                    Some((_, list)) => list.push(point),
                    None => series_groups.push((hash.clone(), vec![point])),
                }
            }
        }

        for (window, series_groups) in &destinations {
            window.flush_all(&mut self.store, &mut self.manager, series_groups)?;
        }

        // Leave the manager pointed at the current window.
        self.manager.retarget(self.window.path.clone())?;
        Ok(())
    }

    /// Find (or load) the window containing `timestamp`, returning its
    /// index in `destinations`.
    fn resolve_window(
        &mut self,
        timestamp: u64,
        destinations: &mut Vec<(TimeWindow, Vec<(String, Vec<Point>)>)>,
    ) -> Result<Option<usize>, EngineError> {
        if let Some(index) = destinations
            .iter()
            .position(|(w, _)| w.belongs(timestamp))
        {
            return Ok(Some(index));
        }

        let window = if self.window.belongs(timestamp) {
            Some(self.window.clone())
        } else {
            TimeWindow::load_existing(timestamp, &self.config.time_window.windows_dir_path)?
        };

        match window {
            Some(window) => {
                destinations.push((window, Vec::new()));
                Ok(Some(destinations.len() - 1))
            }
            None => Ok(None),
        }
    }

    /// After a successful flush: persist the new unstaged offset, then
    /// reclaim every WAL segment older than the log tail.
    ///
    /// Ordering matters — the offset must be durable before segments
    /// disappear, and both happen only after row-group metadata is on
    /// disk.
    fn advance_unstaged(&mut self) -> Result<(), EngineError> {
        let tail = self.wal.tail_position();
        self.config.wal.unstaged_offset = tail.offset;
        self.persist_config();
        self.wal
            .delete_segments_older_than(&mut self.store, tail.segment)?;
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Delete-path internals
    // --------------------------------------------------------------------------------------------

    /// Flip tombstone bits for every on-disk row of `series` in
    /// `[min, max]`.
    fn delete_on_disk(&mut self, series: &TimeSeries, min: u64, max: u64) -> Result<(), EngineError> {
        let hash = series.hash();
        let windows = window::list_windows(&self.config.time_window.windows_dir_path)?;

        for (start, end, window_path) in windows {
            if start > max || end < min {
                continue;
            }
            for entry in fs::read_dir(&window_path)? {
                let entry = entry?;
                let parquet_dir = entry.path();
                if !parquet_dir.is_dir() {
                    continue;
                }
                let meta = match parquet::read_meta(&mut self.store, &parquet_dir) {
                    Ok(meta) => meta,
                    Err(_) => continue,
                };
                if meta.series_hash != hash || !meta.overlaps(min, max) {
                    continue;
                }
                self.delete_in_parquet(&parquet_dir, min, max)?;
            }
        }
        Ok(())
    }

    /// Apply the deletion to every overlapping row group of one parquet.
    fn delete_in_parquet(
        &mut self,
        parquet_dir: &Path,
        min: u64,
        max: u64,
    ) -> Result<(), EngineError> {
        for entry in fs::read_dir(parquet_dir)? {
            let entry = entry?;
            let rg_dir = entry.path();
            if !rg_dir.is_dir() {
                continue;
            }
            let meta = rowgroup::read_meta(&mut self.store, &rg_dir)?;
            if !meta.overlaps(min, max) {
                continue;
            }

            let (first_row, row_count) = scan::locate_rows(&mut self.store, &rg_dir, min, max)?;
            if row_count > 0 {
                self.flip_tombstones(&rg_dir.join(DELETE_FILE), first_row, row_count)?;
            }
        }
        Ok(())
    }

    /// Set rows `[first_row, first_row + row_count)` to deleted in a
    /// tombstone column file, persisting each modified page.
    fn flip_tombstones(
        &mut self,
        delete_path: &Path,
        first_row: u64,
        row_count: u64,
    ) -> Result<(), EngineError> {
        let page_size = self.store.page_size();
        let file_size = fs::metadata(delete_path)?.len();
        let last_row = first_row + row_count;

        let mut base: u64 = 0;
        let mut offset: u64 = 0;
        while offset + page_size <= file_size && base < last_row {
            let bytes = self.store.read_page(delete_path, offset)?;
            let mut page = TombstonePage::deserialize(&bytes)?;
            let rows = page.entry_count();

            let begin = first_row.max(base);
            let end = last_row.min(base + rows);
            if begin < end {
                for row in begin..end {
                    page.mark_deleted((row - base) as usize);
                }
                self.store.write_page(&page, delete_path, offset)?;
                debug!(
                    path = %delete_path.display(),
                    offset,
                    flipped = end - begin,
                    "tombstone page updated"
                );
            }

            base += rows;
            offset += page_size;
        }
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Maintenance internals
    // --------------------------------------------------------------------------------------------

    /// Delete every window whose interval has aged past retention.
    ///
    /// Failures here are logged and swallowed — retention must never fail
    /// an operation.
    fn reap_expired(&mut self, now: u64) {
        let horizon = now.saturating_sub(self.retention_seconds);
        let windows = match window::list_windows(&self.config.time_window.windows_dir_path) {
            Ok(windows) => windows,
            Err(e) => {
                warn!(error = %e, "retention: cannot list windows");
                return;
            }
        };

        for (start, end, path) in windows {
            if end > horizon || path == self.window.path {
                continue;
            }
            match self.store.remove(&path) {
                Ok(()) => info!(start, end, "retention: window reaped"),
                Err(e) => warn!(start, end, error = %e, "retention: failed to remove window"),
            }
        }
    }

    /// Write mutated config fields back when a config path was given.
    fn persist_config(&self) {
        if let Some(path) = &self.config_path
            && let Err(e) = self.config.save(path)
        {
            warn!(path = %path.display(), error = %e, "failed to persist configuration");
        }
    }
}

/// Wall-clock seconds since the UNIX epoch.
fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
