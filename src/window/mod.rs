//! Time windows — top-level directories grouping parquets by interval.
//!
//! A window is a directory named `window_<start>-<end>` under the data
//! root.  Every parquet inside it holds only points whose timestamps fall
//! in the window's interval; windows never overlap.  Retention reaping
//! deletes whole window directories.

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::parquet::{ParquetError, ParquetManager};
use crate::series::Point;
use crate::store::PageStore;

/// Matches `window_<start>-<end>` directory names.
static WINDOW_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^window_(\d+)-(\d+)$").expect("static pattern"));

/// Errors produced by time-window operations.
#[derive(Debug, Error)]
pub enum WindowError {
    /// Directory creation or listing failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Delegated flush failed.
    #[error("parquet error: {0}")]
    Parquet(#[from] ParquetError),
}

/// Parse a window directory name into `(start, end)`.
pub fn parse_dir_name(name: &str) -> Option<(u64, u64)> {
    let captures = WINDOW_NAME.captures(name)?;
    let start = captures.get(1)?.as_str().parse().ok()?;
    let end = captures.get(2)?.as_str().parse().ok()?;
    Some((start, end))
}

/// A single time window directory.
#[derive(Debug, Clone)]
pub struct TimeWindow {
    /// Inclusive start timestamp.
    pub start: u64,
    /// End timestamp (`start + duration`).
    pub end: u64,
    /// The window's directory.
    pub path: PathBuf,
}

impl TimeWindow {
    /// Create a new window `[start, start + duration]` and its directory.
    pub fn new(start: u64, duration: u64, windows_dir: &Path) -> Result<Self, WindowError> {
        let end = start + duration;
        let path = windows_dir.join(format!("window_{start}-{end}"));
        fs::create_dir_all(&path)?;
        info!(start, end, "time window created");
        Ok(Self { start, end, path })
    }

    /// Scan `windows_dir` for an existing window containing `now`.
    pub fn load_existing(now: u64, windows_dir: &Path) -> Result<Option<Self>, WindowError> {
        for entry in fs::read_dir(windows_dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some((start, end)) = parse_dir_name(&name)
                && start <= now
                && now < end
            {
                debug!(start, end, "time window loaded");
                return Ok(Some(Self {
                    start,
                    end,
                    path: entry.path(),
                }));
            }
        }
        Ok(None)
    }

    /// Whether `timestamp` falls inside this window.
    pub fn belongs(&self, timestamp: u64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }

    /// Flush the given series groups into this window via the manager.
    pub fn flush_all(
        &self,
        store: &mut PageStore,
        manager: &mut ParquetManager,
        groups: &[(String, Vec<Point>)],
    ) -> Result<(), WindowError> {
        manager.retarget(self.path.clone())?;
        manager.flush_all(store, groups)?;
        Ok(())
    }
}

/// List every window directory under `windows_dir` as
/// `(start, end, path)`, unordered.
pub fn list_windows(windows_dir: &Path) -> Result<Vec<(u64, u64, PathBuf)>, WindowError> {
    let mut windows = Vec::new();
    for entry in fs::read_dir(windows_dir)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some((start, end)) = parse_dir_name(&name) {
            windows.push((start, end, entry.path()));
        }
    }
    Ok(windows)
}
