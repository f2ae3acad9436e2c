//! Configuration — the resolved record consumed by the engine.
//!
//! The system configuration lives in a YAML document
//! (`config/sys_config.yaml`).  Loading applies field-level defaults and
//! clamps out-of-range values with a warning rather than failing; the
//! engine never revalidates.  Two fields are *persisted back* through
//! [`Config::save`] as the engine runs: `wal.unstaged_offset` and
//! `time_window.start`.


use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Smallest allowed page size in bytes.
pub const MIN_PAGE_SIZE: u64 = 256;

/// Largest allowed page size in bytes.
pub const MAX_PAGE_SIZE: u64 = 16_000;

/// Errors produced while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The YAML document failed to parse or serialize.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Unit of the retention period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    /// 60 seconds.
    Minute,
    /// 3600 seconds.
    Hour,
    /// 86400 seconds.
    #[default]
    Day,
}

impl PeriodType {
    /// Seconds per unit.
    pub fn seconds(self) -> u64 {
        match self {
            PeriodType::Minute => 60,
            PeriodType::Hour => 3_600,
            PeriodType::Day => 86_400,
        }
    }
}

/// Engine-level options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Retention length, in units of `period_type`.
    pub retention_period: u64,
    /// Unit of `retention_period`.
    pub period_type: PeriodType,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            retention_period: 30,
            period_type: PeriodType::Day,
        }
    }
}

/// Memtable options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemtableSection {
    /// Drain threshold in points.
    pub max_size: u64,
}

impl Default for MemtableSection {
    fn default() -> Self {
        Self { max_size: 1_000 }
    }
}

/// Page and buffer-pool options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSection {
    /// Bytes per page, clamped to `[256, 16000]`.
    pub page_size: u64,
    /// Zero-padded width of WAL segment indices in file names.
    pub filename_length: usize,
    /// Number of pages the buffer pool caches.
    pub buffer_pool_capacity: u64,
}

impl Default for PageSection {
    fn default() -> Self {
        Self {
            page_size: 4_096,
            filename_length: 4,
            buffer_pool_capacity: 128,
        }
    }
}

/// Parquet options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParquetSection {
    /// Page size for column files (mirrors `page.page_size`).
    pub page_size: u64,
    /// Rows per row group.
    pub row_group_size: u64,
}

impl Default for ParquetSection {
    fn default() -> Self {
        Self {
            page_size: 4_096,
            row_group_size: 1_000,
        }
    }
}

/// Time-window options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeWindowSection {
    /// Window length in seconds.
    pub duration: u64,
    /// Start of the current window (persisted across runs).
    pub start: u64,
    /// Root directory of the window tree.
    pub windows_dir_path: PathBuf,
}

impl Default for TimeWindowSection {
    fn default() -> Self {
        Self {
            duration: 86_400,
            start: 0,
            windows_dir_path: PathBuf::from("db/data"),
        }
    }
}

/// WAL options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalSection {
    /// Directory holding segment files.
    pub logs_dir_path: PathBuf,
    /// Pages per segment.
    pub segment_size_in_pages: u64,
    /// Byte offset of the oldest unflushed entry (persisted across runs).
    pub unstaged_offset: u64,
}

impl Default for WalSection {
    fn default() -> Self {
        Self {
            logs_dir_path: PathBuf::from("db/logs"),
            segment_size_in_pages: 16,
            unstaged_offset: 0,
        }
    }
}

/// The full resolved configuration record.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Engine-level options.
    pub engine: EngineSection,
    /// Memtable options.
    pub memtable: MemtableSection,
    /// Page and buffer-pool options.
    pub page: PageSection,
    /// Parquet options.
    pub parquet: ParquetSection,
    /// Time-window options.
    pub time_window: TimeWindowSection,
    /// WAL options.
    pub wal: WalSection,
}

impl Config {
    /// Load the system configuration from a YAML file, applying defaults
    /// and clamping invalid values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&text)?;
        config.apply_limits();
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Write the configuration back to a YAML file.
    ///
    /// Called after `wal.unstaged_offset` or `time_window.start` change.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_yaml::to_string(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Retention length in seconds.
    pub fn retention_seconds(&self) -> u64 {
        self.engine.retention_period * self.engine.period_type.seconds()
    }

    /// Clamp out-of-range values to defaults, warning on each fix.
    fn apply_limits(&mut self) {
        if self.page.page_size < MIN_PAGE_SIZE || self.page.page_size > MAX_PAGE_SIZE {
            warn!(
                page_size = self.page.page_size,
                "invalid page.page_size, using default"
            );
            self.page.page_size = PageSection::default().page_size;
        }
        // Column files always share the WAL page size.
        self.parquet.page_size = self.page.page_size;

        if self.memtable.max_size == 0 {
            warn!("invalid memtable.max_size, using default");
            self.memtable.max_size = MemtableSection::default().max_size;
        }
        if self.parquet.row_group_size == 0 {
            warn!("invalid parquet.row_group_size, using default");
            self.parquet.row_group_size = ParquetSection::default().row_group_size;
        }
        if self.wal.segment_size_in_pages == 0 {
            warn!("invalid wal.segment_size_in_pages, using default");
            self.wal.segment_size_in_pages = WalSection::default().segment_size_in_pages;
        }
        if self.page.filename_length == 0 {
            self.page.filename_length = PageSection::default().filename_length;
        }
        if self.time_window.duration == 0 {
            warn!("invalid time_window.duration, using default");
            self.time_window.duration = TimeWindowSection::default().duration;
        }
    }
}
