//! # TempusDB
//!
//! An embeddable, persistent **time-series storage engine**: float-valued
//! samples tagged by a measurement name plus an ordered tag set, durable
//! under crash, stored in a paged columnar format with Gorilla-style
//! compression and reclaimed by age-based retention.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                         Engine                             │
//! │   put / delete_range / list / aggregate / close            │
//! │                                                            │
//! │  ┌─────────────┐   drain    ┌────────────────────────────┐ │
//! │  │  MemTable   │──────────► │  TimeWindow directories    │ │
//! │  │ (per-series │            │   parquetNNNN/             │ │
//! │  │  buffers)   │            │     rowgroupNNNN/          │ │
//! │  └──────▲──────┘            │       timestamp.db         │ │
//! │         │ replay            │       value.db             │ │
//! │  ┌──────┴──────┐            │       delete.db            │ │
//! │  │     WAL     │            └─────────────▲──────────────┘ │
//! │  │ (segmented, │                          │                │
//! │  │   paged)    │          ┌───────────────┴──────────────┐ │
//! │  └─────────────┘          │  PageStore + BufferPool      │ │
//! │                           └──────────────────────────────┘ │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Orchestrator — lifecycle, retention, recovery, operations |
//! | [`memtable`] | In-memory per-series point buffers with a drain bound |
//! | [`wal`] | Segmented, paged, CRC-protected write-ahead log |
//! | [`page`] | Fixed-size typed pages (timestamp / value / tombstone) |
//! | [`chunk`] | Column writers spilling full pages to disk |
//! | [`rowgroup`] | Timestamp/value/tombstone chunk triples |
//! | [`parquet`] | Per-series directories within a window, plus routing |
//! | [`window`] | `window_<start>-<end>` directory management |
//! | [`scan`] | Pruned disk scans and column iterators |
//! | [`codec`] | Delta timestamp codec and Gorilla XOR value codec |
//! | [`bitio`] | MSB-first bit reader/writer |
//! | [`encoding`] | Deterministic big-endian wire primitives |
//! | [`store`] | Positional page/structure file I/O |
//! | [`pool`] | LRU page cache |
//! | [`series`] | Points, tags, and SHA-256 series identity |
//! | [`config`] | YAML configuration record |
//!
//! ## Key Properties
//!
//! - **WAL-first writes** — a point is on disk in the log before the put
//!   returns; crash recovery replays exactly the unflushed suffix.
//! - **Columnar compression** — timestamps as byte-aligned deltas, values
//!   as Gorilla XOR bit streams scaled by 10^5, deletions as a bitmap.
//! - **Metadata pruning** — scans skip windows, parquets, row groups, and
//!   whole pages by their min/max records before touching entries.
//! - **Age-based retention** — expired window directories are removed
//!   before every mutation; failures are logged, never fatal.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tempusdb::config::Config;
//! use tempusdb::engine::{Aggregation, Engine};
//! use tempusdb::series::{Point, Tag, Tags, TimeSeries};
//!
//! # fn main() -> Result<(), tempusdb::engine::EngineError> {
//! let mut config = Config::default();
//! config.time_window.windows_dir_path = "/tmp/tsdb/data".into();
//! config.wal.logs_dir_path = "/tmp/tsdb/logs".into();
//!
//! let mut engine = Engine::open(config, None)?;
//!
//! let series = TimeSeries::new(
//!     "cpu_temperature",
//!     Tags::new(vec![Tag::new("host", "alpha")]),
//! );
//!
//! engine.put(&series, Point::new(1_700_000_000, 54.25))?;
//!
//! let points = engine.list(&series, 0, u64::MAX)?;
//! let mean = engine.aggregate(&series, 0, u64::MAX, Aggregation::Average)?;
//!
//! engine.close()?;
//! # Ok(())
//! # }
//! ```

pub mod bitio;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod encoding;
pub mod engine;
pub mod memtable;
pub mod page;
pub mod parquet;
pub mod pool;
pub mod rowgroup;
pub mod scan;
pub mod series;
pub mod store;
pub mod wal;
pub mod window;
