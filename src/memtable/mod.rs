//! Memtable — the in-memory staging area for written points.
//!
//! Points are grouped per series (keyed by the series hash) in ordered
//! buffers; insertion order is also timestamp order because points arrive
//! from WAL recovery or live puts with a monotonic clock.  The table is
//! bounded by a total point count: the write that reaches the bound
//! drains the whole table, handing the caller every series' points for
//! flushing.
//!
//! The memtable also tracks the WAL coordinates of its **oldest** still
//! buffered entry.  After a drain the engine advances that watermark to
//! the log's tail and reclaims every older segment — the entries behind
//! the watermark are all persisted in parquets.


use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::{debug, trace};

use crate::series::{Point, TimeSeries};
use crate::wal::WalPosition;

/// Summary of a filtered range, used to combine memtable and disk
/// aggregates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeSummary {
    /// Smallest value in the range.
    pub min_value: f64,
    /// Largest value in the range.
    pub max_value: f64,
    /// Sum of the values in the range.
    pub sum: f64,
    /// Number of points in the range.
    pub count: u64,
}

impl RangeSummary {
    /// The identity element — no points observed.
    pub fn empty() -> Self {
        Self {
            min_value: f64::INFINITY,
            max_value: f64::NEG_INFINITY,
            sum: 0.0,
            count: 0,
        }
    }

    /// Fold one value in.
    pub fn observe(&mut self, value: f64) {
        self.min_value = self.min_value.min(value);
        self.max_value = self.max_value.max(value);
        self.sum += value;
        self.count += 1;
    }

    /// Merge two summaries.
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            min_value: self.min_value.min(other.min_value),
            max_value: self.max_value.max(other.max_value),
            sum: self.sum + other.sum,
            count: self.count + other.count,
        }
    }
}

/// One series' buffered points.
#[derive(Debug)]
struct SeriesBuffer {
    series: TimeSeries,
    points: VecDeque<Point>,
}

/// The in-memory per-series point buffer, bounded by point count.
#[derive(Debug)]
pub struct MemTable {
    buffers: HashMap<String, SeriesBuffer>,
    count: u64,
    max_size: u64,
    /// WAL coordinates of the oldest still-buffered entry.
    start_position: Option<WalPosition>,
}

impl MemTable {
    /// Create an empty table draining at `max_size` points.
    pub fn new(max_size: u64) -> Self {
        Self {
            buffers: HashMap::new(),
            count: 0,
            max_size: max_size.max(1),
            start_position: None,
        }
    }

    /// Buffer one point of `series`, recorded in the WAL at `position`.
    ///
    /// Returns the drained per-series point lists when this write filled
    /// the table; the table is empty afterwards.  Returns `None` while
    /// below the bound.
    pub fn write(
        &mut self,
        series: &TimeSeries,
        point: Point,
        position: WalPosition,
    ) -> Option<Vec<(String, Vec<Point>)>> {
        if self.start_position.is_none() {
            self.start_position = Some(position);
        }

        let hash = series.hash();
        let buffer = self
            .buffers
            .entry(hash.clone())
            .or_insert_with(|| SeriesBuffer {
                series: series.clone(),
                points: VecDeque::new(),
            });
        buffer.points.push_back(point);
        self.count += 1;
        trace!(series = %hash, count = self.count, "memtable write");

        if self.count >= self.max_size {
            return Some(self.drain());
        }
        None
    }

    /// Empty the table, returning every series' ordered points keyed by
    /// hash (deterministic hash order).
    pub fn drain(&mut self) -> Vec<(String, Vec<Point>)> {
        let mut groups: BTreeMap<String, Vec<Point>> = BTreeMap::new();
        for (hash, buffer) in self.buffers.drain() {
            groups.insert(hash, buffer.points.into_iter().collect());
        }
        self.count = 0;
        self.start_position = None;
        debug!(series = groups.len(), "memtable drained");
        groups.into_iter().collect()
    }

    /// Remove the contiguous sub-list of `series` whose timestamps fall
    /// in `[min, max]`, returning the number of points removed.
    pub fn delete_range(&mut self, series: &TimeSeries, min: u64, max: u64) -> u64 {
        let hash = series.hash();
        let Some(buffer) = self.buffers.get_mut(&hash) else {
            return 0;
        };

        let before = buffer.points.len();
        buffer.points.retain(|p| p.timestamp < min || p.timestamp > max);
        let removed = (before - buffer.points.len()) as u64;

        if buffer.points.is_empty() {
            self.buffers.remove(&hash);
        }
        self.count -= removed;
        if removed > 0 {
            trace!(series = %hash, removed, "memtable range delete");
        }
        removed
    }

    /// The buffered points of `series` with timestamps in `[min, max]`,
    /// in insertion (= timestamp) order.
    pub fn list(&self, series: &TimeSeries, min: u64, max: u64) -> Vec<Point> {
        let hash = series.hash();
        match self.buffers.get(&hash) {
            Some(buffer) => buffer
                .points
                .iter()
                .filter(|p| min <= p.timestamp && p.timestamp <= max)
                .copied()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Min/max/sum/count over the same filter as [`MemTable::list`].
    pub fn aggregate(&self, series: &TimeSeries, min: u64, max: u64) -> RangeSummary {
        let mut summary = RangeSummary::empty();
        let hash = series.hash();
        if let Some(buffer) = self.buffers.get(&hash) {
            for point in &buffer.points {
                if min <= point.timestamp && point.timestamp <= max {
                    summary.observe(point.value);
                }
            }
        }
        summary
    }

    /// Set the WAL watermark explicitly (after a drain, to the log tail).
    pub fn set_start_position(&mut self, position: Option<WalPosition>) {
        self.start_position = position;
    }

    /// WAL coordinates of the oldest still-buffered entry.
    pub fn start_position(&self) -> Option<WalPosition> {
        self.start_position
    }

    /// Total buffered point count.
    pub fn len(&self) -> u64 {
        self.count
    }

    /// Whether the table holds no points.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
