use tempfile::TempDir;

use crate::parquet::ParquetManager;
use crate::scan::{self, ColumnIterator, ColumnKind};
use crate::series::{Point, Tag, Tags, TimeSeries};
use crate::store::PageStore;
use crate::window::TimeWindow;

const PAGE_SIZE: u64 = 64; // tiny pages force multi-page row groups

fn series(name: &str) -> TimeSeries {
    TimeSeries::new(name, Tags::new(vec![Tag::new("host", "a")]))
}

/// Flush `points` for `series` into a window `[start, end]` under `root`.
fn seed_window(
    store: &mut PageStore,
    root: &std::path::Path,
    start: u64,
    duration: u64,
    series: &TimeSeries,
    points: Vec<Point>,
) {
    let window = TimeWindow::new(start, duration, root).unwrap();
    let mut manager = ParquetManager::new(window.path.clone(), 1_000).unwrap();
    manager
        .flush_all(store, &[(series.hash(), points)])
        .unwrap();
}

#[test]
fn get_returns_points_in_range_ascending() {
    let dir = TempDir::new().unwrap();
    let mut store = PageStore::new(PAGE_SIZE, 32);
    let s = series("cpu");

    let points: Vec<Point> = (0..100).map(|i| Point::new(1_000 + i, i as f64)).collect();
    seed_window(&mut store, dir.path(), 1_000, 1_000, &s, points);

    let result = scan::get(&mut store, dir.path(), &s, 1_010, 1_019).unwrap();
    assert_eq!(result.len(), 10);
    assert_eq!(result[0], Point::new(1_010, 10.0));
    assert_eq!(result[9], Point::new(1_019, 19.0));
    assert!(result.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}

#[test]
fn get_skips_other_series_and_windows() {
    let dir = TempDir::new().unwrap();
    let mut store = PageStore::new(PAGE_SIZE, 32);
    let cpu = series("cpu");
    let mem = series("mem");

    seed_window(
        &mut store,
        dir.path(),
        0,
        100,
        &cpu,
        vec![Point::new(10, 1.0)],
    );
    seed_window(
        &mut store,
        dir.path(),
        100,
        100,
        &mem,
        vec![Point::new(150, 2.0)],
    );

    let result = scan::get(&mut store, dir.path(), &cpu, 0, 1_000).unwrap();
    assert_eq!(result, vec![Point::new(10, 1.0)]);

    let result = scan::get(&mut store, dir.path(), &mem, 0, 99).unwrap();
    assert!(result.is_empty());
}

#[test]
fn whole_range_spans_multiple_pages() {
    let dir = TempDir::new().unwrap();
    let mut store = PageStore::new(PAGE_SIZE, 32);
    let s = series("cpu");

    // 40-byte timestamp bodies hold ~40 one-byte deltas; 200 points span
    // several pages in every column file.
    let points: Vec<Point> = (0..200).map(|i| Point::new(i, (i % 7) as f64)).collect();
    seed_window(&mut store, dir.path(), 0, 1_000, &s, points.clone());

    let result = scan::get(&mut store, dir.path(), &s, 0, 1_000).unwrap();
    assert_eq!(result, points);
}

#[test]
fn timestamp_skip_counts_bypassed_rows() {
    let dir = TempDir::new().unwrap();
    let mut store = PageStore::new(PAGE_SIZE, 32);
    let s = series("cpu");

    let points: Vec<Point> = (0..120).map(|i| Point::new(i, i as f64)).collect();
    seed_window(&mut store, dir.path(), 0, 1_000, &s, points);

    // The single parquet lives at a known location.
    let rg_dir = dir
        .path()
        .join("window_0-1000/parquet0000/rowgroup0000");
    let mut iter = ColumnIterator::new(
        &mut store,
        &rg_dir.join("timestamp.db"),
        ColumnKind::Timestamp,
    )
    .unwrap();

    let skipped = iter.skip(&mut store, 77, 90).unwrap();
    assert_eq!(skipped, 77);
    assert_eq!(
        iter.next_entry(&mut store).unwrap(),
        Some(crate::scan::ColumnEntry::Timestamp(77))
    );
}

#[test]
fn locate_rows_reports_offset_and_span() {
    let dir = TempDir::new().unwrap();
    let mut store = PageStore::new(PAGE_SIZE, 32);
    let s = series("cpu");

    let points: Vec<Point> = (0..60).map(|i| Point::new(i * 10, i as f64)).collect();
    seed_window(&mut store, dir.path(), 0, 10_000, &s, points);

    let rg_dir = dir
        .path()
        .join("window_0-10000/parquet0000/rowgroup0000");
    let (first, count) = scan::locate_rows(&mut store, &rg_dir, 100, 250).unwrap();
    // Rows 0..10 hold timestamps 0..90; rows 10..26 hold 100..250.
    assert_eq!(first, 10);
    assert_eq!(count, 16);
}

#[test]
fn empty_range_yields_nothing() {
    let dir = TempDir::new().unwrap();
    let mut store = PageStore::new(PAGE_SIZE, 32);
    let s = series("cpu");
    seed_window(
        &mut store,
        dir.path(),
        0,
        100,
        &s,
        vec![Point::new(10, 1.0), Point::new(20, 2.0)],
    );

    let result = scan::get(&mut store, dir.path(), &s, 30, 90).unwrap();
    assert!(result.is_empty());
}
