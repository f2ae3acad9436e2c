use tempfile::TempDir;

use crate::series::{Point, Tags, TimeSeries};
use crate::store::PageStore;
use crate::wal::{SEGMENT_HEADER_SIZE, Wal};

const PAGE_SIZE: u64 = 256;

fn series() -> TimeSeries {
    TimeSeries::new("m", Tags::empty())
}

fn open(store: &mut PageStore, dir: &std::path::Path, pages_per_segment: u64) -> Wal {
    Wal::load(store, dir, pages_per_segment, 4).unwrap()
}

#[test]
fn fresh_log_starts_with_segment_one() {
    let dir = TempDir::new().unwrap();
    let mut store = PageStore::new(PAGE_SIZE, 16);
    let wal = open(&mut store, dir.path(), 4);

    assert_eq!(wal.segments(), &[1]);
    assert!(dir.path().join("wal_0001.log").exists());

    let header = store
        .read_bytes(&dir.path().join("wal_0001.log"), 0, SEGMENT_HEADER_SIZE)
        .unwrap();
    assert_eq!(header, 1u64.to_be_bytes());
}

#[test]
fn appends_advance_the_tail_within_a_page() {
    let dir = TempDir::new().unwrap();
    let mut store = PageStore::new(PAGE_SIZE, 16);
    let mut wal = open(&mut store, dir.path(), 4);

    let s = series();
    let first = wal.put(&mut store, &s, &Point::new(1, 1.0)).unwrap();
    let second = wal.put(&mut store, &s, &Point::new(2, 2.0)).unwrap();

    assert_eq!(first.segment, 1);
    assert_eq!(first.offset, SEGMENT_HEADER_SIZE + 24);
    assert_eq!(second.offset, first.offset + 46); // one empty-tag entry
    assert_eq!(wal.tail_position().offset, second.offset + 46);
}

#[test]
fn full_pages_roll_then_full_segments_roll() {
    let dir = TempDir::new().unwrap();
    let mut store = PageStore::new(PAGE_SIZE, 16);
    let mut wal = open(&mut store, dir.path(), 2);

    let s = series();
    // 232-byte body holds five 46-byte entries per page; two pages per
    // segment means the 11th entry opens segment 2.
    for i in 0..11u64 {
        wal.put(&mut store, &s, &Point::new(i, i as f64)).unwrap();
    }

    assert_eq!(wal.segments(), &[1, 2]);
    assert!(dir.path().join("wal_0002.log").exists());
    assert_eq!(wal.tail_position().segment, 2);
}

#[test]
fn reclamation_deletes_only_older_segments() {
    let dir = TempDir::new().unwrap();
    let mut store = PageStore::new(PAGE_SIZE, 16);
    let mut wal = open(&mut store, dir.path(), 1);

    let s = series();
    for i in 0..12u64 {
        wal.put(&mut store, &s, &Point::new(i, 0.0)).unwrap();
    }
    let segments_before = wal.segments().to_vec();
    assert!(segments_before.len() >= 2);

    let tail_segment = wal.tail_position().segment;
    wal.delete_segments_older_than(&mut store, tail_segment)
        .unwrap();

    assert_eq!(wal.segments(), &[tail_segment]);
    for segment in segments_before {
        let exists = dir
            .path()
            .join(format!("wal_{segment:04}.log"))
            .exists();
        assert_eq!(exists, segment == tail_segment);
    }
}

#[test]
fn misnamed_segment_is_renamed_from_its_header() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = PageStore::new(PAGE_SIZE, 16);
        let mut wal = open(&mut store, dir.path(), 4);
        wal.put(&mut store, &series(), &Point::new(1, 1.0)).unwrap();
    }

    std::fs::rename(
        dir.path().join("wal_0001.log"),
        dir.path().join("wal_9999.log"),
    )
    .unwrap();

    let mut store = PageStore::new(PAGE_SIZE, 16);
    let wal = open(&mut store, dir.path(), 4);
    assert_eq!(wal.segments(), &[1]);
    assert!(dir.path().join("wal_0001.log").exists());
    assert!(!dir.path().join("wal_9999.log").exists());
}
