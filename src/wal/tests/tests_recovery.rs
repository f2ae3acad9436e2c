use tempfile::TempDir;

use crate::series::{Point, Tags, TimeSeries};
use crate::store::PageStore;
use crate::wal::{Wal, WalKind};

const PAGE_SIZE: u64 = 256;

fn series() -> TimeSeries {
    TimeSeries::new("m", Tags::empty())
}

fn fresh_store() -> PageStore {
    PageStore::new(PAGE_SIZE, 16)
}

#[test]
fn replay_returns_appends_in_order() {
    let dir = TempDir::new().unwrap();
    let mut store = fresh_store();
    let mut wal = Wal::load(&mut store, dir.path(), 2, 4).unwrap();

    let s = series();
    for i in 0..8u64 {
        wal.put(&mut store, &s, &Point::new(i, i as f64)).unwrap();
    }
    wal.delete(&mut store, &s, 2, 4).unwrap();

    // Reopen as after a crash.
    let mut store = fresh_store();
    let wal = Wal::load(&mut store, dir.path(), 2, 4).unwrap();
    let replayed = wal.replay(&mut store, 0).unwrap();

    assert_eq!(replayed.len(), 9);
    for (i, (entry, _)) in replayed.iter().take(8).enumerate() {
        assert_eq!(entry.kind, WalKind::Put);
        assert_eq!(entry.min_timestamp, i as u64);
    }
    assert_eq!(replayed[8].0.kind, WalKind::Delete);
}

#[test]
fn replay_positions_match_append_positions() {
    let dir = TempDir::new().unwrap();
    let mut store = fresh_store();
    let mut wal = Wal::load(&mut store, dir.path(), 2, 4).unwrap();

    let s = series();
    let mut positions = Vec::new();
    for i in 0..7u64 {
        positions.push(wal.put(&mut store, &s, &Point::new(i, 0.0)).unwrap());
    }

    let replayed = wal.replay(&mut store, 0).unwrap();
    let replayed_positions: Vec<_> = replayed.iter().map(|(_, p)| *p).collect();
    assert_eq!(replayed_positions, positions);
}

#[test]
fn unstaged_offset_skips_flushed_entries() {
    let dir = TempDir::new().unwrap();
    let mut store = fresh_store();
    let mut wal = Wal::load(&mut store, dir.path(), 4, 4).unwrap();

    let s = series();
    let mut positions = Vec::new();
    for i in 0..5u64 {
        positions.push(wal.put(&mut store, &s, &Point::new(i, 0.0)).unwrap());
    }

    // Pretend the first three entries were flushed.
    let replayed = wal.replay(&mut store, positions[3].offset).unwrap();
    assert_eq!(replayed.len(), 2);
    assert_eq!(replayed[0].0.min_timestamp, 3);
    assert_eq!(replayed[1].0.min_timestamp, 4);
}

#[test]
fn active_page_survives_reopen_and_accepts_appends() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = fresh_store();
        let mut wal = Wal::load(&mut store, dir.path(), 4, 4).unwrap();
        wal.put(&mut store, &series(), &Point::new(1, 1.0)).unwrap();
        wal.put(&mut store, &series(), &Point::new(2, 2.0)).unwrap();
    }

    let mut store = fresh_store();
    let mut wal = Wal::load(&mut store, dir.path(), 4, 4).unwrap();
    wal.put(&mut store, &series(), &Point::new(3, 3.0)).unwrap();

    let replayed = wal.replay(&mut store, 0).unwrap();
    let timestamps: Vec<_> = replayed.iter().map(|(e, _)| e.min_timestamp).collect();
    assert_eq!(timestamps, vec![1, 2, 3]);
}

#[test]
fn corrupt_tail_entry_truncates_replay() {
    let dir = TempDir::new().unwrap();
    let mut store = fresh_store();
    let mut wal = Wal::load(&mut store, dir.path(), 4, 4).unwrap();

    let s = series();
    let mut positions = Vec::new();
    for i in 0..3u64 {
        positions.push(wal.put(&mut store, &s, &Point::new(i, 0.0)).unwrap());
    }

    // Tear the last entry on disk: flip a byte inside its payload.
    let path = dir.path().join("wal_0001.log");
    let mut bytes = std::fs::read(&path).unwrap();
    let target = positions[2].offset as usize + 10;
    bytes[target] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let mut store = fresh_store();
    let wal = Wal::load(&mut store, dir.path(), 4, 4).unwrap();
    let replayed = wal.replay(&mut store, 0).unwrap();
    assert_eq!(replayed.len(), 2);
}

#[test]
fn replay_crosses_segment_boundaries() {
    let dir = TempDir::new().unwrap();
    let mut store = fresh_store();
    let mut wal = Wal::load(&mut store, dir.path(), 1, 4).unwrap();

    let s = series();
    for i in 0..12u64 {
        wal.put(&mut store, &s, &Point::new(i, 0.0)).unwrap();
    }
    assert!(wal.segments().len() >= 2);

    let replayed = wal.replay(&mut store, 0).unwrap();
    assert_eq!(replayed.len(), 12);
    let timestamps: Vec<_> = replayed.iter().map(|(e, _)| e.min_timestamp).collect();
    assert_eq!(timestamps, (0..12).collect::<Vec<_>>());
}
