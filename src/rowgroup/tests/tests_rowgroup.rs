use tempfile::TempDir;

use crate::encoding::{Decode, encode_to_vec};
use crate::rowgroup::{self, RowGroup, RowGroupMeta};
use crate::series::Point;
use crate::store::PageStore;

const PAGE_SIZE: u64 = 256;

fn store() -> (PageStore, TempDir) {
    (PageStore::new(PAGE_SIZE, 16), TempDir::new().unwrap())
}

#[test]
fn metadata_record_round_trips() {
    let meta = RowGroupMeta {
        min_timestamp: 100,
        max_timestamp: 400,
        min_value: -1.5,
        max_value: 99.25,
        points: 7,
        row_group_index: 3,
        timestamp_offset: 512,
        value_offset: 256,
        delete_offset: 0,
    };
    let bytes = encode_to_vec(&meta);
    assert_eq!(bytes.len(), 9 * 8);

    let (decoded, consumed) = RowGroupMeta::decode_from(&bytes).unwrap();
    assert_eq!(decoded, meta);
    assert_eq!(consumed, bytes.len());
}

#[test]
fn metadata_bounds_every_row() {
    // Invariant: the metadata record brackets all row timestamps/values.
    let (mut store, dir) = store();
    let mut group = RowGroup::create(&mut store, dir.path(), 0).unwrap();

    let points = [
        Point::new(200, 5.0),
        Point::new(210, -2.0),
        Point::new(260, 17.5),
    ];
    for point in &points {
        group.add_point(&mut store, point).unwrap();
    }

    let meta = group.meta();
    assert!(points.iter().all(|p| meta.min_timestamp <= p.timestamp));
    assert!(points.iter().all(|p| meta.max_timestamp >= p.timestamp));
    assert!(points.iter().all(|p| meta.min_value <= p.value));
    assert!(points.iter().all(|p| meta.max_value >= p.value));
    assert_eq!(meta.points, 3);
}

#[test]
fn save_then_load_restores_append_mode() {
    let (mut store, dir) = store();
    let rg_dir = {
        let mut group = RowGroup::create(&mut store, dir.path(), 0).unwrap();
        group.add_point(&mut store, &Point::new(100, 1.0)).unwrap();
        group.add_point(&mut store, &Point::new(110, 2.0)).unwrap();
        group.save(&mut store).unwrap();
        group.dir().to_path_buf()
    };

    let mut reloaded = RowGroup::load(&mut store, &rg_dir).unwrap();
    assert_eq!(reloaded.points(), 2);
    reloaded
        .add_point(&mut store, &Point::new(120, 3.0))
        .unwrap();
    reloaded.save(&mut store).unwrap();

    let meta = rowgroup::read_meta(&mut store, &rg_dir).unwrap();
    assert_eq!(meta.points, 3);
    assert_eq!(meta.max_timestamp, 120);
}

#[test]
fn directory_holds_the_four_files() {
    let (mut store, dir) = store();
    let mut group = RowGroup::create(&mut store, dir.path(), 2).unwrap();
    group.add_point(&mut store, &Point::new(1, 1.0)).unwrap();
    group.save(&mut store).unwrap();

    let rg_dir = dir.path().join("rowgroup0002");
    for file in ["metadata.db", "timestamp.db", "value.db", "delete.db"] {
        assert!(rg_dir.join(file).exists(), "{file} missing");
    }
}

#[test]
fn overlap_test_uses_closed_intervals() {
    let mut meta = RowGroupMeta::new(0);
    meta.min_timestamp = 100;
    meta.max_timestamp = 200;
    assert!(meta.overlaps(200, 300));
    assert!(meta.overlaps(50, 100));
    assert!(meta.overlaps(150, 160));
    assert!(!meta.overlaps(201, 300));
    assert!(!meta.overlaps(0, 99));
}
