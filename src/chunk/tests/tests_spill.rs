use tempfile::TempDir;

use crate::chunk::{TimestampChunk, TombstoneChunk, ValueChunk};
use crate::page::{Page, TimestampPage, TombstonePage, ValuePage};
use crate::store::PageStore;

const PAGE_SIZE: u64 = 64; // 40-byte body keeps spill tests small

fn store() -> (PageStore, TempDir) {
    (PageStore::new(PAGE_SIZE, 16), TempDir::new().unwrap())
}

#[test]
fn timestamp_chunk_spills_full_pages_at_sequential_offsets() {
    let (mut store, dir) = store();
    let path = dir.path().join("timestamp.db");
    let mut chunk = TimestampChunk::create(&mut store, &path).unwrap();

    // 1-byte entries: the 41st add spills the first full page.
    for ts in 0..45u64 {
        chunk.add(&mut store, ts).unwrap();
    }
    assert_eq!(chunk.tail_offset(), PAGE_SIZE);
    chunk.save(&mut store).unwrap();

    let (_, first) = TimestampPage::deserialize(&store.read_page(&path, 0).unwrap()).unwrap();
    let (_, second) =
        TimestampPage::deserialize(&store.read_page(&path, PAGE_SIZE).unwrap()).unwrap();
    assert_eq!(first.len(), 40);
    assert_eq!(second.len(), 5);
    assert_eq!(first[39], 39);
    // The spilled page restarts with an absolute value.
    assert_eq!(second[0], 40);
}

#[test]
fn value_chunk_recompresses_the_first_entry_after_spill() {
    let (mut store, dir) = store();
    let path = dir.path().join("value.db");
    let mut chunk = ValueChunk::create(&mut store, &path).unwrap();

    // First entry 64 bits, repeats 2 bits: 129 entries fill the page.
    for _ in 0..130 {
        chunk.add(&mut store, 4.5).unwrap();
    }
    assert_eq!(chunk.tail_offset(), PAGE_SIZE);
    chunk.save(&mut store).unwrap();

    let (_, first) = ValuePage::deserialize(&store.read_page(&path, 0).unwrap()).unwrap();
    let (_, second) = ValuePage::deserialize(&store.read_page(&path, PAGE_SIZE).unwrap()).unwrap();
    assert_eq!(first.len(), 129);
    // The 130th value became the absolute first entry of a fresh page.
    assert_eq!(second, vec![4.5]);
}

#[test]
fn tombstone_chunk_packs_one_bit_per_row() {
    let (mut store, dir) = store();
    let path = dir.path().join("delete.db");
    let mut chunk = TombstoneChunk::create(&mut store, &path).unwrap();

    for i in 0..321u64 {
        chunk.add(&mut store, i % 2 == 0).unwrap();
    }
    assert_eq!(chunk.tail_offset(), PAGE_SIZE);
    chunk.save(&mut store).unwrap();

    let first = TombstonePage::deserialize(&store.read_page(&path, 0).unwrap()).unwrap();
    assert_eq!(first.entry_count(), 320);
    assert_eq!(first.bit(0), Some(true));
    assert_eq!(first.bit(1), Some(false));
}

#[test]
fn load_reopens_a_chunk_in_append_mode() {
    let (mut store, dir) = store();
    let path = dir.path().join("timestamp.db");

    let tail = {
        let mut chunk = TimestampChunk::create(&mut store, &path).unwrap();
        chunk.add(&mut store, 100).unwrap();
        chunk.add(&mut store, 110).unwrap();
        chunk.save(&mut store).unwrap();
        chunk.tail_offset()
    };

    let mut reloaded = TimestampChunk::load(&mut store, &path, tail).unwrap();
    reloaded.add(&mut store, 120).unwrap();
    reloaded.save(&mut store).unwrap();

    let (_, values) = TimestampPage::deserialize(&store.read_page(&path, tail).unwrap()).unwrap();
    assert_eq!(values, vec![100, 110, 120]);
}

#[test]
fn save_does_not_advance_the_offset() {
    let (mut store, dir) = store();
    let path = dir.path().join("value.db");
    let mut chunk = ValueChunk::create(&mut store, &path).unwrap();

    chunk.add(&mut store, 1.0).unwrap();
    chunk.save(&mut store).unwrap();
    chunk.add(&mut store, 2.0).unwrap();
    chunk.save(&mut store).unwrap();
    assert_eq!(chunk.tail_offset(), 0);

    let (_, values) = ValuePage::deserialize(&store.read_page(&path, 0).unwrap()).unwrap();
    assert_eq!(values, vec![1.0, 2.0]);
}
