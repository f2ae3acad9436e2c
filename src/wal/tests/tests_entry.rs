use crate::series::{Point, Tag, Tags, TimeSeries};
use crate::wal::{WalEntry, WalKind, WalPage};

fn sample_series() -> TimeSeries {
    TimeSeries::new(
        "cpu",
        Tags::new(vec![Tag::new("host", "alpha"), Tag::new("zone", "eu")]),
    )
}

#[test]
fn put_entry_round_trips_with_matching_crc() {
    let entry = WalEntry::put(&sample_series(), &Point::new(1_000, 42.5));
    let bytes = entry.serialize();
    assert_eq!(bytes.len() as u64, entry.size());

    let (decoded, consumed) = WalEntry::deserialize(&bytes).unwrap().unwrap();
    assert_eq!(decoded, entry);
    assert_eq!(consumed as u64, entry.size());
    assert_eq!(decoded.compute_crc(), decoded.crc);
    assert_eq!(decoded.kind, WalKind::Put);
    assert_eq!(decoded.min_timestamp, 1_000);
    assert_eq!(decoded.max_timestamp, 1_000);
    assert_eq!(decoded.value, 42.5);
}

#[test]
fn delete_entry_carries_the_range_and_zero_value() {
    let entry = WalEntry::delete(&sample_series(), 500, 900);
    let (decoded, _) = WalEntry::deserialize(&entry.serialize()).unwrap().unwrap();
    assert_eq!(decoded.kind, WalKind::Delete);
    assert_eq!(decoded.min_timestamp, 500);
    assert_eq!(decoded.max_timestamp, 900);
    assert_eq!(decoded.value, 0.0);
}

#[test]
fn zero_crc_marks_end_of_entries() {
    assert!(WalEntry::deserialize(&[0u8; 64]).unwrap().is_none());
}

#[test]
fn flipped_payload_byte_fails_the_checksum() {
    let entry = WalEntry::put(&sample_series(), &Point::new(1_000, 42.5));
    let mut bytes = entry.serialize();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    // A mismatch truncates the scan rather than erroring.
    assert!(WalEntry::deserialize(&bytes).unwrap().is_none());
}

#[test]
fn entry_series_restores_the_identity() {
    let series = sample_series();
    let entry = WalEntry::put(&series, &Point::new(1, 1.0));
    assert_eq!(entry.series().hash(), series.hash());
}

#[test]
fn page_keeps_valid_prefix_of_a_torn_tail() {
    let series = sample_series();
    let mut page = WalPage::new(512);
    assert!(page.try_add(WalEntry::put(&series, &Point::new(1, 1.0))));
    assert!(page.try_add(WalEntry::put(&series, &Point::new(2, 2.0))));
    assert!(page.try_add(WalEntry::put(&series, &Point::new(3, 3.0))));

    let mut bytes = crate::page::Page::serialize(&page);
    // Corrupt a byte inside the third entry's payload.
    let third_start = 24 + 2 * page.entries()[0].size() as usize;
    bytes[third_start + 10] ^= 0xFF;

    let recovered = WalPage::deserialize(&bytes).unwrap();
    assert_eq!(recovered.entries().len(), 2);
    assert_eq!(recovered.entries()[1].min_timestamp, 2);
}

#[test]
fn page_signals_overflow_instead_of_splitting_entries() {
    let series = sample_series();
    let entry = WalEntry::put(&series, &Point::new(1, 1.0));
    let page_size = 24 + entry.size() + 10; // room for one entry only
    let mut page = WalPage::new(page_size);
    assert!(page.try_add(entry.clone()));
    assert!(!page.try_add(entry));
    assert_eq!(page.entries().len(), 1);
}
