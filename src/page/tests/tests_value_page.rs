use crate::codec::scale_value;
use crate::page::{Page, ValuePage};

const PAGE_SIZE: u64 = 256;

#[test]
fn round_trip_is_exact_after_scaling() {
    let mut page = ValuePage::new(PAGE_SIZE);
    let values = [1.0, 1.0, 1.5, -2.25, 100.0];
    for &v in &values {
        assert!(page.try_add(v));
    }

    let bytes = page.serialize();
    assert_eq!(bytes.len() as u64, PAGE_SIZE);

    let (decoded, out) = ValuePage::deserialize(&bytes).unwrap();
    assert_eq!(out, values);
    assert_eq!(decoded.entry_count(), values.len() as u64);
}

#[test]
fn header_stores_float_bit_patterns() {
    let mut page = ValuePage::new(PAGE_SIZE);
    page.try_add(-3.5);
    page.try_add(7.25);

    let meta = page.metadata();
    assert_eq!(f64::from_bits(meta.min), -3.5);
    assert_eq!(f64::from_bits(meta.max), 7.25);
    assert_eq!(meta.count, 2);
}

#[test]
fn padding_is_tracked_in_bits() {
    let mut page = ValuePage::new(64); // body = 40 bytes = 320 bits
    assert!(page.try_add(1.0)); // first entry: 64 bits
    assert!(page.try_add(1.0)); // repeat: 2 bits
    // 254 bits left; fill with 2-bit repeats until exhaustion.
    let mut added = 2;
    while page.try_add(1.0) {
        added += 1;
    }
    assert_eq!(added, 129);
    assert_eq!(page.entry_count(), 129);
}

#[test]
fn reloaded_page_continues_the_bit_stream() {
    let mut page = ValuePage::new(PAGE_SIZE);
    page.try_add(10.0);
    page.try_add(10.5);
    let bytes = page.serialize();

    let (mut reloaded, _) = ValuePage::deserialize(&bytes).unwrap();
    assert_eq!(reloaded.last_scaled(), scale_value(10.5));
    assert!(reloaded.try_add(11.0));

    let (_, values) = ValuePage::deserialize(&reloaded.serialize()).unwrap();
    assert_eq!(values, vec![10.0, 10.5, 11.0]);
}

#[test]
fn empty_page_round_trips() {
    let page = ValuePage::new(PAGE_SIZE);
    let (decoded, values) = ValuePage::deserialize(&page.serialize()).unwrap();
    assert!(values.is_empty());
    assert_eq!(decoded.entry_count(), 0);
}
