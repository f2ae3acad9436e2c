use crate::page::{PAGE_META_SIZE, PageError, PageMeta};

#[test]
fn header_serializes_to_24_big_endian_bytes() {
    let meta = PageMeta {
        min: 1,
        max: 0x0102,
        count: 3,
    };
    let bytes = meta.serialize();
    assert_eq!(bytes.len() as u64, PAGE_META_SIZE);
    assert_eq!(&bytes[0..8], &[0, 0, 0, 0, 0, 0, 0, 1]);
    assert_eq!(&bytes[8..16], &[0, 0, 0, 0, 0, 0, 0x01, 0x02]);
    assert_eq!(&bytes[16..24], &[0, 0, 0, 0, 0, 0, 0, 3]);

    let decoded = PageMeta::deserialize(&bytes).unwrap();
    assert_eq!(decoded, meta);
}

#[test]
fn empty_header_has_inverted_bounds() {
    let meta = PageMeta::new();
    assert_eq!(meta.min, u64::MAX);
    assert_eq!(meta.max, 0);
    assert_eq!(meta.count, 0);
}

#[test]
fn update_folds_min_and_max() {
    let mut meta = PageMeta::new();
    meta.update(10);
    meta.update(3);
    meta.update(7);
    assert_eq!((meta.min, meta.max), (3, 10));
}

#[test]
fn short_buffer_is_corrupt() {
    assert!(matches!(
        PageMeta::deserialize(&[0u8; 10]),
        Err(PageError::Corrupt(_))
    ));
}
