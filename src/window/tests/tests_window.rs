use tempfile::TempDir;

use crate::window::{TimeWindow, list_windows, parse_dir_name};

#[test]
fn directory_names_parse_back() {
    assert_eq!(parse_dir_name("window_1000-1100"), Some((1000, 1100)));
    assert_eq!(parse_dir_name("window_0-86400"), Some((0, 86400)));
    assert_eq!(parse_dir_name("window_1000-1100x"), None);
    assert_eq!(parse_dir_name("parquet0000"), None);
    assert_eq!(parse_dir_name("window_-100"), None);
}

#[test]
fn new_creates_the_directory() {
    let dir = TempDir::new().unwrap();
    let window = TimeWindow::new(1000, 100, dir.path()).unwrap();
    assert_eq!((window.start, window.end), (1000, 1100));
    assert!(dir.path().join("window_1000-1100").is_dir());
}

#[test]
fn belongs_is_inclusive_of_both_bounds() {
    let dir = TempDir::new().unwrap();
    let window = TimeWindow::new(1000, 100, dir.path()).unwrap();
    assert!(window.belongs(1000));
    assert!(window.belongs(1050));
    assert!(window.belongs(1100));
    assert!(!window.belongs(999));
    assert!(!window.belongs(1101));
}

#[test]
fn load_existing_finds_the_covering_window() {
    let dir = TempDir::new().unwrap();
    TimeWindow::new(0, 100, dir.path()).unwrap();
    TimeWindow::new(100, 100, dir.path()).unwrap();

    let found = TimeWindow::load_existing(150, dir.path()).unwrap().unwrap();
    assert_eq!((found.start, found.end), (100, 200));

    assert!(TimeWindow::load_existing(500, dir.path()).unwrap().is_none());
}

#[test]
fn list_windows_skips_foreign_directories() {
    let dir = TempDir::new().unwrap();
    TimeWindow::new(0, 100, dir.path()).unwrap();
    std::fs::create_dir(dir.path().join("not_a_window")).unwrap();
    std::fs::write(dir.path().join("stray_file"), b"x").unwrap();

    let windows = list_windows(dir.path()).unwrap();
    assert_eq!(windows.len(), 1);
    assert_eq!((windows[0].0, windows[0].1), (0, 100));
}
