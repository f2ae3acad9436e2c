use tempfile::TempDir;

use super::helpers::{init_tracing, series, test_config};
use crate::config::Config;
use crate::engine::Engine;
use crate::series::Point;

#[test]
fn buffered_points_survive_a_crash() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("sys_config.yaml");
    let mut config = test_config(dir.path());
    config.memtable.max_size = 10;

    {
        let mut engine = Engine::open(config.clone(), Some(config_path.clone())).unwrap();
        let s = series("cpu");
        engine.put(&s, Point::new(100, 1.0)).unwrap();
        engine.put(&s, Point::new(200, 2.0)).unwrap();
        // Dropped without close — the crash.
    }

    let reloaded = Config::load(&config_path).unwrap();
    let mut engine = Engine::open(reloaded, Some(config_path)).unwrap();
    assert_eq!(engine.buffered_points(), 2);

    let points = engine.list(&series("cpu"), 0, 1_000).unwrap();
    assert_eq!(points, vec![Point::new(100, 1.0), Point::new(200, 2.0)]);
}

#[test]
fn recovery_does_not_duplicate_flushed_points() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("sys_config.yaml");
    let config = test_config(dir.path()); // max_size 3

    {
        let mut engine = Engine::open(config.clone(), Some(config_path.clone())).unwrap();
        let s = series("cpu");
        for i in 1..=4u64 {
            // Three flushed, one left buffered.
            engine.put(&s, Point::new(i * 100, i as f64)).unwrap();
        }
    }

    let reloaded = Config::load(&config_path).unwrap();
    let mut engine = Engine::open(reloaded, Some(config_path)).unwrap();
    assert_eq!(engine.buffered_points(), 1);

    let points = engine.list(&series("cpu"), 0, 1_000).unwrap();
    assert_eq!(points.len(), 4);
    assert_eq!(
        points,
        (1..=4u64)
            .map(|i| Point::new(i * 100, i as f64))
            .collect::<Vec<_>>()
    );
}

#[test]
fn replayed_deletes_mask_replayed_puts() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("sys_config.yaml");
    let mut config = test_config(dir.path());
    config.memtable.max_size = 10;

    {
        let mut engine = Engine::open(config.clone(), Some(config_path.clone())).unwrap();
        let s = series("cpu");
        for i in 1..=3u64 {
            engine.put(&s, Point::new(i * 100, i as f64)).unwrap();
        }
        engine.delete_range(&s, 150, 250).unwrap();
    }

    let reloaded = Config::load(&config_path).unwrap();
    let mut engine = Engine::open(reloaded, Some(config_path)).unwrap();
    let points = engine.list(&series("cpu"), 0, 1_000).unwrap();
    assert_eq!(points, vec![Point::new(100, 1.0), Point::new(300, 3.0)]);
}

#[test]
fn clean_close_then_reopen_serves_reads() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("sys_config.yaml");
    let config = test_config(dir.path());

    {
        let mut engine = Engine::open(config.clone(), Some(config_path.clone())).unwrap();
        let s = series("cpu");
        for i in 1..=3u64 {
            engine.put(&s, Point::new(i * 100, i as f64)).unwrap();
        }
        engine.close().unwrap();
    }

    let reloaded = Config::load(&config_path).unwrap();
    let mut engine = Engine::open(reloaded, Some(config_path)).unwrap();
    assert_eq!(engine.buffered_points(), 0);
    assert_eq!(engine.list(&series("cpu"), 0, 1_000).unwrap().len(), 3);
}
