use std::path::Path;

use crate::config::{Config, PeriodType};
use crate::series::{Tag, Tags, TimeSeries};

/// A configuration rooted in a scratch directory, sized so tests exercise
/// page spills and drains with a handful of points.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.wal.logs_dir_path = root.join("logs");
    config.wal.segment_size_in_pages = 4;
    config.time_window.windows_dir_path = root.join("data");
    config.time_window.duration = 10_000;
    config.time_window.start = 0;
    config.page.page_size = 256;
    config.page.buffer_pool_capacity = 32;
    config.parquet.page_size = 256;
    config.parquet.row_group_size = 3;
    config.memtable.max_size = 3;
    // Keep synthetic timestamps far inside the retention horizon.
    config.engine.retention_period = 1_000_000;
    config.engine.period_type = PeriodType::Day;
    config
}

pub fn series(name: &str) -> TimeSeries {
    TimeSeries::new(name, Tags::new(vec![Tag::new("host", "a")]))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
