mod tests_entry;
mod tests_recovery;
mod tests_segments;
