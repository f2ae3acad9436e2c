mod helpers;
mod tests_recovery;
