mod tests_rowgroup;
