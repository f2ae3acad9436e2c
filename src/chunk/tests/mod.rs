mod tests_spill;
