mod tests_window;
