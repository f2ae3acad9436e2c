mod tests_header;
mod tests_value_page;
