mod common;
mod scrape_tests;
