//! Shared helpers for integration tests
#![allow(dead_code)]

mod fetcher;
mod project;

pub use fetcher::{InMemoryFetcher, create_test_locator};
pub use project::{TestProject, gnome_config};
