//! Test fixtures

mod two_node;

pub use two_node::{TwoNodeFixture, fixture_config};
