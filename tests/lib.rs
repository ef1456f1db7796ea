//! Shared fixtures for kindred integration tests.

pub mod fixtures;
