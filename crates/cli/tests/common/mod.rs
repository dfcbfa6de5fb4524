//! Common utilities for CLI integration tests

pub mod cli;
