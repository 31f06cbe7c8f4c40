//! Sampledrain - drain finished MP4 containers sample by sample
//!
//! This library crate exposes the application layer for integration testing.

pub mod config;
pub mod sink;
pub mod watch;
pub mod worker;
