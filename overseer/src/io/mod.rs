//! I/O helpers for the synchronizer.

pub mod client;
pub mod config;
