//! Deterministic, pure logic shared by the synchronizer.
//!
//! Core modules must be free of I/O side effects. Time is passed in as an
//! argument so every transition can be exercised without a running clock.

pub mod channels;
pub mod edit_guard;
pub mod lifecycle;
pub mod stall;
pub mod state;
pub mod types;
pub mod view;
