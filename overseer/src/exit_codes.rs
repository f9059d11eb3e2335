//! Stable exit codes for overseer CLI commands.

/// Command succeeded (or the followed task reached a finished state).
pub const OK: i32 = 0;
/// Command failed due to invalid config, transport errors, or other errors.
pub const INVALID: i32 = 1;
/// The remote agent explicitly rejected the request (e.g. busy with another task).
pub const REJECTED: i32 = 2;
/// The remote agent reported `quota_exceeded`.
pub const QUOTA_EXCEEDED: i32 = 3;
