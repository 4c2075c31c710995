//! Stable exit codes for sandbox CLI commands.

/// Command succeeded. Per-slot failures inside a completed batch still
/// exit with this code; the report carries them.
pub const OK: i32 = 0;
/// Command failed due to invalid arguments, a bad config, or other errors.
pub const INVALID: i32 = 1;
/// `slotrun run` named a set that does not exist.
pub const NOT_FOUND: i32 = 2;
/// `slotrun run` failed before any slot could execute.
pub const FAULT: i32 = 3;
