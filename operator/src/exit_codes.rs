//! Stable exit codes for operator CLI commands.

/// Every dispatched test completed (or nothing applied to this platform).
pub const OK: i32 = 0;
/// Invalid invocation: unknown technique, bad config, unloadable definitions
/// or an unsupported host platform. No test ran.
pub const INVALID: i32 = 1;
/// At least one test failed; the remaining tests were still attempted.
pub const TEST_FAILED: i32 = 2;
/// A fatal backend error (operator interrupt) stopped the run early.
pub const HALTED: i32 = 3;
/// Ctrl-C arrived while no test command was running.
pub const INTERRUPTED: i32 = 130;
