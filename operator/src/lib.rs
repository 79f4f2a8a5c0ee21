//! Atomic Red Team test runner for the local host.
//!
//! Techniques are loaded from an atomics folder, their tests filtered by the
//! host platform, inputs resolved (override, prompt or default) and each
//! applicable test dispatched to an execution backend. The architecture keeps
//! a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (selection, platform filtering,
//!   input resolution, command rendering). No I/O.
//! - **[`io`]**: Side-effecting operations (definition loading, config files,
//!   prompting, process execution). Isolated behind traits for tests.
//!
//! Orchestration modules ([`dispatch`], [`run`], [`list`]) coordinate core logic
//! with I/O to implement CLI commands.

pub mod core;
pub mod dispatch;
pub mod exit_codes;
pub mod io;
pub mod list;
pub mod logging;
pub mod report;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
