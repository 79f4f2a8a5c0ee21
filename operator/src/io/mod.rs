//! I/O helpers: definition loading, configuration, prompting and process execution.

pub mod backend;
pub mod config;
pub mod loader;
pub mod process;
pub mod prompt;
