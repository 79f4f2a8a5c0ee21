//! Deterministic, pure logic shared by the operator.
//!
//! Core modules must be free of I/O side effects. Interactive prompting is
//! reached only through the [`inputs::Prompter`] trait.

pub mod bound;
pub mod error;
pub mod inputs;
pub mod platform;
pub mod selector;
pub mod template;
pub mod types;
