//! Typed failure modes for a run.
//!
//! Errors are split by blast radius: [`RunError`] aborts the whole invocation,
//! while [`InputError`] and [`ExecutionError`] are scoped to a single test and
//! only escalate when the backend marks them fatal.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::types::ExecutorKind;

/// Failures that abort the whole invocation.
#[derive(Debug, Error)]
pub enum RunError {
    /// The selector names a technique that was not loaded.
    #[error("unable to find technique {0}")]
    UnknownTechnique(String),

    /// The host OS does not map onto a known platform.
    #[error("unsupported host platform `{0}` (expected windows, linux or macos)")]
    UnsupportedPlatform(String),

    /// No atomics folder exists at the configured path.
    #[error("unable to find an atomics folder at {}", .0.display())]
    AtomicsFolderNotFound(PathBuf),

    /// A technique definition file named explicitly does not exist.
    #[error("missing definition file {}", .0.display())]
    MissingDefinitionFile(PathBuf),

    /// Invalid configuration or invocation parameters.
    #[error("incorrect parameters: {0}")]
    IncorrectParameters(String),

    /// The backend reported a fatal failure and the remaining tests were not attempted.
    #[error("run halted while executing {technique_id} / {test_name}")]
    Halted {
        technique_id: String,
        test_name: String,
        #[source]
        source: ExecutionError,
    },

    /// Definition loading failed (I/O or parse error).
    #[error(transparent)]
    Load(#[from] anyhow::Error),
}

/// Failures while resolving a single test's inputs.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("input `{input}` has no override, prompted value or default")]
    MissingInputValue { input: String },

    #[error("prompting for input `{input}` failed")]
    Prompt {
        input: String,
        #[source]
        source: std::io::Error,
    },
}

/// Stage of a test's execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Dependency check (`prereq_command`).
    Prereq,
    /// Dependency fetch (`get_prereq_command`).
    GetPrereq,
    /// The test command itself.
    Command,
    /// `cleanup_command`.
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Prereq => "prereq",
            Phase::GetPrereq => "get-prereq",
            Phase::Command => "test",
            Phase::Cleanup => "cleanup",
        };
        f.write_str(label)
    }
}

/// Failures reported by an execution backend for one bound test.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{phase} command timed out after {timeout:?}")]
    TimedOut { phase: Phase, timeout: Duration },

    #[error("{phase} command exited with status {}", display_code(.code))]
    CommandFailed {
        phase: Phase,
        code: Option<i32>,
        stderr: String,
    },

    #[error("missing dependency: {description}")]
    MissingDependency { description: String },

    #[error("no command declared for the {executor} executor")]
    MissingCommand { executor: ExecutorKind },

    /// The child died of SIGINT: the operator pressed Ctrl-C and the interrupt
    /// was forwarded to the command's process group.
    #[error("{phase} command interrupted by the operator")]
    Interrupted { phase: Phase },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExecutionError {
    /// Fatal errors stop the dispatch loop; everything else only fails the current test.
    ///
    /// Only an operator interrupt is fatal. It is reached when Ctrl-C arrives
    /// while a command runs (see `io::process::forward_interrupts`); an
    /// interrupt between commands exits the operator directly.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecutionError::Interrupted { .. })
    }
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "unknown".to_string(), |code| code.to_string())
}
