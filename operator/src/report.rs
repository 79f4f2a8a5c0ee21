//! Human-readable progress output.
//!
//! # Separation of Concerns
//!
//! - **Notices (this module)**: operator-facing progress, completion and failure
//!   lines. Always emitted, unaffected by `RUST_LOG`.
//! - **Tracing (`logging`)**: dev diagnostics on stderr, filtered by `RUST_LOG`.

use std::error::Error;
use std::fmt;

use crate::core::error::ExecutionError;
use crate::io::backend::{ExecutionReport, ExecutionStatus};

/// A progress event emitted by the dispatcher.
#[derive(Debug, Clone, Copy)]
pub enum Notice<'a> {
    Technique {
        id: &'a str,
        display_name: &'a str,
    },
    Running {
        technique_id: &'a str,
        display_name: &'a str,
        test_name: &'a str,
        description: &'a str,
    },
    Completed {
        test_name: &'a str,
        report: &'a ExecutionReport,
    },
    Failed {
        test_name: &'a str,
        error: &'a (dyn Error + 'static),
    },
}

impl Notice<'_> {
    /// Command output worth showing when details are requested.
    pub fn details(&self) -> Option<String> {
        match self {
            Notice::Completed { report, .. } => {
                let mut out = String::new();
                for phase in &report.phases {
                    push_stream(&mut out, &format!("{} stdout", phase.phase), &phase.stdout);
                    push_stream(&mut out, &format!("{} stderr", phase.phase), &phase.stderr);
                }
                (!out.is_empty()).then_some(out)
            }
            Notice::Failed { error, .. } => match error.downcast_ref::<ExecutionError>() {
                Some(ExecutionError::CommandFailed { phase, stderr, .. }) => {
                    let mut out = String::new();
                    push_stream(&mut out, &format!("{phase} stderr"), stderr);
                    (!out.is_empty()).then_some(out)
                }
                _ => None,
            },
            Notice::Technique { .. } | Notice::Running { .. } => None,
        }
    }
}

fn push_stream(out: &mut String, label: &str, body: &str) {
    let body = body.trim_end();
    if body.is_empty() {
        return;
    }
    out.push_str(&format!("=== {label} ===\n{body}\n"));
}

impl fmt::Display for Notice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Technique { id, display_name } => {
                write!(f, "Running tests for technique {id} ({display_name})")
            }
            Notice::Running {
                technique_id,
                display_name,
                test_name,
                description,
            } => {
                write!(f, "[{technique_id}] {display_name} :: running {test_name}")?;
                let description = description.trim();
                if !description.is_empty() {
                    write!(f, "\n  Description: {}", description.replace('\n', "\n  "))?;
                }
                Ok(())
            }
            Notice::Completed { test_name, report } => match report.status {
                ExecutionStatus::Completed => write!(f, "{test_name}: completed"),
                ExecutionStatus::Manual => write!(
                    f,
                    "{test_name}: manual test, follow the steps in its definition"
                ),
            },
            Notice::Failed { test_name, error } => {
                write!(f, "{test_name}: failed: {error}")?;
                let mut source = error.source();
                while let Some(cause) = source {
                    write!(f, ": {cause}")?;
                    source = cause.source();
                }
                Ok(())
            }
        }
    }
}

/// Sink for dispatcher notices.
pub trait Reporter {
    fn notice(&self, notice: &Notice<'_>);
}

/// Prints notices to stdout; command output only with `show_details`.
pub struct ConsoleReporter {
    pub show_details: bool,
}

impl Reporter for ConsoleReporter {
    fn notice(&self, notice: &Notice<'_>) {
        println!("{notice}");
        if self.show_details
            && let Some(details) = notice.details()
        {
            print!("{details}");
        }
    }
}
