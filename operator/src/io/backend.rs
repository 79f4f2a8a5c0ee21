//! Execution backend abstraction.
//!
//! The [`ExecutionBackend`] trait decouples dispatch from process spawning.
//! [`LocalRunner`] runs bound tests through the local shell; tests use scripted
//! backends that record what was dispatched.

use std::process::Command;

use anyhow::Context;
use tracing::{debug, info, instrument, warn};

use crate::core::bound::BoundTest;
use crate::core::error::{ExecutionError, Phase};
use crate::core::types::{Dependency, ExecutorKind};
use crate::io::config::RunConfig;
use crate::io::process::{CommandOutput, run_command_with_timeout};

/// How a dispatched test ended when the backend reports success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// All requested phases ran and exited successfully.
    Completed,
    /// The test has a `manual` executor; nothing was run.
    Manual,
}

/// Captured output of one executed phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseOutput {
    pub phase: Phase,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl PhaseOutput {
    fn from_output(phase: Phase, output: &CommandOutput) -> Self {
        Self {
            phase,
            exit_code: output.status.code(),
            stdout: output.stdout_lossy(),
            stderr: output.stderr_lossy(),
        }
    }
}

/// Result of a successful execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub status: ExecutionStatus,
    pub phases: Vec<PhaseOutput>,
}

impl ExecutionReport {
    pub fn completed() -> Self {
        Self {
            status: ExecutionStatus::Completed,
            phases: Vec::new(),
        }
    }

    pub fn manual() -> Self {
        Self {
            status: ExecutionStatus::Manual,
            phases: Vec::new(),
        }
    }
}

/// Abstraction over test execution backends.
pub trait ExecutionBackend {
    /// Execute one bound test synchronously. Modes (dependency checks, prereq
    /// fetching, cleanup, timeout) come from `config`.
    fn execute(
        &self,
        test: &BoundTest<'_>,
        config: &RunConfig,
    ) -> Result<ExecutionReport, ExecutionError>;
}

/// Backend that runs commands on the local host.
pub struct LocalRunner;

impl ExecutionBackend for LocalRunner {
    #[instrument(skip_all, fields(technique = test.technique_id(), test = test.name()))]
    fn execute(
        &self,
        test: &BoundTest<'_>,
        config: &RunConfig,
    ) -> Result<ExecutionReport, ExecutionError> {
        let executor = &test.test.executor;
        if executor.name == ExecutorKind::Manual {
            info!("manual executor, nothing to run");
            return Ok(ExecutionReport::manual());
        }
        if executor.elevation_required {
            debug!("test declares elevation_required");
        }

        let mut report = ExecutionReport::completed();
        if config.check_dependencies || config.get_prereqs {
            let kind = test.test.dependency_executor_name.unwrap_or(executor.name);
            for dependency in &test.test.dependencies {
                ensure_dependency(test, dependency, kind, config, &mut report)?;
            }
        }

        let command = executor
            .command
            .as_deref()
            .filter(|command| !command.trim().is_empty())
            .ok_or(ExecutionError::MissingCommand {
                executor: executor.name,
            })?;
        let rendered = test.render(command, &config.atomics_path);
        report
            .phases
            .push(run_phase(Phase::Command, executor.name, &rendered, config)?);

        if config.cleanup
            && let Some(cleanup) = executor.cleanup_command.as_deref()
            && !cleanup.trim().is_empty()
        {
            let rendered = test.render(cleanup, &config.atomics_path);
            report
                .phases
                .push(run_phase(Phase::Cleanup, executor.name, &rendered, config)?);
        }

        Ok(report)
    }
}

/// Check a dependency and, when allowed, fetch it and check again.
fn ensure_dependency(
    test: &BoundTest<'_>,
    dependency: &Dependency,
    kind: ExecutorKind,
    config: &RunConfig,
    report: &mut ExecutionReport,
) -> Result<(), ExecutionError> {
    if dependency.prereq_command.trim().is_empty() {
        return Ok(());
    }
    let check = test.render(&dependency.prereq_command, &config.atomics_path);
    if dependency_satisfied(&check, kind, config, report)? {
        debug!(dependency = %dependency.description, "dependency satisfied");
        return Ok(());
    }

    let missing = || ExecutionError::MissingDependency {
        description: dependency.description.trim().to_string(),
    };
    if !config.get_prereqs || dependency.get_prereq_command.trim().is_empty() {
        warn!(dependency = %dependency.description, "dependency missing");
        return Err(missing());
    }

    info!(dependency = %dependency.description, "fetching prerequisite");
    let fetch = test.render(&dependency.get_prereq_command, &config.atomics_path);
    report
        .phases
        .push(run_phase(Phase::GetPrereq, kind, &fetch, config)?);
    if dependency_satisfied(&check, kind, config, report)? {
        Ok(())
    } else {
        Err(missing())
    }
}

/// A non-zero exit of the check means "not satisfied", not an error.
fn dependency_satisfied(
    check: &str,
    kind: ExecutorKind,
    config: &RunConfig,
    report: &mut ExecutionReport,
) -> Result<bool, ExecutionError> {
    match run_phase(Phase::Prereq, kind, check, config) {
        Ok(output) => {
            report.phases.push(output);
            Ok(true)
        }
        Err(ExecutionError::CommandFailed { .. }) => Ok(false),
        Err(err) => Err(err),
    }
}

fn run_phase(
    phase: Phase,
    kind: ExecutorKind,
    script: &str,
    config: &RunConfig,
) -> Result<PhaseOutput, ExecutionError> {
    let mut cmd = interpreter(kind).ok_or(ExecutionError::MissingCommand { executor: kind })?;
    cmd.arg(script);
    debug!(%phase, executor = %kind, "running phase");

    let output = run_command_with_timeout(cmd, config.command_timeout, config.output_limit_bytes)
        .with_context(|| format!("run {phase} command"))?;

    if output.interrupted() {
        return Err(ExecutionError::Interrupted { phase });
    }
    if output.timed_out {
        return Err(ExecutionError::TimedOut {
            phase,
            timeout: config.command_timeout,
        });
    }
    let captured = PhaseOutput::from_output(phase, &output);
    if !output.status.success() {
        return Err(ExecutionError::CommandFailed {
            phase,
            code: captured.exit_code,
            stderr: captured.stderr,
        });
    }
    Ok(captured)
}

/// Shell invocation for an executor, with the script still to be appended.
fn interpreter(kind: ExecutorKind) -> Option<Command> {
    let (program, args): (&str, &[&str]) = match kind {
        ExecutorKind::Sh => ("sh", &["-c"]),
        ExecutorKind::Bash => ("bash", &["-c"]),
        ExecutorKind::Powershell if cfg!(windows) => (
            "powershell",
            &["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command"],
        ),
        ExecutorKind::Powershell => ("pwsh", &["-NoProfile", "-Command"]),
        ExecutorKind::CommandPrompt => ("cmd.exe", &["/c"]),
        ExecutorKind::Manual => return None,
    };
    let mut cmd = Command::new(program);
    cmd.args(args);
    Some(cmd)
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::core::inputs::{InputOverrides, resolve_inputs};
    use crate::core::types::{AtomicTest, Technique};
    use crate::test_support::{ScriptedPrompter, atomic_test, input, run_config, technique};

    fn shell_test(command: &str, cleanup: Option<&str>) -> AtomicTest {
        let mut test = atomic_test("shell", &[], vec![input("path", Some("unset"))]);
        test.executor.command = Some(command.to_string());
        test.executor.cleanup_command = cleanup.map(str::to_string);
        test
    }

    fn run(
        technique: &Technique,
        overrides: &InputOverrides,
        config: &RunConfig,
    ) -> Result<ExecutionReport, ExecutionError> {
        let test = &technique.atomic_tests[0];
        let inputs = resolve_inputs(test, overrides, false, &ScriptedPrompter::silent())
            .expect("resolve");
        LocalRunner.execute(&BoundTest::bind(technique, test, inputs), config)
    }

    fn path_override(path: &std::path::Path) -> InputOverrides {
        let mut overrides = InputOverrides::new();
        overrides
            .insert("path", &path.display().to_string())
            .expect("override");
        overrides
    }

    #[test]
    fn runs_rendered_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let marker = temp.path().join("marker");
        let t = technique("T1001", vec![shell_test("echo ran > #{path}", None)]);

        let report = run(&t, &path_override(&marker), &run_config(temp.path())).expect("run");
        assert_eq!(report.status, ExecutionStatus::Completed);
        assert_eq!(report.phases.len(), 1);
        assert_eq!(fs::read_to_string(&marker).expect("marker"), "ran\n");
    }

    #[test]
    fn cleanup_runs_only_when_enabled() {
        let temp = tempfile::tempdir().expect("tempdir");
        let marker = temp.path().join("marker");
        let t = technique(
            "T1001",
            vec![shell_test("touch #{path}", Some("rm #{path}"))],
        );

        run(&t, &path_override(&marker), &run_config(temp.path())).expect("run");
        assert!(marker.exists());

        let config = RunConfig {
            cleanup: true,
            ..run_config(temp.path())
        };
        let report = run(&t, &path_override(&marker), &config).expect("run with cleanup");
        assert!(!marker.exists());
        let phases: Vec<Phase> = report.phases.iter().map(|p| p.phase).collect();
        assert_eq!(phases, vec![Phase::Command, Phase::Cleanup]);
    }

    #[test]
    fn non_zero_exit_is_command_failed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let t = technique("T1001", vec![shell_test("echo boom >&2; exit 4", None)]);
        let err = run(&t, &InputOverrides::new(), &run_config(temp.path())).unwrap_err();
        match err {
            ExecutionError::CommandFailed {
                phase,
                code,
                stderr,
            } => {
                assert_eq!(phase, Phase::Command);
                assert_eq!(code, Some(4));
                assert_eq!(stderr, "boom\n");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn timeout_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let t = technique("T1001", vec![shell_test("exec sleep 5", None)]);
        let config = RunConfig {
            command_timeout: Duration::from_millis(200),
            ..run_config(temp.path())
        };
        let err = run(&t, &InputOverrides::new(), &config).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::TimedOut {
                phase: Phase::Command,
                ..
            }
        ));
        assert!(!err.is_fatal());
    }

    #[test]
    fn timeout_kills_commands_started_by_the_script() {
        let temp = tempfile::tempdir().expect("tempdir");
        let t = technique("T1001", vec![shell_test("sleep 5; true", None)]);
        let config = RunConfig {
            command_timeout: Duration::from_millis(200),
            ..run_config(temp.path())
        };
        let started = Instant::now();
        let err = run(&t, &InputOverrides::new(), &config).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(
            err,
            ExecutionError::TimedOut {
                phase: Phase::Command,
                ..
            }
        ));
        assert_eq!(err.to_string(), "test command timed out after 200ms");
    }

    #[test]
    fn background_process_does_not_block_completion() {
        let temp = tempfile::tempdir().expect("tempdir");
        let t = technique("T1001", vec![shell_test("sleep 5 &", None)]);
        let started = Instant::now();
        let report = run(&t, &InputOverrides::new(), &run_config(temp.path())).expect("run");
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(report.status, ExecutionStatus::Completed);
    }

    fn with_dependency(mut test: AtomicTest) -> AtomicTest {
        test.dependencies = vec![Dependency {
            description: "marker must exist".to_string(),
            prereq_command: "test -f #{path}".to_string(),
            get_prereq_command: "touch #{path}".to_string(),
        }];
        test
    }

    #[test]
    fn missing_dependency_fails_without_get_prereqs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let marker = temp.path().join("marker");
        let t = technique("T1001", vec![with_dependency(shell_test("true", None))]);
        let config = RunConfig {
            check_dependencies: true,
            ..run_config(temp.path())
        };
        let err = run(&t, &path_override(&marker), &config).unwrap_err();
        assert!(
            matches!(err, ExecutionError::MissingDependency { description } if description == "marker must exist")
        );
        assert!(!marker.exists());
    }

    #[test]
    fn get_prereqs_fetches_then_runs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let marker = temp.path().join("marker");
        let t = technique("T1001", vec![with_dependency(shell_test("cat #{path}", None))]);
        let config = RunConfig {
            get_prereqs: true,
            ..run_config(temp.path())
        };
        let report = run(&t, &path_override(&marker), &config).expect("run");
        assert!(marker.exists());
        let phases: Vec<Phase> = report.phases.iter().map(|p| p.phase).collect();
        assert_eq!(phases, vec![Phase::GetPrereq, Phase::Prereq, Phase::Command]);
    }

    #[test]
    fn dependencies_are_ignored_unless_requested() {
        let temp = tempfile::tempdir().expect("tempdir");
        let marker = temp.path().join("marker");
        let t = technique("T1001", vec![with_dependency(shell_test("true", None))]);
        let report = run(&t, &path_override(&marker), &run_config(temp.path())).expect("run");
        assert_eq!(report.phases.len(), 1);
    }

    #[test]
    fn manual_tests_are_not_executed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut test = shell_test("false", None);
        test.executor.name = ExecutorKind::Manual;
        let t = technique("T1001", vec![test]);
        let report = run(&t, &InputOverrides::new(), &run_config(temp.path())).expect("run");
        assert_eq!(report.status, ExecutionStatus::Manual);
        assert!(report.phases.is_empty());
    }

    #[test]
    fn blank_command_is_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let t = technique("T1001", vec![shell_test("  ", None)]);
        let err = run(&t, &InputOverrides::new(), &run_config(temp.path())).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::MissingCommand {
                executor: ExecutorKind::Sh
            }
        ));
    }

    #[test]
    fn sigint_halts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let t = technique("T1001", vec![shell_test("kill -INT $$", None)]);
        let err = run(&t, &InputOverrides::new(), &run_config(temp.path())).unwrap_err();
        assert!(err.is_fatal());
    }
}
