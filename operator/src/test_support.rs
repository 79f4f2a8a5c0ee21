//! Test-only helpers: definition builders, scripted collaborators and an
//! on-disk atomics folder fixture.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::core::bound::BoundTest;
use crate::core::error::ExecutionError;
use crate::core::inputs::Prompter;
use crate::core::types::{
    AtomicTest, ExecutorKind, ExecutorSpec, InputArgument, Technique, Techniques,
};
use crate::io::backend::{ExecutionBackend, ExecutionReport};
use crate::io::config::RunConfig;
use crate::report::{Notice, Reporter};

/// Create a string input with a deterministic description.
pub fn input(name: &str, default: Option<&str>) -> InputArgument {
    InputArgument {
        name: name.to_string(),
        description: Some(format!("{name} input")),
        kind: "string".to_string(),
        default: default.map(str::to_string),
    }
}

/// Create an `sh` test echoing its inputs.
pub fn atomic_test(name: &str, platforms: &[&str], inputs: Vec<InputArgument>) -> AtomicTest {
    let command = inputs
        .iter()
        .map(|input| format!("#{{{}}}", input.name))
        .collect::<Vec<_>>()
        .join(" ");
    AtomicTest {
        name: name.to_string(),
        auto_generated_guid: None,
        description: format!("{name} description"),
        supported_platforms: platforms.iter().map(|p| p.to_string()).collect(),
        input_arguments: inputs,
        dependency_executor_name: None,
        dependencies: Vec::new(),
        executor: ExecutorSpec {
            name: ExecutorKind::Sh,
            command: Some(format!("echo {command}")),
            cleanup_command: None,
            elevation_required: false,
            steps: None,
        },
    }
}

pub fn technique(id: &str, tests: Vec<AtomicTest>) -> Technique {
    Technique {
        attack_technique: id.to_string(),
        display_name: format!("{id} display name"),
        atomic_tests: tests,
    }
}

pub fn techniques(items: Vec<Technique>) -> Techniques {
    items
        .into_iter()
        .map(|technique| (technique.attack_technique.clone(), technique))
        .collect()
}

/// Run config rooted at `atomics_path` with a short timeout.
pub fn run_config(atomics_path: &Path) -> RunConfig {
    RunConfig {
        atomics_path: atomics_path.to_path_buf(),
        check_dependencies: false,
        get_prereqs: false,
        cleanup: false,
        command_timeout: Duration::from_secs(10),
        show_details: false,
        prompt_for_input_args: false,
        output_limit_bytes: 100_000,
    }
}

/// Minimal definition YAML with one `sh` test writing its input to a file.
pub fn definition_yaml(id: &str, platforms: &[&str]) -> String {
    let platforms = if platforms.is_empty() {
        "[]".to_string()
    } else {
        format!("[{}]", platforms.join(", "))
    };
    format!(
        r#"attack_technique: {id}
display_name: {id} display name
atomic_tests:
- name: {id} test
  description: writes a marker
  supported_platforms: {platforms}
  input_arguments:
    output_file:
      description: Where to write the marker
      type: path
      default: /tmp/{id}-marker
  executor:
    name: sh
    command: |
      echo {id} > #{{output_file}}
"#
    )
}

/// A bound test as seen by [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub technique_id: String,
    pub test_name: String,
    pub inputs: BTreeMap<String, String>,
}

/// Backend that records dispatches and replays queued results.
///
/// Once the queue is empty every dispatch completes successfully.
#[derive(Default)]
pub struct ScriptedBackend {
    results: RefCell<VecDeque<Result<ExecutionReport, ExecutionError>>>,
    dispatched: RefCell<Vec<Dispatched>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_result(&self, result: Result<ExecutionReport, ExecutionError>) {
        self.results.borrow_mut().push_back(result);
    }

    pub fn dispatched(&self) -> Vec<Dispatched> {
        self.dispatched.borrow().clone()
    }

    pub fn dispatched_names(&self) -> Vec<String> {
        self.dispatched
            .borrow()
            .iter()
            .map(|d| d.test_name.clone())
            .collect()
    }
}

impl ExecutionBackend for ScriptedBackend {
    fn execute(
        &self,
        test: &BoundTest<'_>,
        _config: &RunConfig,
    ) -> Result<ExecutionReport, ExecutionError> {
        self.dispatched.borrow_mut().push(Dispatched {
            technique_id: test.technique_id().to_string(),
            test_name: test.name().to_string(),
            inputs: test
                .inputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        self.results
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(ExecutionReport::completed()))
    }
}

/// Prompter answering from a fixed table keyed by input name.
///
/// Unknown inputs get no answer. Every question is recorded as `test::input`.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: BTreeMap<String, Option<String>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[(&str, Option<&str>)]) -> Self {
        Self {
            answers: answers
                .iter()
                .map(|(name, answer)| (name.to_string(), answer.map(str::to_string)))
                .collect(),
            asked: RefCell::new(Vec::new()),
        }
    }

    /// Prompter with no answers.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn prompt(&self, test_name: &str, input: &InputArgument) -> io::Result<Option<String>> {
        self.asked
            .borrow_mut()
            .push(format!("{test_name}::{}", input.name));
        Ok(self.answers.get(&input.name).cloned().flatten())
    }
}

/// Reporter that keeps rendered notices.
#[derive(Default)]
pub struct RecordingReporter {
    lines: RefCell<Vec<String>>,
}

impl RecordingReporter {
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }
}

impl Reporter for RecordingReporter {
    fn notice(&self, notice: &Notice<'_>) {
        self.lines.borrow_mut().push(notice.to_string());
    }
}

/// Temporary checkout with an `atomics/` folder.
pub struct AtomicsDir {
    temp: TempDir,
}

impl AtomicsDir {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        fs::create_dir_all(temp.path().join("atomics")).context("create atomics folder")?;
        Ok(Self { temp })
    }

    /// Checkout root (contains `atomics/`).
    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn atomics_folder(&self) -> PathBuf {
        self.root().join("atomics")
    }

    /// Write `<atomics>/<id>/<id>.yaml`.
    pub fn write_technique(&self, id: &str, yaml: &str) -> Result<PathBuf> {
        let dir = self.atomics_folder().join(id);
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        let path = dir.join(format!("{id}.yaml"));
        fs::write(&path, yaml).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}
