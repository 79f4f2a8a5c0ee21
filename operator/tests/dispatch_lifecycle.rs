//! End-to-end dispatch over definitions loaded from disk.
//!
//! Uses a scripted backend so no commands run; verifies what would be
//! dispatched, with which inputs and in which order.

use std::collections::BTreeMap;
use std::fs;

use atomic_operator::core::error::RunError;
use atomic_operator::core::inputs::InputOverrides;
use atomic_operator::core::platform::Platform;
use atomic_operator::core::selector::TechniqueSelector;
use atomic_operator::dispatch::{Dispatcher, TestOutcome};
use atomic_operator::io::config::{OperatorConfig, RunOptions};
use atomic_operator::io::loader::load_techniques;
use atomic_operator::run::run_atomics;
use atomic_operator::test_support::{
    AtomicsDir, RecordingReporter, ScriptedBackend, ScriptedPrompter, definition_yaml, run_config,
};

const EVERYWHERE: &[&str] = &["windows", "linux", "macos"];

fn checkout() -> AtomicsDir {
    let atomics = AtomicsDir::new().expect("atomics dir");
    for id in ["T1003", "T1001", "T1002"] {
        atomics
            .write_technique(id, &definition_yaml(id, EVERYWHERE))
            .expect("write technique");
    }
    atomics
}

#[test]
fn all_selector_matches_each_technique_run_in_order() {
    let atomics = checkout();
    let techniques = load_techniques(atomics.root()).expect("load");
    let config = run_config(&atomics.atomics_folder());
    let overrides = InputOverrides::new();
    let prompter = ScriptedPrompter::silent();

    let all_backend = ScriptedBackend::new();
    let all_reporter = RecordingReporter::default();
    Dispatcher::new(
        &config,
        Platform::Linux,
        &all_backend,
        &prompter,
        &all_reporter,
    )
    .run(&techniques, &TechniqueSelector::All, &overrides)
    .expect("run all");

    let each_backend = ScriptedBackend::new();
    let each_reporter = RecordingReporter::default();
    let dispatcher = Dispatcher::new(
        &config,
        Platform::Linux,
        &each_backend,
        &prompter,
        &each_reporter,
    );
    for id in techniques.keys() {
        dispatcher
            .run(
                &techniques,
                &TechniqueSelector::Technique(id.clone()),
                &overrides,
            )
            .expect("run one");
    }

    assert_eq!(
        all_backend.dispatched_names(),
        vec!["T1001 test", "T1002 test", "T1003 test"]
    );
    assert_eq!(all_backend.dispatched(), each_backend.dispatched());
    assert_eq!(all_reporter.lines(), each_reporter.lines());
}

#[test]
fn loaded_defaults_feed_bound_inputs() {
    let atomics = checkout();
    let techniques = load_techniques(&atomics.atomics_folder()).expect("load");
    let config = run_config(&atomics.atomics_folder());
    let backend = ScriptedBackend::new();
    let prompter = ScriptedPrompter::silent();
    let reporter = RecordingReporter::default();

    let summary = Dispatcher::new(&config, Platform::Macos, &backend, &prompter, &reporter)
        .run(
            &techniques,
            &"T1002".parse().expect("selector"),
            &InputOverrides::new(),
        )
        .expect("run");

    assert_eq!(summary.completed(), 1);
    let dispatched = backend.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(
        dispatched[0].inputs.get("output_file").map(String::as_str),
        Some("/tmp/T1002-marker")
    );
    assert!(prompter.asked().is_empty());
}

#[test]
fn platform_filter_applies_to_loaded_definitions() {
    let atomics = AtomicsDir::new().expect("atomics dir");
    atomics
        .write_technique("T1001", &definition_yaml("T1001", &["windows"]))
        .expect("write technique");
    let techniques = load_techniques(atomics.root()).expect("load");
    let config = run_config(&atomics.atomics_folder());
    let backend = ScriptedBackend::new();
    let prompter = ScriptedPrompter::silent();
    let reporter = RecordingReporter::default();

    let summary = Dispatcher::new(&config, Platform::Linux, &backend, &prompter, &reporter)
        .run(&techniques, &TechniqueSelector::All, &InputOverrides::new())
        .expect("run");

    assert!(backend.dispatched().is_empty());
    assert!(reporter.lines().is_empty());
    assert_eq!(summary.records.len(), 1);
    assert_eq!(summary.records[0].outcome, TestOutcome::Skipped);
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
#[test]
fn run_atomics_merges_config_file_and_cli_inputs() {
    let atomics = checkout();
    let file = OperatorConfig {
        atomics_path: Some(atomics.root().to_path_buf()),
        inputs: BTreeMap::from([("output_file".to_string(), "/from/config".to_string())]),
        ..OperatorConfig::default()
    };

    let options = RunOptions {
        selector: TechniqueSelector::Technique("T1001".to_string()),
        inputs: vec!["output_file=/from/cli".to_string()],
        ..RunOptions::default()
    };
    let backend = ScriptedBackend::new();
    let prompter = ScriptedPrompter::silent();
    let reporter = RecordingReporter::default();

    let summary =
        run_atomics(&file, &options, &backend, &prompter, &reporter).expect("run atomics");

    assert_eq!(summary.completed(), 1);
    assert_eq!(
        backend.dispatched()[0]
            .inputs
            .get("output_file")
            .map(String::as_str),
        Some("/from/cli")
    );
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
#[test]
fn unparseable_definition_fails_before_any_dispatch() {
    let atomics = checkout();
    let broken = atomics.atomics_folder().join("T1004");
    fs::create_dir_all(&broken).expect("create dir");
    fs::write(broken.join("T1004.yaml"), "atomic_tests: [not, a, test").expect("write yaml");

    let options = RunOptions {
        atomics_path: Some(atomics.root().to_path_buf()),
        ..RunOptions::default()
    };
    let backend = ScriptedBackend::new();
    let prompter = ScriptedPrompter::silent();
    let reporter = RecordingReporter::default();

    let err = run_atomics(
        &OperatorConfig::default(),
        &options,
        &backend,
        &prompter,
        &reporter,
    )
    .expect_err("broken definition");

    assert!(matches!(err, RunError::Load(_)));
    assert!(backend.dispatched().is_empty());
}
