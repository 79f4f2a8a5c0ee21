//! Orchestration of a single run: select techniques, filter tests by platform,
//! resolve inputs and hand each bound test to the execution backend.
//!
//! Dispatch is strictly sequential. Tests within a technique may depend on
//! earlier tests' side effects, so they run one at a time in declared order.

use std::collections::BTreeSet;

use tracing::{debug, info, instrument, warn};

use crate::core::bound::BoundTest;
use crate::core::error::RunError;
use crate::core::inputs::{InputOverrides, Prompter, resolve_inputs};
use crate::core::platform::Platform;
use crate::core::selector::{TechniqueSelector, is_eligible, select_techniques};
use crate::core::types::{AtomicTest, Technique, Techniques};
use crate::io::backend::ExecutionBackend;
use crate::io::config::RunConfig;
use crate::report::{Notice, Reporter};

/// Terminal state of one visited test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    /// Not applicable to the current platform.
    Skipped,
    /// Dispatched and reported success by the backend.
    Completed,
    /// Input resolution or execution failed.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRecord {
    pub technique_id: String,
    pub test_name: String,
    pub outcome: TestOutcome,
}

/// Per-test outcomes of a run, in dispatch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub records: Vec<TestRecord>,
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        self.count(|outcome| matches!(outcome, TestOutcome::Completed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, TestOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, TestOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&TestOutcome) -> bool) -> usize {
        self.records
            .iter()
            .filter(|record| pred(&record.outcome))
            .count()
    }
}

/// Runs selected techniques against one backend with one immutable config.
pub struct Dispatcher<'a, B, P, R> {
    config: &'a RunConfig,
    platform: Platform,
    backend: &'a B,
    prompter: &'a P,
    reporter: &'a R,
}

impl<'a, B, P, R> Dispatcher<'a, B, P, R>
where
    B: ExecutionBackend,
    P: Prompter,
    R: Reporter,
{
    pub fn new(
        config: &'a RunConfig,
        platform: Platform,
        backend: &'a B,
        prompter: &'a P,
        reporter: &'a R,
    ) -> Self {
        Self {
            config,
            platform,
            backend,
            prompter,
            reporter,
        }
    }

    /// Dispatch every eligible test of the selected techniques.
    ///
    /// An unknown selector fails before any test runs. Per-test failures are
    /// recorded and the loop continues; only a fatal backend error stops it.
    #[instrument(skip_all, fields(selector = %selector, platform = %self.platform))]
    pub fn run(
        &self,
        techniques: &Techniques,
        selector: &TechniqueSelector,
        overrides: &InputOverrides,
    ) -> Result<RunSummary, RunError> {
        let selected = select_techniques(techniques, selector)?;
        warn_unmatched_overrides(&selected, overrides);

        let mut summary = RunSummary::default();
        for technique in selected {
            self.run_technique(technique, overrides, &mut summary)?;
        }
        info!(
            completed = summary.completed(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            "run finished"
        );
        Ok(summary)
    }

    fn run_technique(
        &self,
        technique: &Technique,
        overrides: &InputOverrides,
        summary: &mut RunSummary,
    ) -> Result<(), RunError> {
        if technique
            .atomic_tests
            .iter()
            .any(|test| is_eligible(test, self.platform))
        {
            self.reporter.notice(&Notice::Technique {
                id: &technique.attack_technique,
                display_name: &technique.display_name,
            });
        }
        for test in &technique.atomic_tests {
            let outcome = self.run_test(technique, test, overrides)?;
            summary.records.push(TestRecord {
                technique_id: technique.attack_technique.clone(),
                test_name: test.name.clone(),
                outcome,
            });
        }
        Ok(())
    }

    fn run_test(
        &self,
        technique: &Technique,
        test: &AtomicTest,
        overrides: &InputOverrides,
    ) -> Result<TestOutcome, RunError> {
        if !is_eligible(test, self.platform) {
            debug!(test = %test.name, supported = ?test.supported_platforms, "not applicable, skipping");
            return Ok(TestOutcome::Skipped);
        }

        let inputs = match resolve_inputs(
            test,
            overrides,
            self.config.prompt_for_input_args,
            self.prompter,
        ) {
            Ok(inputs) => inputs,
            Err(err) => {
                warn!(test = %test.name, err = %err, "input resolution failed");
                self.reporter.notice(&Notice::Failed {
                    test_name: &test.name,
                    error: &err,
                });
                return Ok(TestOutcome::Failed {
                    reason: err.to_string(),
                });
            }
        };
        let bound = BoundTest::bind(technique, test, inputs);

        self.reporter.notice(&Notice::Running {
            technique_id: &technique.attack_technique,
            display_name: &technique.display_name,
            test_name: &test.name,
            description: &test.description,
        });

        match self.backend.execute(&bound, self.config) {
            Ok(report) => {
                self.reporter.notice(&Notice::Completed {
                    test_name: &test.name,
                    report: &report,
                });
                Ok(TestOutcome::Completed)
            }
            Err(err) => {
                self.reporter.notice(&Notice::Failed {
                    test_name: &test.name,
                    error: &err,
                });
                if err.is_fatal() {
                    warn!(test = %test.name, err = %err, "fatal backend error, halting run");
                    return Err(RunError::Halted {
                        technique_id: technique.attack_technique.clone(),
                        test_name: test.name.clone(),
                        source: err,
                    });
                }
                warn!(test = %test.name, err = %err, "test failed");
                Ok(TestOutcome::Failed {
                    reason: err.to_string(),
                })
            }
        }
    }
}

/// Overrides only bind to declared inputs; flag names no selected test declares.
fn warn_unmatched_overrides(selected: &[&Technique], overrides: &InputOverrides) {
    if overrides.is_empty() {
        return;
    }
    let declared: BTreeSet<&str> = selected
        .iter()
        .flat_map(|technique| &technique.atomic_tests)
        .flat_map(|test| &test.input_arguments)
        .map(|input| input.name.as_str())
        .collect();
    for name in overrides.names() {
        if !declared.contains(name) {
            warn!(input = name, "override matches no declared input of the selected tests");
        }
    }
}
