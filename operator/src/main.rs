//! Runs Atomic Red Team tests on the local host.
//!
//! `run` dispatches the eligible tests of one technique (or all of them);
//! `list` shows what the atomics folder holds.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use atomic_operator::core::error::RunError;
use atomic_operator::core::platform::current_platform;
use atomic_operator::core::selector::TechniqueSelector;
use atomic_operator::dispatch::RunSummary;
use atomic_operator::exit_codes;
use atomic_operator::io::backend::LocalRunner;
use atomic_operator::io::config::{DEFAULT_CONFIG_FILE, OperatorConfig, RunOptions, load_config};
use atomic_operator::io::loader::load_techniques;
use atomic_operator::io::process::forward_interrupts;
use atomic_operator::io::prompt::TerminalPrompter;
use atomic_operator::list::list_techniques;
use atomic_operator::logging;
use atomic_operator::report::ConsoleReporter;
use atomic_operator::run::run_atomics;

#[derive(Parser)]
#[command(
    name = "atomic-operator",
    version,
    about = "Run Atomic Red Team tests on the local host"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the eligible tests of one technique, or of every technique.
    Run(RunArgs),
    /// List techniques found in the atomics folder.
    List {
        /// Atomics folder, or a checkout containing `atomics/`.
        #[arg(long)]
        atomics_path: Option<PathBuf>,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
        /// Operator config file.
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Technique id (e.g. T1070.003) or `All`.
    #[arg(short, long, default_value = "All")]
    technique: TechniqueSelector,
    /// Atomics folder, or a checkout containing `atomics/`.
    #[arg(long)]
    atomics_path: Option<PathBuf>,
    /// Run each dependency's prereq command before the test.
    #[arg(long)]
    check_dependencies: bool,
    /// Run get-prereq commands for unmet dependencies.
    #[arg(long)]
    get_prereqs: bool,
    /// Run the cleanup command after each test.
    #[arg(long)]
    cleanup: bool,
    /// Seconds before a single command is killed.
    #[arg(long)]
    command_timeout: Option<u64>,
    /// Print captured command output.
    #[arg(long)]
    show_details: bool,
    /// Ask for every input argument before running a test.
    #[arg(long = "prompt-for-input")]
    prompt_for_input: bool,
    /// Input override, `NAME=VALUE`. Repeatable.
    #[arg(short, long = "input", value_name = "NAME=VALUE")]
    inputs: Vec<String>,
    /// Operator config file.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

impl RunArgs {
    fn options(&self) -> RunOptions {
        RunOptions {
            selector: self.technique.clone(),
            atomics_path: self.atomics_path.clone(),
            check_dependencies: self.check_dependencies,
            get_prereqs: self.get_prereqs,
            cleanup: self.cleanup,
            command_timeout_secs: self.command_timeout,
            show_details: self.show_details,
            prompt_for_input_args: self.prompt_for_input,
            inputs: self.inputs.clone(),
        }
    }
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run(args) => cmd_run(&args),
        Command::List {
            atomics_path,
            json,
            config,
        } => match cmd_list(atomics_path, json, &config) {
            Ok(()) => exit_codes::OK,
            Err(err) => {
                eprintln!("{err:#}");
                exit_codes::INVALID
            }
        },
    };
    std::process::exit(code);
}

fn cmd_run(args: &RunArgs) -> i32 {
    let file = match load_config(&args.config) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("{err:#}");
            return exit_codes::INVALID;
        }
    };
    if let Err(err) = forward_interrupts() {
        warn!(err = %format!("{err:#}"), "Ctrl-C will not be forwarded to test commands");
    }
    let reporter = ConsoleReporter {
        show_details: args.show_details,
    };
    let result = run_atomics(
        &file,
        &args.options(),
        &LocalRunner,
        &TerminalPrompter,
        &reporter,
    );
    exit_code(&result)
}

fn exit_code(result: &Result<RunSummary, RunError>) -> i32 {
    match result {
        Ok(summary) => {
            println!(
                "{} completed, {} failed, {} skipped",
                summary.completed(),
                summary.failed(),
                summary.skipped()
            );
            if summary.failed() > 0 {
                exit_codes::TEST_FAILED
            } else {
                exit_codes::OK
            }
        }
        Err(err @ RunError::Halted { .. }) => {
            eprintln!("{}", error_chain(err));
            exit_codes::HALTED
        }
        Err(err) => {
            eprintln!("{}", error_chain(err));
            exit_codes::INVALID
        }
    }
}

/// Render an error and its sources as `outer: inner: ...`.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

fn cmd_list(atomics_path: Option<PathBuf>, json: bool, config: &Path) -> Result<()> {
    let file: OperatorConfig = load_config(config)?;
    let requested = atomics_path
        .or(file.atomics_path)
        .unwrap_or_else(|| PathBuf::from("."));
    let techniques = load_techniques(&requested)?;
    let listed = list_techniques(&techniques, current_platform()?);

    if json {
        let payload = serde_json::to_string_pretty(&listed).context("serialize listing")?;
        println!("{payload}");
        return Ok(());
    }
    for item in &listed {
        println!(
            "{}\t{}/{} eligible\t{}",
            item.id, item.eligible_tests, item.tests, item.display_name
        );
    }
    Ok(())
}
