//! Entry point for `atomic-operator run`.

use tracing::instrument;

use crate::core::error::RunError;
use crate::core::inputs::Prompter;
use crate::core::platform::current_platform;
use crate::dispatch::{Dispatcher, RunSummary};
use crate::io::backend::ExecutionBackend;
use crate::io::config::{OperatorConfig, RunConfig, RunOptions};
use crate::io::loader::load_techniques;
use crate::report::Reporter;

/// Build the run configuration, load definitions and dispatch.
///
/// Everything that can fail for the invocation as a whole (platform, config,
/// atomics folder, definitions, selector) is checked before the first test runs.
#[instrument(skip_all, fields(selector = %options.selector))]
pub fn run_atomics<B, P, R>(
    file: &OperatorConfig,
    options: &RunOptions,
    backend: &B,
    prompter: &P,
    reporter: &R,
) -> Result<RunSummary, RunError>
where
    B: ExecutionBackend,
    P: Prompter,
    R: Reporter,
{
    let platform = current_platform()?;
    let (config, overrides) = RunConfig::resolve(file, options)?;
    let techniques = load_techniques(&config.atomics_path)?;
    Dispatcher::new(&config, platform, backend, prompter, reporter).run(
        &techniques,
        &options.selector,
        &overrides,
    )
}
