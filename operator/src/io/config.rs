//! Operator configuration: the optional TOML file plus per-invocation options.
//!
//! The file supplies defaults; invocation options take precedence. The merged
//! result is an immutable [`RunConfig`] that is passed explicitly to every
//! component of a run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::core::error::RunError;
use crate::core::inputs::InputOverrides;
use crate::core::selector::TechniqueSelector;
use crate::io::loader::locate_atomics_folder;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "atomic-operator.toml";
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 100_000;

/// Operator configuration file (TOML).
///
/// Missing fields default to the values used when no file exists.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OperatorConfig {
    /// Atomics folder or a checkout containing `atomics/`.
    pub atomics_path: Option<PathBuf>,

    pub command_timeout_secs: u64,

    /// Truncate captured stdout/stderr of each command beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Input overrides applied to every test declaring an input of that name.
    pub inputs: BTreeMap<String, String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            atomics_path: None,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            inputs: BTreeMap::new(),
        }
    }
}

/// Per-invocation options, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub selector: TechniqueSelector,
    pub atomics_path: Option<PathBuf>,
    pub check_dependencies: bool,
    pub get_prereqs: bool,
    pub cleanup: bool,
    pub command_timeout_secs: Option<u64>,
    pub show_details: bool,
    pub prompt_for_input_args: bool,
    /// Raw `NAME=VALUE` overrides.
    pub inputs: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            selector: TechniqueSelector::All,
            atomics_path: None,
            check_dependencies: false,
            get_prereqs: false,
            cleanup: false,
            command_timeout_secs: None,
            show_details: false,
            prompt_for_input_args: false,
            inputs: Vec::new(),
        }
    }
}

/// Immutable options for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Located atomics folder (the directory holding technique folders).
    pub atomics_path: PathBuf,
    pub check_dependencies: bool,
    pub get_prereqs: bool,
    pub cleanup: bool,
    pub command_timeout: Duration,
    pub show_details: bool,
    pub prompt_for_input_args: bool,
    pub output_limit_bytes: usize,
}

impl RunConfig {
    /// Merge file config and invocation options, then validate.
    ///
    /// Returns the run configuration and the run-wide input overrides.
    pub fn resolve(
        file: &OperatorConfig,
        options: &RunOptions,
    ) -> Result<(RunConfig, InputOverrides), RunError> {
        let timeout_secs = options
            .command_timeout_secs
            .unwrap_or(file.command_timeout_secs);
        if timeout_secs == 0 {
            return Err(RunError::IncorrectParameters(
                "command timeout must be > 0 seconds".to_string(),
            ));
        }
        if file.output_limit_bytes == 0 {
            return Err(RunError::IncorrectParameters(
                "output_limit_bytes must be > 0".to_string(),
            ));
        }

        let mut overrides = InputOverrides::new();
        for (name, value) in &file.inputs {
            overrides.insert(name, value)?;
        }
        for pair in &options.inputs {
            overrides.insert_pair(pair)?;
        }

        let requested = options
            .atomics_path
            .clone()
            .or_else(|| file.atomics_path.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        let atomics_path = locate_atomics_folder(&requested)?;

        let config = RunConfig {
            atomics_path,
            check_dependencies: options.check_dependencies,
            get_prereqs: options.get_prereqs,
            cleanup: options.cleanup,
            command_timeout: Duration::from_secs(timeout_secs),
            show_details: options.show_details,
            prompt_for_input_args: options.prompt_for_input_args,
            output_limit_bytes: file.output_limit_bytes,
        };
        debug!(?config, "run config resolved");
        Ok((config, overrides))
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OperatorConfig::default()`.
pub fn load_config(path: &Path) -> Result<OperatorConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config file missing, using defaults");
        return Ok(OperatorConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::AtomicsDir;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, OperatorConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("atomic-operator.toml");
        fs::write(&path, "command_timeout_secs = 7\n").expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded.command_timeout_secs, 7);
        assert_eq!(loaded.output_limit_bytes, DEFAULT_OUTPUT_LIMIT_BYTES);
        assert!(loaded.inputs.is_empty());
    }

    #[test]
    fn options_take_precedence_over_file() {
        let atomics = AtomicsDir::new().expect("atomics");
        let mut file = OperatorConfig {
            atomics_path: Some(PathBuf::from("/nonexistent")),
            command_timeout_secs: 30,
            ..OperatorConfig::default()
        };
        file.inputs.insert("x".to_string(), "file".to_string());
        file.inputs.insert("y".to_string(), "file".to_string());
        let options = RunOptions {
            atomics_path: Some(atomics.root().to_path_buf()),
            command_timeout_secs: Some(3),
            cleanup: true,
            inputs: vec!["x=cli".to_string()],
            ..RunOptions::default()
        };

        let (config, overrides) = RunConfig::resolve(&file, &options).expect("resolve");
        assert_eq!(config.command_timeout, Duration::from_secs(3));
        assert_eq!(config.atomics_path, atomics.atomics_folder());
        assert!(config.cleanup);
        assert!(!config.check_dependencies);
        assert_eq!(overrides.get("x"), Some("cli"));
        assert_eq!(overrides.get("y"), Some("file"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let options = RunOptions {
            command_timeout_secs: Some(0),
            ..RunOptions::default()
        };
        let err = RunConfig::resolve(&OperatorConfig::default(), &options).unwrap_err();
        assert!(matches!(err, RunError::IncorrectParameters(_)));
    }

    #[test]
    fn missing_atomics_folder_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let options = RunOptions {
            atomics_path: Some(temp.path().join("nope")),
            ..RunOptions::default()
        };
        let err = RunConfig::resolve(&OperatorConfig::default(), &options).unwrap_err();
        assert!(matches!(err, RunError::AtomicsFolderNotFound(_)));
    }
}
