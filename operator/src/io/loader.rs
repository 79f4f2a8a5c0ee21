//! Technique definition loading from an atomics folder.
//!
//! Layout: `<atomics>/<TECHNIQUE_ID>/<TECHNIQUE_ID>.yaml`. The configured path may
//! be the atomics folder itself or a checkout that contains `atomics/`.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, instrument, warn};

use crate::core::error::RunError;
use crate::core::types::{Technique, Techniques};

/// Resolve `path` to the directory holding technique folders.
pub fn locate_atomics_folder(path: &Path) -> Result<PathBuf, RunError> {
    let nested = path.join("atomics");
    if nested.is_dir() {
        return Ok(nested);
    }
    if path.is_dir() && contains_technique_dirs(path) {
        return Ok(path.to_path_buf());
    }
    Err(RunError::AtomicsFolderNotFound(path.to_path_buf()))
}

/// Load every technique under `path`, keyed by technique id.
///
/// Technique folders without a definition file are skipped. A definition that
/// fails to parse aborts loading with the offending file in the error.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_techniques(path: &Path) -> Result<Techniques, RunError> {
    let folder = locate_atomics_folder(path)?;
    let mut techniques = Techniques::new();

    for dir in technique_dirs(&folder)? {
        let Some(name) = dir.file_name().and_then(OsStr::to_str) else {
            continue;
        };
        let Some(file) = definition_file(&dir, name) else {
            debug!(dir = %dir.display(), "no definition file, skipping");
            continue;
        };
        let technique = load_technique_file(&file)?;
        if technique.attack_technique != name {
            warn!(
                folder = name,
                attack_technique = %technique.attack_technique,
                "technique id does not match its folder"
            );
        }
        if techniques.contains_key(&technique.attack_technique) {
            warn!(attack_technique = %technique.attack_technique, "duplicate technique id, keeping first");
            continue;
        }
        techniques.insert(technique.attack_technique.clone(), technique);
    }

    debug!(count = techniques.len(), "techniques loaded");
    Ok(techniques)
}

/// Parse a single technique definition file.
pub fn load_technique_file(path: &Path) -> Result<Technique, RunError> {
    if !path.is_file() {
        return Err(RunError::MissingDefinitionFile(path.to_path_buf()));
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read definition {}", path.display()))?;
    let technique = serde_yaml::from_str(&contents)
        .with_context(|| format!("parse definition {}", path.display()))?;
    Ok(technique)
}

fn technique_dirs(folder: &Path) -> Result<Vec<PathBuf>, RunError> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(folder).with_context(|| format!("read {}", folder.display()))? {
        let path = entry
            .with_context(|| format!("read entry in {}", folder.display()))?
            .path();
        let is_technique = path
            .file_name()
            .and_then(OsStr::to_str)
            .is_some_and(is_technique_id);
        if is_technique && path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn contains_technique_dirs(folder: &Path) -> bool {
    technique_dirs(folder).is_ok_and(|dirs| !dirs.is_empty())
}

/// `T1003`, `T1003.001`; excludes folders like `Indexes` or `used_guids`.
fn is_technique_id(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('T') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

fn definition_file(dir: &Path, name: &str) -> Option<PathBuf> {
    ["yaml", "yml"]
        .iter()
        .map(|ext| dir.join(format!("{name}.{ext}")))
        .find(|candidate| candidate.is_file())
}
