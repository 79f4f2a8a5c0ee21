//! Command template rendering.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::core::inputs::ResolvedInputs;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\{([^{}]+)\}").expect("placeholder pattern should be valid"));

const ATOMICS_FOLDER_TOKENS: [&str; 2] = ["$PathToAtomicsFolder", "PathToAtomicsFolder"];

/// Substitute `#{name}` placeholders with bound inputs, then the atomics folder token.
///
/// Placeholders without a bound input are left untouched. The folder token is
/// replaced after inputs so defaults like `PathToAtomicsFolder/T1003/bin` resolve.
pub fn render_command(template: &str, inputs: &ResolvedInputs, atomics_folder: &Path) -> String {
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        inputs
            .get(&caps[1])
            .map_or_else(|| caps[0].to_string(), str::to_string)
    });
    let folder = atomics_folder.display().to_string();
    ATOMICS_FOLDER_TOKENS
        .iter()
        .fold(rendered.into_owned(), |acc, token| acc.replace(token, &folder))
}
