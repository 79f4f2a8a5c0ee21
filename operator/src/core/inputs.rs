//! Input argument resolution.
//!
//! Precedence per declared input: caller override, then an interactive prompt
//! (when enabled), then the declared default. Only declared inputs are ever
//! consulted, so overrides meant for other tests are ignored here.

use std::collections::BTreeMap;
use std::io;

use tracing::debug;

use crate::core::error::{InputError, RunError};
use crate::core::types::{AtomicTest, InputArgument};

/// Source of interactively supplied input values.
pub trait Prompter {
    /// Ask the operator for `input` of `test_name`.
    ///
    /// `Ok(None)` means "no answer"; resolution then falls back to the default.
    fn prompt(&self, test_name: &str, input: &InputArgument) -> io::Result<Option<String>>;
}

/// Run-wide input overrides keyed by input name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputOverrides(BTreeMap<String, String>);

impl InputOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an override, rejecting blank names.
    pub fn insert(&mut self, name: &str, value: &str) -> Result<(), RunError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RunError::IncorrectParameters(
                "input override names must be non-empty".to_string(),
            ));
        }
        self.0.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Parse a `name=value` pair and insert it.
    pub fn insert_pair(&mut self, pair: &str) -> Result<(), RunError> {
        let (name, value) = pair.split_once('=').ok_or_else(|| {
            RunError::IncorrectParameters(format!("input override `{pair}` must be NAME=VALUE"))
        })?;
        self.insert(name, value)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Fully resolved inputs for one test: every declared input has a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedInputs(BTreeMap<String, String>);

impl ResolvedInputs {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolve every declared input of `test`.
///
/// The prompter is only consulted when `interactive` is set and no override
/// exists. Fails on the first input left without a value.
pub fn resolve_inputs<P: Prompter>(
    test: &AtomicTest,
    overrides: &InputOverrides,
    interactive: bool,
    prompter: &P,
) -> Result<ResolvedInputs, InputError> {
    let mut resolved = BTreeMap::new();
    for input in &test.input_arguments {
        let value = resolve_one(&test.name, input, overrides, interactive, prompter)?;
        resolved.insert(input.name.clone(), value);
    }
    Ok(ResolvedInputs(resolved))
}

fn resolve_one<P: Prompter>(
    test_name: &str,
    input: &InputArgument,
    overrides: &InputOverrides,
    interactive: bool,
    prompter: &P,
) -> Result<String, InputError> {
    if let Some(value) = overrides.get(&input.name) {
        debug!(input = %input.name, "using override");
        return Ok(value.to_string());
    }
    if interactive {
        let answer = prompter
            .prompt(test_name, input)
            .map_err(|source| InputError::Prompt {
                input: input.name.clone(),
                source,
            })?;
        if let Some(value) = answer {
            debug!(input = %input.name, "using prompted value");
            return Ok(value);
        }
    }
    input
        .default
        .clone()
        .ok_or_else(|| InputError::MissingInputValue {
            input: input.name.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedPrompter, atomic_test, input};

    fn overrides(pairs: &[(&str, &str)]) -> InputOverrides {
        let mut overrides = InputOverrides::new();
        for (name, value) in pairs {
            overrides.insert(name, value).expect("insert");
        }
        overrides
    }

    #[test]
    fn defaults_fill_inputs_without_overrides() {
        let test = atomic_test(
            "t",
            &[],
            vec![input("x", Some("1")), input("y", Some("two"))],
        );
        let resolved = resolve_inputs(
            &test,
            &InputOverrides::new(),
            false,
            &ScriptedPrompter::silent(),
        )
        .expect("resolve");
        assert_eq!(resolved.get("x"), Some("1"));
        assert_eq!(resolved.get("y"), Some("two"));
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn override_beats_prompt_and_default() {
        let test = atomic_test("t", &[], vec![input("x", Some("1"))]);
        let prompter = ScriptedPrompter::new(&[("x", Some("prompted"))]);
        let resolved =
            resolve_inputs(&test, &overrides(&[("x", "override")]), true, &prompter)
                .expect("resolve");
        assert_eq!(resolved.get("x"), Some("override"));
        assert!(prompter.asked().is_empty());
    }

    #[test]
    fn prompt_is_authoritative_when_interactive() {
        let test = atomic_test("t", &[], vec![input("x", Some("1"))]);
        let prompter = ScriptedPrompter::new(&[("x", Some("prompted"))]);
        let resolved =
            resolve_inputs(&test, &InputOverrides::new(), true, &prompter).expect("resolve");
        assert_eq!(resolved.get("x"), Some("prompted"));
        assert_eq!(prompter.asked(), vec!["t::x".to_string()]);
    }

    #[test]
    fn empty_prompt_answer_falls_back_to_default() {
        let test = atomic_test("t", &[], vec![input("x", Some("1"))]);
        let prompter = ScriptedPrompter::new(&[("x", None)]);
        let resolved =
            resolve_inputs(&test, &InputOverrides::new(), true, &prompter).expect("resolve");
        assert_eq!(resolved.get("x"), Some("1"));
    }

    #[test]
    fn prompter_is_not_used_when_not_interactive() {
        let test = atomic_test("t", &[], vec![input("x", Some("1"))]);
        let prompter = ScriptedPrompter::new(&[("x", Some("prompted"))]);
        let resolved =
            resolve_inputs(&test, &InputOverrides::new(), false, &prompter).expect("resolve");
        assert_eq!(resolved.get("x"), Some("1"));
        assert!(prompter.asked().is_empty());
    }

    #[test]
    fn missing_value_is_reported() {
        let test = atomic_test("t", &[], vec![input("x", Some("1")), input("y", None)]);
        let err = resolve_inputs(
            &test,
            &InputOverrides::new(),
            false,
            &ScriptedPrompter::silent(),
        )
        .unwrap_err();
        assert!(matches!(err, InputError::MissingInputValue { input } if input == "y"));
    }

    #[test]
    fn undeclared_overrides_are_not_bound() {
        let test = atomic_test("t", &[], vec![input("x", Some("1"))]);
        let resolved = resolve_inputs(
            &test,
            &overrides(&[("other", "value")]),
            false,
            &ScriptedPrompter::silent(),
        )
        .expect("resolve");
        assert_eq!(resolved.get("other"), None);
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn insert_pair_splits_on_first_equals() {
        let mut overrides = InputOverrides::new();
        overrides.insert_pair("cmd=a=b").expect("pair");
        assert_eq!(overrides.get("cmd"), Some("a=b"));

        assert!(matches!(
            overrides.insert_pair("novalue"),
            Err(RunError::IncorrectParameters(_))
        ));
        assert!(matches!(
            overrides.insert_pair(" =value"),
            Err(RunError::IncorrectParameters(_))
        ));
    }
}
