//! Technique and test definitions.
//!
//! These types mirror the Atomic Red Team definition layout and are immutable
//! once loaded. The dispatcher only ever borrows them.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_yaml::{Mapping, Value};

/// Loaded techniques keyed by technique id, iterated in id order.
pub type Techniques = BTreeMap<String, Technique>;

/// A named adversarial behavior with its ordered tests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Technique {
    pub attack_technique: String,
    pub display_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub atomic_tests: Vec<AtomicTest>,
}

/// A single executable procedure within a technique.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AtomicTest {
    pub name: String,
    #[serde(default)]
    pub auto_generated_guid: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Empty means platform-agnostic.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub supported_platforms: Vec<String>,
    #[serde(default, deserialize_with = "input_arguments")]
    pub input_arguments: Vec<InputArgument>,
    #[serde(default)]
    pub dependency_executor_name: Option<ExecutorKind>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub dependencies: Vec<Dependency>,
    pub executor: ExecutorSpec,
}

/// Declared input of a test. Declaration order is preserved from the definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputArgument {
    pub name: String,
    pub description: Option<String>,
    /// Free-form type hint (`string`, `path`, `integer`, ...), used when prompting.
    pub kind: String,
    pub default: Option<String>,
}

/// Interpreter a test command is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    Sh,
    Bash,
    Powershell,
    CommandPrompt,
    Manual,
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutorKind::Sh => "sh",
            ExecutorKind::Bash => "bash",
            ExecutorKind::Powershell => "powershell",
            ExecutorKind::CommandPrompt => "command_prompt",
            ExecutorKind::Manual => "manual",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutorSpec {
    pub name: ExecutorKind,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub cleanup_command: Option<String>,
    #[serde(default)]
    pub elevation_required: bool,
    /// Operator instructions for `manual` executors.
    #[serde(default)]
    pub steps: Option<String>,
}

/// Prerequisite of a test: a check command plus the command that satisfies it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Dependency {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prereq_command: String,
    #[serde(default)]
    pub get_prereq_command: String,
}

#[derive(Deserialize)]
struct RawInputArgument {
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    default: Value,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Definitions declare inputs as a mapping of name to settings; keep mapping order.
fn input_arguments<'de, D>(deserializer: D) -> Result<Vec<InputArgument>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(mapping) = Option::<Mapping>::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    let mut inputs = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let name = scalar_to_string(&key)
            .ok_or_else(|| D::Error::custom("input argument names must be scalars"))?;
        let raw: RawInputArgument = serde_yaml::from_value(value)
            .map_err(|err| D::Error::custom(format!("input argument `{name}`: {err}")))?;
        inputs.push(InputArgument {
            name,
            description: raw.description,
            kind: raw.kind.unwrap_or_else(|| "string".to_string()),
            default: scalar_to_string(&raw.default),
        });
    }
    Ok(inputs)
}

/// Defaults may be written as strings, numbers or booleans.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}
