//! A test paired with its resolved inputs.

use std::path::Path;

use crate::core::inputs::ResolvedInputs;
use crate::core::template::render_command;
use crate::core::types::{AtomicTest, Technique};

/// A test whose declared inputs are all bound.
///
/// Backends only accept this type, so a test can never reach execution with
/// unresolved inputs.
#[derive(Debug, Clone)]
pub struct BoundTest<'a> {
    pub technique: &'a Technique,
    pub test: &'a AtomicTest,
    pub inputs: ResolvedInputs,
}

impl<'a> BoundTest<'a> {
    pub fn bind(technique: &'a Technique, test: &'a AtomicTest, inputs: ResolvedInputs) -> Self {
        Self {
            technique,
            test,
            inputs,
        }
    }

    /// Render a command template owned by this test.
    pub fn render(&self, template: &str, atomics_folder: &Path) -> String {
        render_command(template, &self.inputs, atomics_folder)
    }

    pub fn technique_id(&self) -> &str {
        &self.technique.attack_technique
    }

    pub fn name(&self) -> &str {
        &self.test.name
    }
}
