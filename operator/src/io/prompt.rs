//! Terminal prompting for input arguments.

use std::io::{self, BufRead, Write};

use crate::core::inputs::Prompter;
use crate::core::types::InputArgument;

/// Prompts on stdout and reads answers from stdin.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt(&self, test_name: &str, input: &InputArgument) -> io::Result<Option<String>> {
        let stdin = io::stdin();
        let mut stdout = io::stdout().lock();
        prompt_with(&mut stdin.lock(), &mut stdout, test_name, input)
    }
}

/// Write the question to `writer` and read one answer line from `reader`.
///
/// A blank line or EOF yields `None` so the caller falls back to the default.
pub fn prompt_with<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    test_name: &str,
    input: &InputArgument,
) -> io::Result<Option<String>> {
    if let Some(description) = input.description.as_deref().map(str::trim)
        && !description.is_empty()
    {
        writeln!(writer, "{description}")?;
    }
    write!(writer, "{test_name} :: {} ({})", input.name, input.kind)?;
    if let Some(default) = &input.default {
        write!(writer, " [default: {default}]")?;
    }
    write!(writer, ": ")?;
    writer.flush()?;

    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let answer = line.trim();
    if answer.is_empty() {
        Ok(None)
    } else {
        Ok(Some(answer.to_string()))
    }
}
