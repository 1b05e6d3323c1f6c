//! Line-oriented prompting.

use std::io::{self, BufRead, StdinLock, Stdout, Write};

use super::AuthoringError;

/// Interactive channel used while authoring a configuration.
pub trait Prompter {
    /// Shows one line of text.
    ///
    /// # Errors
    ///
    /// Returns [`AuthoringError::Io`] when the output cannot be written.
    fn say(&mut self, line: &str) -> Result<(), AuthoringError>;

    /// Asks a question and returns the trimmed answer, or `default` when the
    /// answer is empty.
    ///
    /// # Errors
    ///
    /// Returns [`AuthoringError::Io`] when the terminal cannot be read or
    /// written.
    fn ask(&mut self, prompt: &str, default: Option<&str>) -> Result<String, AuthoringError>;
}

/// [`Prompter`] reading answers from `input` and writing to `output`.
///
/// End of input is treated as an empty answer.
#[derive(Debug)]
pub struct TerminalPrompter<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompter<StdinLock<'static>, Stdout> {
    /// Prompts on the process's standard input and output.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    /// Creates a prompter over arbitrary streams.
    pub const fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Returns the output stream.
    pub fn into_output(self) -> W {
        self.output
    }
}

fn io_error(err: &io::Error) -> AuthoringError {
    AuthoringError::Io(err.to_string())
}

impl<R: BufRead, W: Write> Prompter for TerminalPrompter<R, W> {
    fn say(&mut self, line: &str) -> Result<(), AuthoringError> {
        writeln!(self.output, "{line}").map_err(|err| io_error(&err))
    }

    fn ask(&mut self, prompt: &str, default: Option<&str>) -> Result<String, AuthoringError> {
        let fallback = default.unwrap_or_default();
        if fallback.is_empty() {
            write!(self.output, "{prompt}: ")
        } else {
            write!(self.output, "{prompt} [{fallback}]: ")
        }
        .and_then(|()| self.output.flush())
        .map_err(|err| io_error(&err))?;

        let mut line = String::new();
        self.input
            .read_line(&mut line)
            .map_err(|err| io_error(&err))?;
        let answer = line.trim();
        if answer.is_empty() {
            return Ok(fallback.to_owned());
        }
        Ok(answer.to_owned())
    }
}
