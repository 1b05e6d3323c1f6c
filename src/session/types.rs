//! Command runner abstraction used by the remote session.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};

use super::SessionError;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Human readable exit status for error messages.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SessionError>;

    /// Runs `program` while streaming `input` into its standard input.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Spawn`] if the command cannot be started or
    /// its standard input cannot be written.
    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &mut dyn Read,
    ) -> Result<CommandOutput, SessionError>;
}

/// Real command runner that captures output without echoing it.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SessionError> {
        execute(program, args, None, &silent)
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &mut dyn Read,
    ) -> Result<CommandOutput, SessionError> {
        execute(program, args, Some(input), &silent)
    }
}

/// Command runner that mirrors remote command output to the local standard
/// error while still capturing it for error reporting.
///
/// Transfers fed through [`CommandRunner::run_with_input`] are captured but
/// not mirrored, as their output is the remote sink's protocol replies.
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamingCommandRunner;

impl CommandRunner for StreamingCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SessionError> {
        execute(program, args, None, &diagnostics)
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &mut dyn Read,
    ) -> Result<CommandOutput, SessionError> {
        execute(program, args, Some(input), &silent)
    }
}

/// Produces the writer that receives a copy of one output stream.
type Mirror<'a> = &'a dyn Fn() -> Box<dyn Write + Send>;

fn silent() -> Box<dyn Write + Send> {
    Box::new(io::sink())
}

fn diagnostics() -> Box<dyn Write + Send> {
    Box::new(io::stderr())
}

fn execute(
    program: &str,
    args: &[OsString],
    input: Option<&mut dyn Read>,
    mirror: Mirror<'_>,
) -> Result<CommandOutput, SessionError> {
    let spawn_error = |err: &dyn std::fmt::Display| SessionError::Spawn {
        program: program.to_owned(),
        message: err.to_string(),
    };

    let stdin = if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };
    let mut child = Command::new(program)
        .args(args)
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| spawn_error(&err))?;

    let (stdout_pump, stderr_pump) = start_pumps(&mut child, mirror);

    if let Some(reader) = input {
        let feed = child
            .stdin
            .take()
            .map_or(Ok(0), |mut stdin| io::copy(reader, &mut stdin));
        if let Err(err) = feed {
            child.kill().ok();
            child.wait().ok();
            return Err(spawn_error(&err));
        }
    }

    let status = child.wait().map_err(|err| spawn_error(&err))?;
    let stdout = join_pump(stdout_pump).map_err(|err| spawn_error(&err))?;
    let stderr = join_pump(stderr_pump).map_err(|err| spawn_error(&err))?;

    Ok(CommandOutput {
        code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

type Pump = Option<JoinHandle<io::Result<Vec<u8>>>>;

fn start_pumps(child: &mut Child, mirror: Mirror<'_>) -> (Pump, Pump) {
    let stdout = child.stdout.take().map(|pipe| {
        let sink = mirror();
        thread::spawn(move || pump(pipe, sink))
    });
    let stderr = child.stderr.take().map(|pipe| {
        let sink = mirror();
        thread::spawn(move || pump(pipe, sink))
    });
    (stdout, stderr)
}

fn pump(mut source: impl Read, mut sink: impl Write) -> io::Result<Vec<u8>> {
    let mut captured = Vec::new();
    let mut chunk = [0_u8; 8192];
    loop {
        let read = source.read(&mut chunk)?;
        let Some(bytes) = chunk.get(..read) else {
            break;
        };
        if bytes.is_empty() {
            break;
        }
        sink.write_all(bytes)?;
        sink.flush()?;
        captured.extend_from_slice(bytes);
    }
    Ok(captured)
}

fn join_pump(pump: Pump) -> io::Result<Vec<u8>> {
    let Some(handle) = pump else {
        return Ok(Vec::new());
    };
    handle
        .join()
        .map_err(|_| io::Error::other("output reader thread panicked"))?
}
