//! Single command execution.
//!
//! A command is described by an [`Invocation`] (program plus arguments, as
//! produced by a node's transport) and executed by a [`ProcessRunner`]. The
//! outcome is always a [`CommandResult`]: failures to start the process or
//! reach the machine are reported through the exit status, never as errors.

use log::{debug, warn};
use std::process::{Command, Stdio};

/// Exit status reported when the process could not be started or the
/// machine could not be reached. Matches the OpenSSH client convention.
pub const TRANSPORT_FAILURE_RC: i32 = 255;

/// Outcome of one command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// The literal command line that was run
    pub command_line: String,
    /// Exit code (0 for success)
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// First line of standard output without its newline, or empty.
    pub fn first_line(&self) -> String {
        self.stdout
            .lines()
            .next()
            .unwrap_or("")
            .trim_end_matches('\r')
            .to_string()
    }

    /// Undoes the `\r\n` line endings of output captured through a
    /// pseudo-terminal.
    pub fn from_tty(mut self) -> Self {
        self.stdout = self.stdout.replace("\r\n", "\n");
        self.stderr = self.stderr.replace("\r\n", "\n");
        self
    }

    /// A result for a command that never ran.
    pub fn transport_failure(command_line: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            exit_code: TRANSPORT_FAILURE_RC,
            stdout: String::new(),
            stderr: message.into(),
        }
    }

    /// A successful result that did not run anything.
    pub fn skipped(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            ..Self::default()
        }
    }
}

/// A fully qualified process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The invocation as it would be typed into a shell.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(display_arg)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Executes invocations. Blocks until the process exits.
pub trait ProcessRunner {
    fn run(&self, invocation: &Invocation) -> CommandResult;
}

/// Runs invocations as local child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> CommandResult {
        let command_line = invocation.command_line();
        debug!("Running: {}", command_line);

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!("Could not start {}: {}", invocation.program, e);
                return CommandResult::transport_failure(
                    command_line,
                    format!("Failed to start {}: {}", invocation.program, e),
                );
            }
        };

        let result = CommandResult {
            command_line,
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!("Command exit code: {}", result.exit_code);
        if !result.stdout.is_empty() {
            debug!("Command stdout: {}", result.stdout);
        }
        if !result.stderr.is_empty() {
            debug!("Command stderr: {}", result.stderr);
        }
        result
    }
}

/// Escape a string for safe use in shell commands.
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn display_arg(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+%".contains(c));
    if plain {
        arg.to_string()
    } else {
        shell_escape(arg)
    }
}
