//! External command execution for auth providers.
//!
//! Commands are an explicit program plus argument vector; nothing is passed
//! through a shell.

use std::fmt;
use std::io::{self, Read};
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A command to run: program and ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl AuthCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from the `cmd-path` / `cmd-args` pair of an auth provider config.
    ///
    /// `cmd-args` is split on whitespace.
    pub fn from_config(cmd_path: &str, cmd_args: Option<&str>) -> Self {
        let args = cmd_args
            .map(|a| a.split_whitespace().map(String::from).collect())
            .unwrap_or_default();
        Self::new(cmd_path, args)
    }
}

impl fmt::Display for AuthCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Stdout and stderr joined for diagnostics.
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Capability to run an [`AuthCommand`] to completion.
///
/// Injected into [`CredentialContext`](crate::CredentialContext) so token
/// refresh can be exercised without spawning processes.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &AuthCommand) -> io::Result<CommandOutput>;
}

/// [`CommandRunner`] that spawns real processes.
///
/// Blocks until the command exits. With a timeout configured, a command
/// still running at the deadline is killed and reported as
/// [`io::ErrorKind::TimedOut`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, command: &AuthCommand) -> io::Result<CommandOutput> {
        debug!(program = %command.program, args = command.args.len(), "running auth command");

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let Some(timeout) = self.timeout else {
            return child.wait_with_output().map(CommandOutput::from);
        };

        // Drain pipes on their own threads so a chatty command cannot block on a full pipe.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);
        let deadline = Instant::now() + timeout;

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                warn!(command = %command, ?timeout, "auth command timed out, killing it");
                let _ = child.kill();
                let _ = child.wait();
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("command did not finish within {timeout:?}"),
                ));
            }
            thread::sleep(POLL_INTERVAL);
        };

        Ok(CommandOutput {
            status: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}
