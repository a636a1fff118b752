//! Synchronous external tool execution.
//!
//! Tools are described with [`Cmd`] and executed by a [`ToolRunner`]. The
//! pipeline only ever talks to the trait, so tests substitute a fake runner
//! and never spawn `strip`, `tar` or `gzip`.
//!
//! # Example
//!
//! ```rust,ignore
//! use ninex_initrd::process::{Cmd, SystemRunner};
//!
//! Cmd::new("gzip")
//!     .args(["-S", ".img", "--quiet"])
//!     .arg_path(&archive)
//!     .run(&SystemRunner)?;
//! ```

use std::ffi::{OsStr, OsString};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::error::{BuildError, Result};

/// A single external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<OsString>,
    stdin: Option<Vec<u8>>,
    current_dir: Option<PathBuf>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    /// Bytes fed to the tool's standard input.
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn get_stdin(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Run the command and fail unless it exits with status zero.
    pub fn run(&self, runner: &dyn ToolRunner) -> Result<CommandResult> {
        debug!(tool = %self.program, args = ?self.args, "running external tool");
        let result = runner.run(self).map_err(|source| BuildError::ToolSpawn {
            tool: self.program.clone(),
            source,
        })?;

        if !result.success() {
            if !result.stderr.trim().is_empty() {
                warn!(tool = %self.program, stderr = %result.stderr.trim(), "tool reported errors");
            }
            return Err(BuildError::ExternalTool {
                tool: self.program.clone(),
                status: result.status_display(),
                stderr: result.stderr,
            });
        }

        Ok(result)
    }
}

/// Captured outcome of a finished tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code, `None` when the tool was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            ..Default::default()
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    fn status_display(&self) -> String {
        match self.code {
            Some(code) => format!("exit status: {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Executes tool invocations. Blocks until the tool finishes.
pub trait ToolRunner {
    /// Run `cmd` to completion. `Err` means the tool could not be started;
    /// a started tool that fails is reported through [`CommandResult`].
    fn run(&self, cmd: &Cmd) -> io::Result<CommandResult>;
}

/// Runs tools as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, cmd: &Cmd) -> io::Result<CommandResult> {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(dir) = &cmd.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        if let Some(input) = &cmd.stdin {
            // Dropping the handle closes the pipe so the tool sees EOF.
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input)?;
            }
        }
        let output = child.wait_with_output()?;

        Ok(CommandResult {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
