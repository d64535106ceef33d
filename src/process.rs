// src/process.rs

//! External command execution
//!
//! Every external program the engine runs (package managers, the venv
//! interpreter, coreutils behind the privilege gateway) goes through a
//! [`CommandRunner`]. [`SystemRunner`] spawns real processes; tests swap in
//! a scripted runner.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// A program plus its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    /// Inherit stdio so the user sees progress and can answer prompts
    pub interactive: bool,
}

impl CommandLine {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            interactive: false,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Prefix this command with a wrapper program, e.g. `sudo`
    pub fn wrapped_by(self, wrapper: impl AsRef<str>) -> Self {
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: wrapper.as_ref().to_string(),
            args,
            interactive: self.interactive,
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit code, `None` if terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code, or -1 if terminated by signal
    pub fn code(&self) -> i32 {
        self.code.unwrap_or(-1)
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }

    /// One-line failure description for error messages
    pub fn describe_failure(&self, cmd: &CommandLine) -> String {
        let stderr = self.stderr_trimmed();
        if stderr.is_empty() {
            format!("'{}' exited with code {}", cmd, self.code())
        } else {
            format!("'{}' exited with code {}: {}", cmd, self.code(), stderr)
        }
    }
}

/// Runs external commands
pub trait CommandRunner {
    /// Run `cmd` to completion
    ///
    /// A non-zero exit is not an error at this level; callers inspect
    /// [`CommandOutcome::success`]. `Err` means the program could not be
    /// spawned at all.
    fn run(&self, cmd: &CommandLine) -> io::Result<CommandOutcome>;
}

/// Spawns real processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &CommandLine) -> io::Result<CommandOutcome> {
        debug!("Running: {}", cmd);

        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);

        if cmd.interactive {
            let status = command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()?;
            return Ok(CommandOutcome {
                code: status.code(),
                ..CommandOutcome::default()
            });
        }

        let output = command.stdin(Stdio::null()).output()?;
        Ok(CommandOutcome {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
