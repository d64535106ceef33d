// src/privilege.rs

//! Privilege gateway
//!
//! The single place that decides how a command touching system-owned paths
//! gets elevated. Everything that writes to the shared binary directory,
//! portage configuration, or system package state goes through
//! [`PrivilegeGateway::run_privileged`], one invocation per logical action,
//! so the user sees at most one credential prompt per action.

use crate::error::{Error, Result};
use crate::process::{CommandLine, CommandOutcome, CommandRunner};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Elevation helpers, probed in this order
pub const ELEVATION_HELPERS: &[&str] = &["sudo", "doas"];

/// How privileged commands are executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Elevation {
    /// Already privileged: run commands as-is
    Direct,
    /// Prefix commands with this helper (prompts for credentials)
    Helper(String),
    /// Not privileged and no helper available
    Unavailable,
}

impl Elevation {
    /// Inspect the current process and PATH
    pub fn detect() -> Self {
        // SAFETY: geteuid has no preconditions and cannot fail.
        let euid = unsafe { libc::geteuid() };
        if euid == 0 {
            debug!("Running as root, no elevation helper needed");
            return Elevation::Direct;
        }

        for helper in ELEVATION_HELPERS {
            if let Ok(path) = which::which(helper) {
                debug!("Found elevation helper at {}", path.display());
                return Elevation::Helper((*helper).to_string());
            }
        }

        Elevation::Unavailable
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Elevation::Unavailable)
    }
}

/// Runs commands with elevated rights
pub struct PrivilegeGateway<'r> {
    runner: &'r dyn CommandRunner,
    elevation: Elevation,
}

impl<'r> PrivilegeGateway<'r> {
    pub fn new(runner: &'r dyn CommandRunner, elevation: Elevation) -> Self {
        Self { runner, elevation }
    }

    pub fn elevation(&self) -> &Elevation {
        &self.elevation
    }

    /// Unprivileged runner, for commands that only touch user-owned paths
    pub fn runner(&self) -> &'r dyn CommandRunner {
        self.runner
    }

    /// Fail early when privileged commands are impossible
    pub fn require(&self) -> Result<()> {
        if self.elevation.is_available() {
            return Ok(());
        }
        Err(Error::PrivilegeUnavailable(format!(
            "not running as root and none of {} found on PATH",
            ELEVATION_HELPERS.join(", ")
        )))
    }

    /// Run `cmd` with elevated rights and return its outcome
    pub fn run_privileged(&self, cmd: CommandLine) -> Result<CommandOutcome> {
        self.require()?;

        let cmd = match &self.elevation {
            Elevation::Helper(helper) => {
                info!("Requesting elevated rights via {} for: {}", helper, cmd);
                cmd.wrapped_by(helper)
            }
            _ => cmd,
        };

        Ok(self.runner.run(&cmd)?)
    }

    /// Write `contents` to a system-owned `dest` with the given octal mode
    ///
    /// The data is staged in a private temp file and moved into place with
    /// a single privileged `install` call.
    pub fn write_file(&self, dest: &Path, contents: &str, mode: &str) -> Result<CommandOutcome> {
        self.require()?;

        let mut staged = NamedTempFile::new()?;
        staged.write_all(contents.as_bytes())?;
        staged.flush()?;

        self.run_privileged(
            CommandLine::new("install")
                .args(["-m", mode])
                .arg_path(staged.path())
                .arg_path(dest),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::SystemRunner;
    use crate::process::fake::FakeRunner;

    #[test]
    fn test_direct_runs_command_unchanged() {
        let runner = FakeRunner::new();
        let gateway = PrivilegeGateway::new(&runner, Elevation::Direct);
        gateway
            .run_privileged(CommandLine::new("rm").args(["-f", "/usr/local/bin/japi"]))
            .unwrap();
        assert_eq!(runner.lines(), vec!["rm -f /usr/local/bin/japi"]);
    }

    #[test]
    fn test_helper_prefixes_command() {
        let runner = FakeRunner::new();
        let gateway = PrivilegeGateway::new(&runner, Elevation::Helper("sudo".to_string()));
        gateway
            .run_privileged(CommandLine::new("apt-get").args(["install", "-y", "python3"]))
            .unwrap();
        assert_eq!(runner.lines(), vec!["sudo apt-get install -y python3"]);
    }

    #[test]
    fn test_unavailable_fails_without_running() {
        let runner = FakeRunner::new();
        let gateway = PrivilegeGateway::new(&runner, Elevation::Unavailable);
        let err = gateway
            .run_privileged(CommandLine::new("pacman").arg("-S"))
            .unwrap_err();
        assert!(matches!(err, Error::PrivilegeUnavailable(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_write_file_installs_contents() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("japirc");
        let gateway = PrivilegeGateway::new(&SystemRunner, Elevation::Direct);

        let outcome = gateway
            .write_file(&dest, "dev-lang/python tk\n", "0644")
            .unwrap();
        assert!(outcome.success());
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "dev-lang/python tk\n");
    }

    #[test]
    fn test_write_file_uses_single_privileged_call() {
        let runner = FakeRunner::new();
        let gateway = PrivilegeGateway::new(&runner, Elevation::Helper("doas".to_string()));
        gateway
            .write_file(Path::new("/etc/portage/package.use/japirc"), "x\n", "0644")
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "doas");
        assert_eq!(calls[0].args[0], "install");
        assert_eq!(calls[0].args.last().unwrap(), "/etc/portage/package.use/japirc");
    }
}
