// src/launcher.rs

//! Launch-mode dispatch
//!
//! Maps a mode (`tui`, `gui`, `server`, or `1`/`2`/`3`) to an entry-point
//! script inside the environment and replaces the current process with the
//! environment's interpreter running it.

use crate::config::InstallationConfig;
use crate::environment;
use crate::error::{Error, Result};
use std::ffi::OsString;
use std::fmt;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;
use std::str::FromStr;
use tracing::{debug, info};

/// Environment variables indicating a graphical session
pub const DISPLAY_VARS: &[&str] = &["DISPLAY", "WAYLAND_DISPLAY"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    Tui,
    Gui,
    Server,
}

impl LaunchMode {
    pub const ALL: [LaunchMode; 3] = [LaunchMode::Tui, LaunchMode::Gui, LaunchMode::Server];

    pub fn number(self) -> u8 {
        match self {
            LaunchMode::Tui => 1,
            LaunchMode::Gui => 2,
            LaunchMode::Server => 3,
        }
    }

    fn script(self, config: &InstallationConfig) -> &str {
        match self {
            LaunchMode::Tui => &config.entry_points.tui,
            LaunchMode::Gui => &config.entry_points.gui,
            LaunchMode::Server => &config.entry_points.server,
        }
    }
}

impl FromStr for LaunchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tui" | "1" => Ok(LaunchMode::Tui),
            "gui" | "2" => Ok(LaunchMode::Gui),
            "server" | "3" => Ok(LaunchMode::Server),
            _ => Err(Error::UsagePreconditionFailed(format!(
                "unrecognized mode '{}'; expected tui, gui or server (or 1, 2, 3)",
                s
            ))),
        }
    }
}

impl fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LaunchMode::Tui => "TUI client",
            LaunchMode::Gui => "GUI client",
            LaunchMode::Server => "Server",
        };
        write!(f, "{}) {}", self.number(), label)
    }
}

/// Ask for a mode on the terminal
pub fn prompt_mode() -> Result<LaunchMode> {
    inquire::Select::new("Select a mode:", LaunchMode::ALL.to_vec())
        .prompt()
        .map_err(|e| Error::UsagePreconditionFailed(format!("no mode selected: {}", e)))
}

/// GUI mode needs a display session; other modes always pass
pub fn check_display(mode: LaunchMode, var: impl Fn(&str) -> Option<OsString>) -> Result<()> {
    if mode != LaunchMode::Gui {
        return Ok(());
    }

    let present = DISPLAY_VARS
        .iter()
        .any(|name| var(name).is_some_and(|value| !value.is_empty()));
    if !present {
        return Err(Error::UsagePreconditionFailed(format!(
            "GUI mode needs a graphical session but none of {} is set",
            DISPLAY_VARS.join(", ")
        )));
    }
    Ok(())
}

/// Interpreter, script and working directory for one launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub mode: LaunchMode,
    pub python: PathBuf,
    pub script: PathBuf,
    pub working_dir: PathBuf,
}

/// Resolve what to run for `mode`
///
/// The display precondition is checked before anything on disk is looked at.
pub fn plan(
    config: &InstallationConfig,
    mode: LaunchMode,
    var: impl Fn(&str) -> Option<OsString>,
) -> Result<LaunchPlan> {
    check_display(mode, var)?;

    if !environment::is_installed(config) {
        return Err(Error::UsagePreconditionFailed(format!(
            "{} is not installed (no environment at {}); run 'japirc-setup install' first",
            config.app_name,
            config.environment_dir.display()
        )));
    }

    let script = config.environment_dir.join(mode.script(config));
    if !script.is_file() {
        return Err(Error::UsagePreconditionFailed(format!(
            "{} is missing; reinstall to restore it",
            script.display()
        )));
    }

    let python = config.environment_python();
    if !python.exists() {
        return Err(Error::UsagePreconditionFailed(format!(
            "environment interpreter {} is missing; reinstall to restore it",
            python.display()
        )));
    }

    Ok(LaunchPlan {
        mode,
        python,
        script,
        working_dir: config.environment_dir.clone(),
    })
}

/// Replace the current process with the planned command
///
/// Only returns if exec itself fails.
pub fn exec(plan: &LaunchPlan, extra_args: &[String]) -> Error {
    info!("Starting {}", plan.mode);
    debug!("exec {} {}", plan.python.display(), plan.script.display());

    let err = Command::new(&plan.python)
        .arg(&plan.script)
        .args(extra_args)
        .current_dir(&plan.working_dir)
        .exec();
    Error::Io(err)
}
