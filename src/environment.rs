// src/environment.rs

//! Isolated environment lifecycle
//!
//! The environment directory holds a python venv plus verbatim copies of the
//! application files. Every install is a full rebuild: an existing directory
//! is considered stale, deleted, and recreated from scratch.
//!
//! ```text
//! Absent -> Creating -> Populated -> Active
//!   ^                                  |
//!   +---------- Stale <----------------+  (next install run)
//! ```

use crate::config::InstallationConfig;
use crate::error::{Error, Result};
use crate::privilege::PrivilegeGateway;
use crate::process::CommandLine;
use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Lifecycle state of the environment directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentState {
    Absent,
    Creating,
    Populated,
    /// Left over from an earlier (possibly interrupted) run
    Stale,
    Active,
}

/// A ready environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentHandle {
    pub root: PathBuf,
    pub python: PathBuf,
    pub state: EnvironmentState,
}

/// How a directory tree was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalMode {
    AlreadyAbsent,
    User,
    Privileged,
}

/// Installation state, inferred from the filesystem
pub fn is_installed(config: &InstallationConfig) -> bool {
    config.environment_dir.is_dir()
}

/// State an install run starts from
pub fn initial_state(config: &InstallationConfig) -> EnvironmentState {
    if fs::symlink_metadata(&config.environment_dir).is_ok() {
        EnvironmentState::Stale
    } else {
        EnvironmentState::Absent
    }
}

/// Check every configured source file exists
pub fn verify_sources(config: &InstallationConfig) -> Result<()> {
    for name in &config.source_files {
        let path = config.source_path(name);
        if !path.is_file() {
            return Err(Error::MissingSourceFile(path));
        }
    }
    Ok(())
}

/// Build (or rebuild) the environment and return a handle to it
pub fn ensure_environment(
    config: &InstallationConfig,
    gateway: &PrivilegeGateway<'_>,
) -> Result<EnvironmentHandle> {
    let root = config.environment_dir.clone();
    let mut state = initial_state(config);

    if state == EnvironmentState::Stale {
        info!("Removing stale environment at {}", root.display());
        remove_tree(&root, gateway).map_err(|e| {
            Error::EnvironmentCreateFailed(format!(
                "could not remove stale environment {}: {}",
                root.display(),
                e
            ))
        })?;
        state = transition(state, EnvironmentState::Absent);
    }

    state = transition(state, EnvironmentState::Creating);
    create_runtime(config, gateway)?;
    install_runtime_deps(config, gateway)?;
    copy_application_files(config)?;
    state = transition(state, EnvironmentState::Populated);

    state = transition(state, EnvironmentState::Active);
    Ok(EnvironmentHandle {
        python: config.environment_python(),
        root,
        state,
    })
}

fn transition(from: EnvironmentState, to: EnvironmentState) -> EnvironmentState {
    debug!("Environment state: {:?} -> {:?}", from, to);
    to
}

fn create_runtime(config: &InstallationConfig, gateway: &PrivilegeGateway<'_>) -> Result<()> {
    let root = &config.environment_dir;

    fs::create_dir_all(root).map_err(|e| {
        Error::EnvironmentCreateFailed(format!("could not create {}: {}", root.display(), e))
    })?;

    let cmd = CommandLine::new(&config.python)
        .args(["-m", "venv"])
        .arg_path(root);
    let outcome = gateway.runner().run(&cmd).map_err(|e| {
        Error::EnvironmentCreateFailed(format!("could not run '{}': {}", cmd, e))
    })?;
    if !outcome.success() {
        return Err(Error::EnvironmentCreateFailed(outcome.describe_failure(&cmd)));
    }

    info!("Created virtual environment at {}", root.display());
    Ok(())
}

/// Upgrade pip first, then install each dependency in order
fn install_runtime_deps(config: &InstallationConfig, gateway: &PrivilegeGateway<'_>) -> Result<()> {
    let python = config.environment_python();
    let pip = || CommandLine::new(python.to_string_lossy()).args(["-m", "pip", "install"]);

    let mut steps = vec![pip().args(["--upgrade", "pip"])];
    steps.extend(config.runtime_deps.iter().map(|dep| pip().arg(dep)));

    for cmd in steps {
        let outcome = gateway.runner().run(&cmd).map_err(|e| {
            Error::DependencyInstallFailed(format!("could not run '{}': {}", cmd, e))
        })?;
        if !outcome.success() {
            return Err(Error::DependencyInstallFailed(outcome.describe_failure(&cmd)));
        }
        debug!("Done: {}", cmd);
    }

    info!("Installed {} runtime dependencies", config.runtime_deps.len());
    Ok(())
}

/// Copy every source file except the main executable, byte for byte
fn copy_application_files(config: &InstallationConfig) -> Result<()> {
    for name in &config.source_files {
        if *name == config.main_executable_name {
            continue;
        }

        let source = config.source_path(name);
        if !source.is_file() {
            return Err(Error::MissingSourceFile(source));
        }

        let dest = config.environment_dir.join(name);
        fs::copy(&source, &dest).map_err(|e| {
            Error::EnvironmentCreateFailed(format!(
                "could not copy {} to {}: {}",
                source.display(),
                dest.display(),
                e
            ))
        })?;
        debug!("Copied {} -> {}", source.display(), dest.display());
    }
    Ok(())
}

/// Remove `path` recursively
///
/// Uses plain filesystem calls when the parent directory is writable by the
/// current user, and a privileged `rm -rf` otherwise.
pub fn remove_tree(path: &Path, gateway: &PrivilegeGateway<'_>) -> Result<RemovalMode> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RemovalMode::AlreadyAbsent),
        Err(e) => return Err(e.into()),
    };

    let parent = path.parent().unwrap_or(Path::new("/"));
    if is_writable(parent) {
        if metadata.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
        return Ok(RemovalMode::User);
    }

    warn!("{} is not writable, removing {} with elevated rights", parent.display(), path.display());
    let cmd = CommandLine::new("rm").arg("-rf").arg("--").arg_path(path);
    let outcome = gateway.run_privileged(cmd.clone())?;
    if !outcome.success() {
        return Err(Error::Io(io::Error::other(outcome.describe_failure(&cmd))));
    }
    Ok(RemovalMode::Privileged)
}

/// access(2) with W_OK for the real user
pub(crate) fn is_writable(path: &Path) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string that outlives the call.
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}
