// src/publish.rs

//! Publication of the main executable and its aliases
//!
//! The main executable is copied into the shared binary directory; every
//! alias becomes a symlink to it. Both steps go through the privilege
//! gateway and are safe to repeat.

use crate::config::InstallationConfig;
use crate::error::{Error, Result};
use crate::privilege::PrivilegeGateway;
use crate::process::CommandLine;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Whether the published main executable is reachable by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathVisibility {
    OnPath,
    /// Lookup finds a different file first
    Shadowed(PathBuf),
    /// Installed and executable, but lookup does not find it yet
    NotYetVisible,
}

/// What publication left in the binary directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedLinks {
    pub main: PathBuf,
    pub aliases: Vec<PathBuf>,
    pub visibility: PathVisibility,
}

/// Install the main executable and point every alias at it
pub fn publish(
    config: &InstallationConfig,
    gateway: &PrivilegeGateway<'_>,
) -> Result<PublishedLinks> {
    let source = config.source_path(&config.main_executable_name);
    if !source.is_file() {
        return Err(Error::MissingSourceFile(source));
    }

    // ln cannot replace a directory; refuse before anything is installed
    for alias in config.alias_targets() {
        if fs::symlink_metadata(&alias).is_ok_and(|meta| meta.is_dir()) {
            return Err(Error::PublicationFailed(format!(
                "{} is a directory; remove it to publish the alias",
                alias.display()
            )));
        }
    }

    let main = config.main_target();
    let install = CommandLine::new("install")
        .args(["-D", "-m", "0755"])
        .arg_path(&source)
        .arg_path(&main);
    run_publication_step(gateway, install)?;
    info!("Installed {}", main.display());

    let mut aliases = Vec::with_capacity(config.alias_names.len());
    for alias in config.alias_targets() {
        // -f replaces whatever occupies the name, -T refuses to descend into a directory
        let link = CommandLine::new("ln")
            .arg("-sfT")
            .arg_path(&main)
            .arg_path(&alias);
        run_publication_step(gateway, link)?;
        info!("Linked {} -> {}", alias.display(), main.display());
        aliases.push(alias);
    }

    let visibility = check_visibility(config)?;
    Ok(PublishedLinks {
        main,
        aliases,
        visibility,
    })
}

fn run_publication_step(gateway: &PrivilegeGateway<'_>, cmd: CommandLine) -> Result<()> {
    let outcome = gateway.run_privileged(cmd.clone())?;
    if !outcome.success() {
        return Err(Error::PublicationFailed(outcome.describe_failure(&cmd)));
    }
    Ok(())
}

/// Look the main executable up on the process PATH
pub fn check_visibility(config: &InstallationConfig) -> Result<PathVisibility> {
    visibility_with(config, |name| which::which(name).ok())
}

/// Advisory lookup check; only a missing or non-executable file is an error
pub fn visibility_with(
    config: &InstallationConfig,
    lookup: impl Fn(&str) -> Option<PathBuf>,
) -> Result<PathVisibility> {
    let main = config.main_target();

    match lookup(&config.main_executable_name) {
        Some(found) if same_file(&found, &main) => Ok(PathVisibility::OnPath),
        Some(found) => {
            warn!(
                "'{}' resolves to {} instead of {}; check the order of your PATH",
                config.main_executable_name,
                found.display(),
                main.display()
            );
            Ok(PathVisibility::Shadowed(found))
        }
        None if is_executable(&main) => {
            warn!(
                "{} is installed but '{}' is not found on PATH yet; \
                 open a new shell or add {} to PATH",
                main.display(),
                config.main_executable_name,
                config.target_bin_dir.display()
            );
            Ok(PathVisibility::NotYetVisible)
        }
        None => Err(Error::PublicationFailed(format!(
            "{} is missing or not executable after installation",
            main.display()
        ))),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Current state of one published name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// Executable regular file
    Installed,
    /// Symlink to the main executable
    Linked,
    /// Something the installer did not create
    Foreign(String),
    Missing,
}

/// Inspect the main executable and every alias without changing anything
pub fn inspect(config: &InstallationConfig) -> Vec<(PathBuf, LinkStatus)> {
    let main = config.main_target();
    let mut statuses = vec![(main.clone(), main_status(&main))];

    for alias in config.alias_targets() {
        let status = match fs::symlink_metadata(&alias) {
            Err(_) => LinkStatus::Missing,
            Ok(meta) if meta.file_type().is_symlink() => match fs::read_link(&alias) {
                Ok(target) if target == main => LinkStatus::Linked,
                Ok(target) => LinkStatus::Foreign(format!("symlink to {}", target.display())),
                Err(e) => LinkStatus::Foreign(e.to_string()),
            },
            Ok(_) => LinkStatus::Foreign("not a symbolic link".to_string()),
        };
        statuses.push((alias, status));
    }
    statuses
}

fn main_status(main: &Path) -> LinkStatus {
    match fs::symlink_metadata(main) {
        Err(_) => LinkStatus::Missing,
        Ok(_) if is_executable(main) => LinkStatus::Installed,
        Ok(_) => LinkStatus::Foreign("not an executable file".to_string()),
    }
}

pub(crate) fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
