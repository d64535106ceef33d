// src/uninstall.rs

//! Uninstallation
//!
//! Removes only what the installer provably created, in order: the main
//! executable, alias symlinks, the environment directory, and the installer's
//! own package.use line. Each step is attempted regardless of earlier
//! failures; the outcome of every artifact is collected in a
//! [`TeardownReport`].

use crate::config::InstallationConfig;
use crate::deps::gentoo::{self, UseFlagRecord, UseLineRemoval};
use crate::environment::{self, RemovalMode};
use crate::error::{Error, Result};
use crate::privilege::PrivilegeGateway;
use crate::process::CommandLine;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Kind of artifact a teardown step handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    MainExecutable,
    Alias,
    Environment,
    UseFlagFile,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArtifactKind::MainExecutable => "executable",
            ArtifactKind::Alias => "alias",
            ArtifactKind::Environment => "environment",
            ArtifactKind::UseFlagFile => "package.use",
        };
        f.write_str(label)
    }
}

/// What happened to one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Removed,
    Absent,
    /// Left alone on purpose
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactOutcome {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub outcome: Outcome,
}

impl fmt::Display for ArtifactOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path.display();
        match &self.outcome {
            Outcome::Removed => write!(f, "removed  {} {}", self.kind, path),
            Outcome::Absent => write!(f, "absent   {} {}", self.kind, path),
            Outcome::Skipped(reason) => write!(f, "skipped  {} {} ({})", self.kind, path, reason),
            Outcome::Failed(reason) => write!(f, "failed   {} {} ({})", self.kind, path, reason),
        }
    }
}

/// One outcome per artifact, in teardown order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub outcomes: Vec<ArtifactOutcome>,
}

impl TeardownReport {
    fn record(&mut self, kind: ArtifactKind, path: &Path, outcome: Outcome) {
        let entry = ArtifactOutcome {
            kind,
            path: path.to_path_buf(),
            outcome,
        };
        match &entry.outcome {
            Outcome::Failed(_) | Outcome::Skipped(_) => warn!("{}", entry),
            Outcome::Removed => info!("{}", entry),
            Outcome::Absent => {}
        }
        self.outcomes.push(entry);
    }

    pub fn failures(&self) -> impl Iterator<Item = &ArtifactOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Failed(_)))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ArtifactOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Skipped(_)))
    }

    pub fn outcome_for(&self, path: &Path) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.path == path)
            .map(|o| &o.outcome)
    }

    /// `TeardownPartialFailure` if any step failed
    pub fn partial_failure(&self) -> Option<Error> {
        let failed = self.failures().count();
        (failed > 0).then_some(Error::TeardownPartialFailure { failed })
    }
}

/// Tear the installation down, best effort
pub fn uninstall(config: &InstallationConfig, gateway: &PrivilegeGateway<'_>) -> TeardownReport {
    let mut report = TeardownReport::default();

    let main = config.main_target();
    let outcome = remove_main(&main, gateway);
    report.record(ArtifactKind::MainExecutable, &main, outcome);

    for alias in config.alias_targets() {
        let outcome = remove_alias(&alias, gateway);
        report.record(ArtifactKind::Alias, &alias, outcome);
    }

    let env_dir = &config.environment_dir;
    let outcome = match environment::remove_tree(env_dir, gateway) {
        Ok(RemovalMode::AlreadyAbsent) => Outcome::Absent,
        Ok(_) => Outcome::Removed,
        Err(e) => Outcome::Failed(e.to_string()),
    };
    report.record(ArtifactKind::Environment, env_dir, outcome);

    let record = UseFlagRecord::from_config(config);
    let outcome = match gentoo::remove_use_line(&record, gateway) {
        Ok(UseLineRemoval::FileAbsent) => Outcome::Absent,
        Ok(UseLineRemoval::LineAbsent) => {
            Outcome::Skipped(format!("does not contain '{}'", record.canonical_line()))
        }
        Ok(UseLineRemoval::Rewritten) | Ok(UseLineRemoval::Deleted) => Outcome::Removed,
        Err(e) => Outcome::Failed(e.to_string()),
    };
    report.record(ArtifactKind::UseFlagFile, &record.config_file_path, outcome);

    report
}

fn remove_main(path: &Path, gateway: &PrivilegeGateway<'_>) -> Outcome {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_file() || meta.file_type().is_symlink() => remove_file(path, gateway),
        Ok(_) => Outcome::Skipped("not a regular file or link".to_string()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Outcome::Absent,
        Err(e) => Outcome::Failed(e.to_string()),
    }
}

/// Aliases are only removed when they are symlinks
fn remove_alias(path: &Path, gateway: &PrivilegeGateway<'_>) -> Outcome {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => remove_file(path, gateway),
        Ok(_) => Outcome::Skipped("not a symbolic link, left untouched".to_string()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Outcome::Absent,
        Err(e) => Outcome::Failed(e.to_string()),
    }
}

fn remove_file(path: &Path, gateway: &PrivilegeGateway<'_>) -> Outcome {
    let cmd = CommandLine::new("rm").arg("-f").arg("--").arg_path(path);
    let result: Result<_> = gateway.run_privileged(cmd.clone());
    match result {
        Ok(outcome) if outcome.success() => Outcome::Removed,
        Ok(outcome) => Outcome::Failed(outcome.describe_failure(&cmd)),
        Err(e) => Outcome::Failed(e.to_string()),
    }
}
