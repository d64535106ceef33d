// src/deps/gentoo.rs

//! Gentoo USE flag reconciliation
//!
//! On Gentoo the Tk bindings are not a package but the `tk` USE flag on
//! `dev-lang/python`. Reconciling means: query the flag, record
//! `dev-lang/python tk` in an installer-owned file under
//! `/etc/portage/package.use` when it is not already set anywhere, and
//! rebuild python with `emerge --ask` so the user confirms the rebuild.

use crate::config::InstallationConfig;
use crate::error::{Error, Result};
use crate::privilege::PrivilegeGateway;
use crate::process::{CommandLine, CommandRunner};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Observed state of the flag on the installed runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagState {
    Enabled,
    Disabled,
    /// The query output could not be interpreted
    Indeterminate,
}

impl FlagState {
    pub fn needs_remediation(self) -> bool {
        !matches!(self, FlagState::Enabled)
    }
}

impl FromStr for FlagState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enabled" | "on" => Ok(FlagState::Enabled),
            "disabled" | "off" => Ok(FlagState::Disabled),
            _ => Err(format!("Invalid flag state: {} (expected enabled or disabled)", s)),
        }
    }
}

/// The one package.use entry this installer owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseFlagRecord {
    pub package_atom: String,
    pub flag_name: String,
    /// Installer-owned file, named after the application
    pub config_file_path: PathBuf,
}

impl UseFlagRecord {
    pub fn from_config(config: &InstallationConfig) -> Self {
        Self {
            package_atom: config.gentoo.package_atom.clone(),
            flag_name: config.gentoo.flag_name.clone(),
            config_file_path: config.use_file_path(),
        }
    }

    /// `<atom> <flag>`, matched exactly against whole lines
    pub fn canonical_line(&self) -> String {
        format!("{} {}", self.package_atom, self.flag_name)
    }

    pub fn config_dir(&self) -> &Path {
        self.config_file_path.parent().unwrap_or(Path::new("/"))
    }
}

/// What reconciliation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    AlreadyEnabled,
    /// The runtime was rebuilt; `appended` tells whether our line was new
    Rebuilt { appended: bool },
}

/// Result of removing our line at uninstall time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseLineRemoval {
    /// The installer-owned file does not exist
    FileAbsent,
    /// The file exists but does not contain our line
    LineAbsent,
    /// Our line was removed, other lines remain
    Rewritten,
    /// Our line was the only content, the file was deleted
    Deleted,
}

/// Interpret `emerge --pretend --verbose` output for `flag`
///
/// Looks at every `USE="..."` group. `flag` (optionally suffixed with the
/// `*`/`%` change markers) is enabled, `-flag` or `(-flag)` is disabled.
/// Anything else is indeterminate.
pub fn parse_flag_state(output: &str, flag: &str) -> FlagState {
    let disabled = format!("-{}", flag);

    for group in use_groups(output) {
        for token in group.split_whitespace() {
            let token = token
                .trim_start_matches('(')
                .trim_end_matches(')')
                .trim_end_matches(['*', '%']);
            if token == flag {
                return FlagState::Enabled;
            }
            if token == disabled {
                return FlagState::Disabled;
            }
        }
    }

    FlagState::Indeterminate
}

fn use_groups(output: &str) -> impl Iterator<Item = &str> {
    output.split("USE=\"").skip(1).map(|rest| match rest.find('"') {
        Some(end) => &rest[..end],
        None => rest,
    })
}

/// Ask portage how the flag is set on the runtime package
pub fn query_flag_state(record: &UseFlagRecord, runner: &dyn CommandRunner) -> Result<FlagState> {
    let cmd = CommandLine::new("emerge")
        .args(["--pretend", "--verbose", "--nodeps"])
        .arg(&record.package_atom);

    let outcome = runner.run(&cmd).map_err(|e| {
        Error::FlagReconciliationFailed(format!("failed to run '{}': {}", cmd, e))
    })?;

    if !outcome.success() {
        return Err(Error::FlagReconciliationFailed(outcome.describe_failure(&cmd)));
    }

    debug!("Raw flag query output:\n{}", outcome.stdout);

    let state = parse_flag_state(&outcome.stdout, &record.flag_name);
    if state == FlagState::Indeterminate {
        warn!(
            "Could not determine whether USE flag '{}' is set on {}; assuming disabled. \
             Pass --use-flag-state enabled to skip the rebuild. Query output:\n{}",
            record.flag_name,
            record.package_atom,
            outcome.stdout.trim()
        );
    }
    Ok(state)
}

/// True if any regular file under `dir` contains `line` as a whole line
pub fn line_present(dir: &Path, line: &str) -> Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| {
            Error::FlagReconciliationFailed(format!("failed to scan {}: {}", dir.display(), e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let contents = fs::read_to_string(entry.path()).map_err(|e| {
            Error::FlagReconciliationFailed(format!(
                "failed to read {}: {}",
                entry.path().display(),
                e
            ))
        })?;
        if contents.lines().any(|candidate| candidate == line) {
            debug!("Found '{}' in {}", line, entry.path().display());
            return Ok(true);
        }
    }

    Ok(false)
}

/// Make sure our canonical line is configured; returns true if it was appended
pub fn ensure_use_line(record: &UseFlagRecord, gateway: &PrivilegeGateway<'_>) -> Result<bool> {
    let dir = record.config_dir();
    let line = record.canonical_line();

    if dir.exists() && !dir.is_dir() {
        return Err(Error::FlagReconciliationFailed(format!(
            "{} is a file; convert it to a directory or add '{}' to it manually",
            dir.display(),
            line
        )));
    }

    if !dir.exists() {
        let cmd = CommandLine::new("mkdir").arg("-p").arg_path(dir);
        let outcome = gateway
            .run_privileged(cmd.clone())
            .map_err(reconciliation_step(dir.display()))?;
        if !outcome.success() {
            return Err(Error::FlagReconciliationFailed(outcome.describe_failure(&cmd)));
        }
    }

    if line_present(dir, &line)? {
        info!("USE flag line '{}' already configured", line);
        return Ok(false);
    }

    let mut contents = read_optional(&record.config_file_path)?.unwrap_or_default();
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(&line);
    contents.push('\n');

    let outcome = gateway
        .write_file(&record.config_file_path, &contents, "0644")
        .map_err(reconciliation_step(record.config_file_path.display()))?;
    if !outcome.success() {
        return Err(Error::FlagReconciliationFailed(format!(
            "failed to write {}: exit code {}: {}",
            record.config_file_path.display(),
            outcome.code(),
            outcome.stderr_trimmed()
        )));
    }

    info!("Added '{}' to {}", line, record.config_file_path.display());
    Ok(true)
}

/// Rebuild the runtime with the new flag; the user confirms via `--ask`
pub fn rebuild_runtime(record: &UseFlagRecord, gateway: &PrivilegeGateway<'_>) -> Result<()> {
    let cmd = CommandLine::new("emerge")
        .args(["--ask", "--oneshot", "--newuse"])
        .arg(&record.package_atom)
        .interactive();

    info!("Rebuilding {} with USE flag '{}'", record.package_atom, record.flag_name);
    let outcome = gateway
        .run_privileged(cmd.clone())
        .map_err(reconciliation_step(&record.package_atom))?;
    if !outcome.success() {
        return Err(Error::FlagReconciliationFailed(format!(
            "rebuild declined or failed: {}",
            outcome.describe_failure(&cmd)
        )));
    }
    Ok(())
}

/// Full three-step protocol: query, record, rebuild
///
/// `assumed` replaces the query when the operator knows better than the
/// output heuristic.
pub fn reconcile(
    record: &UseFlagRecord,
    gateway: &PrivilegeGateway<'_>,
    assumed: Option<FlagState>,
) -> Result<Reconciliation> {
    let state = match assumed {
        Some(state) => {
            info!("Using operator-supplied USE flag state: {:?}", state);
            state
        }
        None => query_flag_state(record, gateway.runner())?,
    };

    if !state.needs_remediation() {
        info!("USE flag '{}' already enabled on {}", record.flag_name, record.package_atom);
        return Ok(Reconciliation::AlreadyEnabled);
    }

    let appended = ensure_use_line(record, gateway)?;
    rebuild_runtime(record, gateway)?;
    Ok(Reconciliation::Rebuilt { appended })
}

/// Remove exactly our canonical line; delete the file if nothing else remains
pub fn remove_use_line(
    record: &UseFlagRecord,
    gateway: &PrivilegeGateway<'_>,
) -> Result<UseLineRemoval> {
    let Some(contents) = read_optional(&record.config_file_path)? else {
        return Ok(UseLineRemoval::FileAbsent);
    };

    let line = record.canonical_line();
    let remaining: Vec<&str> = contents.lines().filter(|l| *l != line).collect();

    if remaining.len() == contents.lines().count() {
        return Ok(UseLineRemoval::LineAbsent);
    }

    if remaining.iter().all(|l| l.trim().is_empty()) {
        let cmd = CommandLine::new("rm").arg("-f").arg_path(&record.config_file_path);
        let outcome = gateway
            .run_privileged(cmd.clone())
            .map_err(reconciliation_step(record.config_file_path.display()))?;
        if !outcome.success() {
            return Err(Error::FlagReconciliationFailed(outcome.describe_failure(&cmd)));
        }
        return Ok(UseLineRemoval::Deleted);
    }

    let mut rewritten = remaining.join("\n");
    rewritten.push('\n');
    let outcome = gateway
        .write_file(&record.config_file_path, &rewritten, "0644")
        .map_err(reconciliation_step(record.config_file_path.display()))?;
    if !outcome.success() {
        return Err(Error::FlagReconciliationFailed(format!(
            "failed to rewrite {}: {}",
            record.config_file_path.display(),
            outcome.stderr_trimmed()
        )));
    }
    Ok(UseLineRemoval::Rewritten)
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::FlagReconciliationFailed(format!(
            "failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

/// I/O failures during a reconciliation step fail the reconciliation
fn reconciliation_step(context: impl fmt::Display) -> impl FnOnce(Error) -> Error {
    move |err| match err {
        Error::Io(e) => Error::FlagReconciliationFailed(format!("{}: {}", context, e)),
        other => other,
    }
}
