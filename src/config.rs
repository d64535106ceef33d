// src/config.rs

//! Installation configuration
//!
//! One immutable [`InstallationConfig`] is built at startup (defaults,
//! optionally overlaid by a JSON file and CLI flags), validated once, and
//! passed by reference into every component.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{self, Component, Path, PathBuf};
use tracing::debug;

/// Default application name; also names the Gentoo package.use file
pub const DEFAULT_APP_NAME: &str = "japirc";

/// Default shared binary directory
pub const DEFAULT_BIN_DIR: &str = "/usr/local/bin";

/// Default portage per-package USE flag directory
pub const DEFAULT_PACKAGE_USE_DIR: &str = "/etc/portage/package.use";

/// Scripts run by each launcher mode, relative to the environment directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryPoints {
    pub tui: String,
    pub gui: String,
    pub server: String,
}

impl Default for EntryPoints {
    fn default() -> Self {
        Self {
            tui: "JAPIRC_TUI.client.py".to_string(),
            gui: "JAPIRC_GUI.client.py".to_string(),
            server: "JAPIRC_CLI.server.py".to_string(),
        }
    }
}

/// Gentoo USE flag gating the GUI toolkit bindings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GentooConfig {
    pub package_atom: String,
    pub flag_name: String,
    pub package_use_dir: PathBuf,
}

impl Default for GentooConfig {
    fn default() -> Self {
        Self {
            package_atom: "dev-lang/python".to_string(),
            flag_name: "tk".to_string(),
            package_use_dir: PathBuf::from(DEFAULT_PACKAGE_USE_DIR),
        }
    }
}

/// Process-wide installation constants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallationConfig {
    pub app_name: String,
    /// Isolated runtime directory owned by the engine
    pub environment_dir: PathBuf,
    /// Shared binary directory the main executable and aliases land in
    pub target_bin_dir: PathBuf,
    pub main_executable_name: String,
    pub alias_names: Vec<String>,
    /// Directory the application artifacts are read from
    pub source_dir: PathBuf,
    pub source_files: BTreeSet<String>,
    /// Installed in order into the environment after the toolchain upgrade
    pub runtime_deps: Vec<String>,
    /// Interpreter used to create the environment
    pub python: String,
    pub entry_points: EntryPoints,
    pub gentoo: GentooConfig,
}

impl Default for InstallationConfig {
    fn default() -> Self {
        let environment_dir = dirs::data_local_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_APP_NAME);

        let entry_points = EntryPoints::default();
        let source_files = [
            DEFAULT_APP_NAME,
            entry_points.server.as_str(),
            entry_points.tui.as_str(),
            entry_points.gui.as_str(),
            "notification.wav",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            environment_dir,
            target_bin_dir: PathBuf::from(DEFAULT_BIN_DIR),
            main_executable_name: DEFAULT_APP_NAME.to_string(),
            alias_names: vec!["japi".to_string()],
            source_dir: PathBuf::from("."),
            source_files,
            runtime_deps: vec![
                "colored".to_string(),
                "customtkinter".to_string(),
                "playsound".to_string(),
            ],
            python: "python3".to_string(),
            entry_points,
            gentoo: GentooConfig::default(),
        }
    }
}

impl InstallationConfig {
    /// Load the configuration: defaults, overlaid by `path` when given
    ///
    /// Fields missing from the file keep their default values. The result is
    /// not validated here; callers apply CLI overrides first and then call
    /// [`InstallationConfig::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                let file = File::open(path)?;
                Ok(serde_json::from_reader(BufReader::new(file))?)
            }
            None => Ok(Self::default()),
        }
    }

    /// Make every configured directory absolute and lexically normal
    ///
    /// Relative paths resolve against the current working directory.
    pub fn resolve_paths(&mut self) -> Result<()> {
        for dir in [
            &mut self.environment_dir,
            &mut self.target_bin_dir,
            &mut self.source_dir,
            &mut self.gentoo.package_use_dir,
        ] {
            *dir = normalize(&path::absolute(&*dir)?);
        }
        Ok(())
    }

    /// Check the structural invariants
    ///
    /// Directories must already be absolute; see
    /// [`InstallationConfig::resolve_paths`].
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("app_name", &self.app_name),
            ("main_executable_name", &self.main_executable_name),
        ] {
            check_plain_name(field, value)?;
        }
        for alias in &self.alias_names {
            check_plain_name("alias_names", alias)?;
        }

        if self.alias_names.contains(&self.main_executable_name) {
            return Err(Error::ConfigInvalid(format!(
                "alias '{}' collides with the main executable name",
                self.main_executable_name
            )));
        }

        let mut seen = BTreeSet::new();
        for alias in &self.alias_names {
            if !seen.insert(alias) {
                return Err(Error::ConfigInvalid(format!("duplicate alias '{}'", alias)));
            }
        }

        if !self.source_files.contains(&self.main_executable_name) {
            return Err(Error::ConfigInvalid(format!(
                "source_files must include the main executable '{}'",
                self.main_executable_name
            )));
        }

        for file in &self.source_files {
            check_plain_name("source_files", file)?;
        }

        for script in [
            &self.entry_points.tui,
            &self.entry_points.gui,
            &self.entry_points.server,
        ] {
            if !self.source_files.contains(script) {
                return Err(Error::ConfigInvalid(format!(
                    "entry point '{}' is not listed in source_files",
                    script
                )));
            }
        }

        for (field, dir) in [
            ("environment_dir", &self.environment_dir),
            ("target_bin_dir", &self.target_bin_dir),
            ("source_dir", &self.source_dir),
            ("gentoo.package_use_dir", &self.gentoo.package_use_dir),
        ] {
            if !dir.is_absolute() {
                return Err(Error::ConfigInvalid(format!(
                    "{} '{}' must be an absolute path",
                    field,
                    dir.display()
                )));
            }
        }

        let env_dir = normalize(&self.environment_dir);
        if env_dir == Path::new("/") {
            return Err(Error::ConfigInvalid(format!(
                "refusing to manage environment_dir '{}'",
                self.environment_dir.display()
            )));
        }

        // The environment is deleted on every install
        for (field, dir) in [
            ("source_dir", &self.source_dir),
            ("target_bin_dir", &self.target_bin_dir),
        ] {
            if normalize(dir).starts_with(&env_dir) {
                return Err(Error::ConfigInvalid(format!(
                    "environment_dir '{}' must not contain {} '{}'",
                    self.environment_dir.display(),
                    field,
                    dir.display()
                )));
            }
        }

        if self.gentoo.package_atom.split_whitespace().count() != 1
            || self.gentoo.flag_name.split_whitespace().count() != 1
        {
            return Err(Error::ConfigInvalid(
                "gentoo package_atom and flag_name must be single tokens".to_string(),
            ));
        }

        Ok(())
    }

    /// Location of a named artifact in the source directory
    pub fn source_path(&self, name: &str) -> PathBuf {
        self.source_dir.join(name)
    }

    /// Installed path of the main executable
    pub fn main_target(&self) -> PathBuf {
        self.target_bin_dir.join(&self.main_executable_name)
    }

    /// Installed paths of the aliases, in configuration order
    pub fn alias_targets(&self) -> Vec<PathBuf> {
        self.alias_names
            .iter()
            .map(|alias| self.target_bin_dir.join(alias))
            .collect()
    }

    /// The installer-owned file under package.use
    pub fn use_file_path(&self) -> PathBuf {
        self.gentoo.package_use_dir.join(&self.app_name)
    }

    /// Interpreter inside the isolated environment
    pub fn environment_python(&self) -> PathBuf {
        self.environment_dir.join("bin").join("python")
    }
}

/// Fold `.` and `..` components without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut normal = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normal.pop();
            }
            other => normal.push(other),
        }
    }
    normal
}

fn check_plain_name(field: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains('/') || value == "." || value == ".." {
        return Err(Error::ConfigInvalid(format!(
            "{} entry '{}' must be a plain file name",
            field, value
        )));
    }
    Ok(())
}
