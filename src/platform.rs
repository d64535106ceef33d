// src/platform.rs

//! Package manager detection
//!
//! Probes PATH for the native package managers in a fixed priority order
//! (apt, dnf, pacman, emerge) and returns the profile of the first one found.
//! A host with leftovers of several managers therefore always resolves the
//! same way.

use crate::error::{Error, Result};
use crate::process::CommandLine;
use std::env;
use std::ffi::OsStr;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Supported native package managers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManagerId {
    Apt,
    Dnf,
    Pacman,
    Emerge,
    /// Nothing supported was found
    None,
}

impl PackageManagerId {
    /// Probe order; the first manager present wins
    pub const PRIORITY: [PackageManagerId; 4] = [
        PackageManagerId::Apt,
        PackageManagerId::Dnf,
        PackageManagerId::Pacman,
        PackageManagerId::Emerge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManagerId::Apt => "apt",
            PackageManagerId::Dnf => "dnf",
            PackageManagerId::Pacman => "pacman",
            PackageManagerId::Emerge => "emerge",
            PackageManagerId::None => "none",
        }
    }

    /// Capability descriptor, `None` for the terminal variant
    pub fn profile(self) -> Option<PackageManagerProfile> {
        let profile = match self {
            PackageManagerId::Apt => PackageManagerProfile {
                id: self,
                command: "apt-get",
                refresh_invocation: Some(&["apt-get", "update"]),
                install_invocation: &["apt-get", "install", "-y"],
                runtime_packages: &["python3", "python3-venv", "python3-pip"],
                gui_toolkit_package_name: Some("python3-tk"),
            },
            PackageManagerId::Dnf => PackageManagerProfile {
                id: self,
                command: "dnf",
                refresh_invocation: None,
                install_invocation: &["dnf", "install", "-y"],
                runtime_packages: &["python3", "python3-pip"],
                gui_toolkit_package_name: Some("python3-tkinter"),
            },
            PackageManagerId::Pacman => PackageManagerProfile {
                id: self,
                command: "pacman",
                refresh_invocation: None,
                install_invocation: &["pacman", "-S", "--needed", "--noconfirm"],
                runtime_packages: &["python", "python-pip"],
                gui_toolkit_package_name: Some("tk"),
            },
            // Tk bindings come from the tk USE flag on dev-lang/python
            PackageManagerId::Emerge => PackageManagerProfile {
                id: self,
                command: "emerge",
                refresh_invocation: None,
                install_invocation: &["emerge", "--noreplace"],
                runtime_packages: &["dev-lang/python", "dev-python/pip"],
                gui_toolkit_package_name: None,
            },
            PackageManagerId::None => return None,
        };
        Some(profile)
    }
}

impl fmt::Display for PackageManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invocation conventions of one native package manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManagerProfile {
    pub id: PackageManagerId,
    /// Executable whose presence on PATH selects this profile
    pub command: &'static str,
    /// Index refresh run before installing, if the manager needs one
    pub refresh_invocation: Option<&'static [&'static str]>,
    /// Program and leading arguments; package names are appended
    pub install_invocation: &'static [&'static str],
    /// Language runtime, its venv capability, and pip
    pub runtime_packages: &'static [&'static str],
    /// Separate package providing Tk bindings, if the manager has one
    pub gui_toolkit_package_name: Option<&'static str>,
}

impl PackageManagerProfile {
    /// Build the install command for `packages`
    pub fn install_command<S: AsRef<str>>(&self, packages: &[S]) -> CommandLine {
        let (program, leading) = split_invocation(self.install_invocation);
        CommandLine::new(program).args(leading).args(packages)
    }

    pub fn refresh_command(&self) -> Option<CommandLine> {
        self.refresh_invocation.map(|invocation| {
            let (program, args) = split_invocation(invocation);
            CommandLine::new(program).args(args)
        })
    }

    /// Every OS package this profile installs in one invocation
    pub fn system_packages(&self) -> Vec<&'static str> {
        let mut packages = self.runtime_packages.to_vec();
        packages.extend(self.gui_toolkit_package_name);
        packages
    }
}

fn split_invocation(
    invocation: &'static [&'static str],
) -> (&'static str, &'static [&'static str]) {
    match invocation.split_first() {
        Some((program, args)) => (*program, args),
        None => ("", &[]),
    }
}

/// Pick the first manager for which `probe(command)` is true
pub fn detect_with(probe: impl Fn(&str) -> bool) -> PackageManagerId {
    for id in PackageManagerId::PRIORITY {
        if let Some(profile) = id.profile() {
            let found = probe(profile.command);
            debug!("Probe {} ({}): {}", id, profile.command, found);
            if found {
                return id;
            }
        }
    }
    PackageManagerId::None
}

/// Turn a detection result into the active profile
pub fn select(id: PackageManagerId) -> Result<PackageManagerProfile> {
    match id.profile() {
        Some(profile) => {
            info!("Detected package manager: {}", id);
            Ok(profile)
        }
        None => Err(Error::UnsupportedPlatform {
            probed: PackageManagerId::PRIORITY
                .iter()
                .filter_map(|id| id.profile())
                .map(|profile| profile.command)
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Resolve the active profile from the process PATH
pub fn resolve() -> Result<PackageManagerProfile> {
    let search_path = env::var_os("PATH").unwrap_or_default();
    let cwd = env::current_dir()?;
    resolve_in(search_path, &cwd)
}

/// Resolve the active profile from an explicit search path
pub fn resolve_in(search_path: impl AsRef<OsStr>, cwd: &Path) -> Result<PackageManagerProfile> {
    let search_path = search_path.as_ref();
    select(detect_with(|command| {
        which::which_in(command, Some(search_path), cwd).is_ok()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn fake_executable(dir: &Path, name: &str) {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_priority_order_is_apt_dnf_pacman_emerge() {
        let names: Vec<_> = PackageManagerId::PRIORITY.iter().map(|id| id.as_str()).collect();
        assert_eq!(names, vec!["apt", "dnf", "pacman", "emerge"]);
    }

    #[test]
    fn test_first_match_wins_with_multiple_managers() {
        let id = detect_with(|command| command == "pacman" || command == "dnf");
        assert_eq!(id, PackageManagerId::Dnf);
    }

    #[test]
    fn test_no_match_is_unsupported() {
        let id = detect_with(|_| false);
        assert_eq!(id, PackageManagerId::None);
        let err = select(id).unwrap_err();
        assert!(matches!(err, Error::UnsupportedPlatform { .. }));
        assert!(err.to_string().contains("apt-get, dnf, pacman, emerge"));
    }

    #[test]
    fn test_resolve_in_search_path() {
        let dir = tempfile::tempdir().unwrap();
        fake_executable(dir.path(), "emerge");
        fake_executable(dir.path(), "pacman");

        let profile = resolve_in(dir.path(), dir.path()).unwrap();
        assert_eq!(profile.id, PackageManagerId::Pacman);
    }

    #[test]
    fn test_resolve_in_empty_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_in(dir.path(), dir.path()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedPlatform { .. }));
    }

    #[test]
    fn test_apt_install_command() {
        let profile = PackageManagerId::Apt.profile().unwrap();
        let cmd = profile.install_command(&profile.system_packages());
        assert_eq!(
            cmd.to_string(),
            "apt-get install -y python3 python3-venv python3-pip python3-tk"
        );
        assert_eq!(profile.refresh_command().unwrap().to_string(), "apt-get update");
    }

    #[test]
    fn test_pacman_install_is_idempotent_flagged() {
        let profile = PackageManagerId::Pacman.profile().unwrap();
        let cmd = profile.install_command(&["tk"]);
        assert!(cmd.args.contains(&"--needed".to_string()));
        assert!(profile.refresh_command().is_none());
    }

    #[test]
    fn test_emerge_has_no_toolkit_package() {
        let profile = PackageManagerId::Emerge.profile().unwrap();
        assert!(profile.gui_toolkit_package_name.is_none());
        assert_eq!(
            profile.system_packages(),
            vec!["dev-lang/python", "dev-python/pip"]
        );
    }

    #[test]
    fn test_none_has_no_profile() {
        assert!(PackageManagerId::None.profile().is_none());
    }
}
