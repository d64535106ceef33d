// src/deps/mod.rs

//! System dependency installation
//!
//! Installs the language runtime, its venv capability, pip and the Tk
//! bindings through the native package manager. apt, dnf and pacman take a
//! single install-if-missing invocation; emerge additionally runs the USE
//! flag reconciliation in [`gentoo`].

pub mod gentoo;

use crate::config::InstallationConfig;
use crate::error::{Error, Result};
use crate::platform::{PackageManagerId, PackageManagerProfile};
use crate::privilege::PrivilegeGateway;
use crate::process::CommandLine;
use gentoo::{FlagState, Reconciliation, UseFlagRecord};
use tracing::{info, warn};

/// Caller choices for the dependency step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Continue without the GUI toolkit if it cannot be provided
    pub core_only: bool,
    /// Operator override for the Gentoo flag query
    pub use_flag_state: Option<FlagState>,
}

/// Whether the GUI client will have its toolkit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolkitStatus {
    Available,
    /// Only possible in core-only mode
    Degraded(String),
}

/// Install OS-level prerequisites for `profile`
pub fn install_system_dependencies(
    profile: &PackageManagerProfile,
    config: &InstallationConfig,
    gateway: &PrivilegeGateway<'_>,
    options: InstallOptions,
) -> Result<ToolkitStatus> {
    gateway.require()?;

    if let Some(refresh) = profile.refresh_command() {
        run_install_step(gateway, refresh)?;
    }

    let packages = profile.system_packages();
    info!("Installing system packages via {}: {}", profile.id, packages.join(" "));
    run_install_step(gateway, profile.install_command(&packages))?;

    match profile.id {
        PackageManagerId::Emerge => reconcile_toolkit(config, gateway, options),
        _ => Ok(ToolkitStatus::Available),
    }
}

fn run_install_step(gateway: &PrivilegeGateway<'_>, cmd: CommandLine) -> Result<()> {
    let outcome = gateway.run_privileged(cmd.clone())?;
    if !outcome.success() {
        return Err(Error::DependencyInstallFailed(outcome.describe_failure(&cmd)));
    }
    Ok(())
}

fn reconcile_toolkit(
    config: &InstallationConfig,
    gateway: &PrivilegeGateway<'_>,
    options: InstallOptions,
) -> Result<ToolkitStatus> {
    let record = UseFlagRecord::from_config(config);

    match gentoo::reconcile(&record, gateway, options.use_flag_state) {
        Ok(Reconciliation::AlreadyEnabled) => Ok(ToolkitStatus::Available),
        Ok(Reconciliation::Rebuilt { appended }) => {
            info!(
                "{} rebuilt with '{}' (package.use {})",
                record.package_atom,
                record.flag_name,
                if appended { "updated" } else { "unchanged" }
            );
            Ok(ToolkitStatus::Available)
        }
        Err(err @ Error::FlagReconciliationFailed(_)) if options.core_only => {
            warn!("{}; continuing in core-only mode, the GUI client will not work", err);
            Ok(ToolkitStatus::Degraded(err.to_string()))
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::Elevation;
    use crate::process::fake::{FakeRunner, fail, ok};
    use std::fs;

    #[test]
    fn test_apt_refreshes_then_installs_once() {
        let runner = FakeRunner::new();
        let gateway = PrivilegeGateway::new(&runner, Elevation::Helper("sudo".to_string()));
        let profile = PackageManagerId::Apt.profile().unwrap();

        let status = install_system_dependencies(
            &profile,
            &InstallationConfig::default(),
            &gateway,
            InstallOptions::default(),
        )
        .unwrap();

        assert_eq!(status, ToolkitStatus::Available);
        assert_eq!(
            runner.lines(),
            vec![
                "sudo apt-get update",
                "sudo apt-get install -y python3 python3-venv python3-pip python3-tk",
            ]
        );
    }

    #[test]
    fn test_dnf_failure_is_dependency_error() {
        let runner =
            FakeRunner::with_handler(|_| fail(1, "No match for argument: python3-tkinter"));
        let gateway = PrivilegeGateway::new(&runner, Elevation::Direct);
        let profile = PackageManagerId::Dnf.profile().unwrap();

        let err = install_system_dependencies(
            &profile,
            &InstallationConfig::default(),
            &gateway,
            InstallOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DependencyInstallFailed(_)));
    }

    #[test]
    fn test_no_privilege_runs_nothing() {
        let runner = FakeRunner::new();
        let gateway = PrivilegeGateway::new(&runner, Elevation::Unavailable);
        let profile = PackageManagerId::Pacman.profile().unwrap();

        let err = install_system_dependencies(
            &profile,
            &InstallationConfig::default(),
            &gateway,
            InstallOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::PrivilegeUnavailable(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_emerge_with_flag_enabled() {
        let runner = FakeRunner::with_handler(|cmd| {
            if cmd.args.iter().any(|a| a == "--pretend") {
                ok("[ebuild   R    ] dev-lang/python-3.12.3 USE=\"ssl tk\"")
            } else {
                ok("")
            }
        });
        let gateway = PrivilegeGateway::new(&runner, Elevation::Direct);
        let profile = PackageManagerId::Emerge.profile().unwrap();

        let status = install_system_dependencies(
            &profile,
            &InstallationConfig::default(),
            &gateway,
            InstallOptions::default(),
        )
        .unwrap();

        assert_eq!(status, ToolkitStatus::Available);
        assert_eq!(
            runner.lines(),
            vec![
                "emerge --noreplace dev-lang/python dev-python/pip",
                "emerge --pretend --verbose --nodeps dev-lang/python",
            ]
        );
    }

    #[test]
    fn test_emerge_flag_failure_is_fatal_by_default() {
        let runner = FakeRunner::with_handler(|cmd| {
            if cmd.args.iter().any(|a| a == "--pretend") {
                fail(1, "portage is broken")
            } else {
                ok("")
            }
        });
        let gateway = PrivilegeGateway::new(&runner, Elevation::Direct);
        let profile = PackageManagerId::Emerge.profile().unwrap();

        let err = install_system_dependencies(
            &profile,
            &InstallationConfig::default(),
            &gateway,
            InstallOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::FlagReconciliationFailed(_)));
    }

    #[test]
    fn test_emerge_flag_failure_degrades_in_core_only_mode() {
        let runner = FakeRunner::with_handler(|cmd| {
            if cmd.args.iter().any(|a| a == "--pretend") {
                fail(1, "portage is broken")
            } else {
                ok("")
            }
        });
        let gateway = PrivilegeGateway::new(&runner, Elevation::Direct);
        let profile = PackageManagerId::Emerge.profile().unwrap();

        let status = install_system_dependencies(
            &profile,
            &InstallationConfig::default(),
            &gateway,
            InstallOptions {
                core_only: true,
                use_flag_state: None,
            },
        )
        .unwrap();
        assert!(matches!(status, ToolkitStatus::Degraded(_)));
    }

    #[test]
    fn test_unwritable_use_file_degrades_in_core_only_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = InstallationConfig::default();
        config.gentoo.package_use_dir = tmp.path().join("package.use");
        // A directory squatting on the installer-owned file name
        fs::create_dir_all(config.gentoo.package_use_dir.join("japirc")).unwrap();

        let runner = FakeRunner::new();
        let gateway = PrivilegeGateway::new(&runner, Elevation::Direct);
        let profile = PackageManagerId::Emerge.profile().unwrap();
        let options = InstallOptions {
            core_only: true,
            use_flag_state: Some(FlagState::Disabled),
        };

        let status = install_system_dependencies(&profile, &config, &gateway, options).unwrap();
        assert!(matches!(status, ToolkitStatus::Degraded(_)));

        let err = install_system_dependencies(
            &profile,
            &config,
            &gateway,
            InstallOptions {
                core_only: false,
                ..options
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::FlagReconciliationFailed(_)));
    }
}
