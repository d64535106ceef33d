// tests/integration_test.rs

//! Integration tests for the installer
//!
//! File operations (install, ln, rm, mkdir) run for real inside temp
//! directories; package managers, python and emerge are simulated.

use japirc_setup::deps::InstallOptions;
use japirc_setup::deps::ToolkitStatus;
use japirc_setup::deps::gentoo::{self, UseFlagRecord};
use japirc_setup::environment::{self, EnvironmentState};
use japirc_setup::installer;
use japirc_setup::launcher::{self, LaunchMode};
use japirc_setup::platform::{self, PackageManagerId};
use japirc_setup::privilege::{Elevation, PrivilegeGateway};
use japirc_setup::process::{CommandLine, CommandOutcome, CommandRunner, SystemRunner};
use japirc_setup::uninstall::{self, ArtifactKind, Outcome};
use japirc_setup::{Error, InstallationConfig};
use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::Path;

const FILE_TOOLS: &[&str] = &["install", "ln", "rm", "mkdir"];

/// Runs file tools for real and answers everything else from a script
struct HostRunner {
    flag_query_output: String,
    calls: RefCell<Vec<String>>,
}

impl HostRunner {
    fn new() -> Self {
        Self {
            flag_query_output: String::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    fn with_flag_query_output(output: &str) -> Self {
        Self {
            flag_query_output: output.to_string(),
            ..Self::new()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl CommandRunner for HostRunner {
    fn run(&self, cmd: &CommandLine) -> io::Result<CommandOutcome> {
        self.calls.borrow_mut().push(cmd.to_string());

        if FILE_TOOLS.contains(&cmd.program.as_str()) {
            return SystemRunner.run(cmd);
        }

        let mut outcome = CommandOutcome {
            code: Some(0),
            ..CommandOutcome::default()
        };
        match (cmd.program.as_str(), cmd.args.as_slice()) {
            (_, [m, venv, dir]) if m == "-m" && venv == "venv" => {
                let bin = Path::new(dir).join("bin");
                fs::create_dir_all(&bin)?;
                fs::write(bin.join("python"), "")?;
            }
            ("emerge", args) if args.iter().any(|a| a == "--pretend") => {
                outcome.stdout = self.flag_query_output.clone();
            }
            _ => {}
        }
        Ok(outcome)
    }
}

fn test_config(root: &Path) -> InstallationConfig {
    let mut config = InstallationConfig::default();
    config.source_dir = root.join("src");
    config.environment_dir = root.join("env");
    config.target_bin_dir = root.join("bin");
    config.gentoo.package_use_dir = root.join("portage/package.use");

    fs::create_dir_all(&config.source_dir).unwrap();
    for name in &config.source_files {
        fs::write(config.source_dir.join(name), format!("# {}\n", name)).unwrap();
    }
    config
}

fn profile(id: PackageManagerId) -> japirc_setup::Result<platform::PackageManagerProfile> {
    platform::select(id)
}

#[test]
fn test_install_on_apt_then_uninstall() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let runner = HostRunner::new();
    let gateway = PrivilegeGateway::new(&runner, Elevation::Direct);

    let report = installer::install_with(&config, &gateway, InstallOptions::default(), || {
        profile(PackageManagerId::Apt)
    })
    .unwrap();

    assert_eq!(report.toolkit, ToolkitStatus::Available);
    assert_eq!(report.environment.state, EnvironmentState::Active);
    assert_eq!(runner.count("apt-get update"), 1);
    assert_eq!(runner.count("apt-get install"), 1);
    assert!(environment::is_installed(&config));
    assert!(config.environment_dir.join("JAPIRC_GUI.client.py").is_file());
    assert!(!config.environment_dir.join("japirc").exists());
    assert!(config.main_target().is_file());
    assert_eq!(fs::read_link(config.target_bin_dir.join("japi")).unwrap(), config.main_target());

    let teardown = uninstall::uninstall(&config, &gateway);
    assert!(teardown.partial_failure().is_none());
    assert!(!config.environment_dir.exists());
    assert!(!config.main_target().exists());
    assert!(fs::symlink_metadata(config.target_bin_dir.join("japi")).is_err());
    assert!(!environment::is_installed(&config));
}

#[test]
fn test_reinstall_rebuilds_environment() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let runner = HostRunner::new();
    let gateway = PrivilegeGateway::new(&runner, Elevation::Direct);

    installer::install_with(&config, &gateway, InstallOptions::default(), || {
        profile(PackageManagerId::Pacman)
    })
    .unwrap();
    fs::write(config.environment_dir.join("leftover.log"), "x").unwrap();

    installer::install_with(&config, &gateway, InstallOptions::default(), || {
        profile(PackageManagerId::Pacman)
    })
    .unwrap();

    assert!(!config.environment_dir.join("leftover.log").exists());
    let bin_entries = fs::read_dir(&config.target_bin_dir).unwrap().count();
    assert_eq!(bin_entries, 1 + config.alias_names.len());
}

#[test]
fn test_gentoo_install_appends_use_line_once() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let runner = HostRunner::with_flag_query_output(
        "[ebuild   R    ] dev-lang/python-3.12.3:3.12  USE=\"ensurepip ssl -tk\"\n",
    );
    let gateway = PrivilegeGateway::new(&runner, Elevation::Direct);

    for _ in 0..2 {
        installer::install_with(&config, &gateway, InstallOptions::default(), || {
            profile(PackageManagerId::Emerge)
        })
        .unwrap();
    }

    let record = UseFlagRecord::from_config(&config);
    let contents = fs::read_to_string(&record.config_file_path).unwrap();
    assert_eq!(contents.lines().filter(|l| *l == record.canonical_line()).count(), 1);
    assert_eq!(runner.count("emerge --ask --oneshot --newuse"), 2);
    let line = record.canonical_line();
    assert!(gentoo::line_present(&config.gentoo.package_use_dir, &line).unwrap());

    let teardown = uninstall::uninstall(&config, &gateway);
    assert!(teardown.partial_failure().is_none());
    assert!(!record.config_file_path.exists());
}

#[test]
fn test_gentoo_flag_already_enabled_skips_rebuild() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let runner = HostRunner::with_flag_query_output(
        "[ebuild   R    ] dev-lang/python-3.12.3:3.12  USE=\"ensurepip ssl tk\"\n",
    );
    let gateway = PrivilegeGateway::new(&runner, Elevation::Direct);

    installer::install_with(&config, &gateway, InstallOptions::default(), || {
        profile(PackageManagerId::Emerge)
    })
    .unwrap();

    assert_eq!(runner.count("emerge --ask"), 0);
    assert!(!UseFlagRecord::from_config(&config).config_file_path.exists());
}

#[test]
fn test_uninstall_leaves_foreign_alias() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let runner = HostRunner::new();
    let gateway = PrivilegeGateway::new(&runner, Elevation::Direct);

    installer::install_with(&config, &gateway, InstallOptions::default(), || {
        profile(PackageManagerId::Dnf)
    })
    .unwrap();

    let japi = config.target_bin_dir.join("japi");
    fs::remove_file(&japi).unwrap();
    fs::write(&japi, "someone else's tool").unwrap();

    let teardown = uninstall::uninstall(&config, &gateway);

    assert!(matches!(teardown.outcome_for(&japi), Some(Outcome::Skipped(_))));
    assert_eq!(fs::read_to_string(&japi).unwrap(), "someone else's tool");
    assert!(!config.main_target().exists());
    assert!(!config.environment_dir.exists());
    assert!(teardown.partial_failure().is_none());
}

#[test]
fn test_uninstall_with_nothing_installed() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let runner = HostRunner::new();
    let gateway = PrivilegeGateway::new(&runner, Elevation::Direct);

    let teardown = uninstall::uninstall(&config, &gateway);
    assert!(teardown.outcomes.iter().all(|o| o.outcome == Outcome::Absent));
    assert!(runner.calls().is_empty());
}

#[test]
fn test_uninstall_removes_alias_symlink_not_its_target() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    fs::create_dir_all(&config.target_bin_dir).unwrap();
    let elsewhere = tmp.path().join("elsewhere");
    fs::write(&elsewhere, "").unwrap();
    symlink(&elsewhere, config.target_bin_dir.join("japi")).unwrap();

    let runner = HostRunner::new();
    let gateway = PrivilegeGateway::new(&runner, Elevation::Direct);
    let teardown = uninstall::uninstall(&config, &gateway);

    let alias = teardown
        .outcomes
        .iter()
        .find(|o| o.kind == ArtifactKind::Alias && o.path.ends_with("japi"))
        .unwrap();
    assert_eq!(alias.outcome, Outcome::Removed);
    assert!(elsewhere.exists());
}

#[test]
fn test_unsupported_platform_changes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let runner = HostRunner::new();
    let gateway = PrivilegeGateway::new(&runner, Elevation::Direct);

    let err = installer::install_with(&config, &gateway, InstallOptions::default(), || {
        platform::select(platform::detect_with(|_| false))
    })
    .unwrap_err();

    assert!(matches!(err, Error::UnsupportedPlatform { .. }));
    assert_ne!(err.exit_code(), 0);
    assert!(runner.calls().is_empty());
    assert!(!config.environment_dir.exists());
    assert!(!config.target_bin_dir.exists());
}

#[test]
fn test_gui_launch_without_display_after_install() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let runner = HostRunner::new();
    let gateway = PrivilegeGateway::new(&runner, Elevation::Direct);

    installer::install_with(&config, &gateway, InstallOptions::default(), || {
        profile(PackageManagerId::Apt)
    })
    .unwrap();

    let no_display = |_: &str| -> Option<OsString> { None };
    let err = launcher::plan(&config, LaunchMode::Gui, no_display).unwrap_err();
    assert!(matches!(err, Error::UsagePreconditionFailed(_)));

    let plan = launcher::plan(&config, LaunchMode::Tui, no_display).unwrap();
    assert_eq!(plan.script, config.environment_dir.join("JAPIRC_TUI.client.py"));
    assert!(plan.python.exists());
}
