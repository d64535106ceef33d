// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use japirc_setup::deps::gentoo::FlagState;
use japirc_setup::deps::{InstallOptions, ToolkitStatus};
use japirc_setup::launcher::{self, LaunchMode};
use japirc_setup::privilege::{Elevation, PrivilegeGateway};
use japirc_setup::process::SystemRunner;
use japirc_setup::publish::{LinkStatus, PathVisibility};
use japirc_setup::{InstallationConfig, environment, installer, platform, publish, uninstall};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "japirc-setup")]
#[command(author, version, long_about = None)]
#[command(about = "Install, launch and remove the JAPIRC chat client and server")]
struct Cli {
    /// JSON file overriding the built-in configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the application files to install
    #[arg(long, global = true)]
    source_dir: Option<PathBuf>,

    /// Isolated environment directory
    #[arg(long, global = true)]
    env_dir: Option<PathBuf>,

    /// Directory the executable and aliases are published to
    #[arg(long, global = true)]
    bin_dir: Option<PathBuf>,

    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install system dependencies, rebuild the environment, publish the executable
    Install {
        /// Continue without the GUI toolkit if it cannot be provided
        #[arg(long)]
        core_only: bool,
        /// Skip the Gentoo USE flag query and assume this state (enabled/on, disabled/off)
        #[arg(long, value_name = "STATE")]
        use_flag_state: Option<FlagState>,
    },
    /// Remove the executable, aliases, environment and USE flag entry
    Uninstall,
    /// Start the TUI client, GUI client or server (prompts when MODE is omitted)
    Launch {
        /// tui, gui or server (or 1, 2, 3)
        mode: Option<String>,
        /// Extra arguments passed to the application
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Show the detected package manager and elevation method
    Detect,
    /// Show installation state and published names
    Status,
    /// Print the effective configuration as JSON
    Config,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn load_config(cli: &Cli) -> japirc_setup::Result<InstallationConfig> {
    let mut config = InstallationConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.source_dir {
        config.source_dir = dir.clone();
    }
    if let Some(dir) = &cli.env_dir {
        config.environment_dir = dir.clone();
    }
    if let Some(dir) = &cli.bin_dir {
        config.target_bin_dir = dir.clone();
    }
    config.resolve_paths()?;
    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let runner = SystemRunner;

    match cli.command {
        Commands::Install {
            core_only,
            use_flag_state,
        } => {
            info!("Installing {} from {}", config.app_name, config.source_dir.display());
            let gateway = PrivilegeGateway::new(&runner, Elevation::detect());
            let options = InstallOptions {
                core_only,
                use_flag_state,
            };

            let report = installer::install(&config, &gateway, options)?;

            println!("Installed {} via {}", config.app_name, report.profile.id);
            println!("  Environment: {}", report.environment.root.display());
            println!("  Executable:  {}", report.links.main.display());
            for alias in &report.links.aliases {
                println!("  Alias:       {}", alias.display());
            }
            if let ToolkitStatus::Degraded(reason) = &report.toolkit {
                warn!("GUI client unavailable: {}", reason);
            }
            if report.links.visibility != PathVisibility::OnPath {
                warn!(
                    "'{}' may not be runnable by name until PATH is updated",
                    config.main_executable_name
                );
            }
            Ok(())
        }
        Commands::Uninstall => {
            info!("Uninstalling {}", config.app_name);
            let gateway = PrivilegeGateway::new(&runner, Elevation::detect());
            let report = uninstall::uninstall(&config, &gateway);

            for outcome in &report.outcomes {
                println!("{}", outcome);
            }
            if let Some(err) = report.partial_failure() {
                warn!("{}", err);
            }
            Ok(())
        }
        Commands::Launch { mode, args } => {
            let mode: LaunchMode = match mode {
                Some(mode) => mode.parse()?,
                None => launcher::prompt_mode()?,
            };
            let plan = launcher::plan(&config, mode, |name| std::env::var_os(name))?;
            Err(launcher::exec(&plan, &args).into())
        }
        Commands::Detect => {
            let elevation = Elevation::detect();
            let profile = platform::resolve()?;
            println!("Package manager: {} ({})", profile.id, profile.command);
            println!("  System packages: {}", profile.system_packages().join(" "));
            match elevation {
                Elevation::Direct => println!("Elevation: running as root"),
                Elevation::Helper(helper) => println!("Elevation: {}", helper),
                Elevation::Unavailable => println!("Elevation: unavailable"),
            }
            Ok(())
        }
        Commands::Status => {
            if environment::is_installed(&config) {
                println!("Installed: yes ({})", config.environment_dir.display());
            } else {
                println!("Installed: no");
            }
            for (path, status) in publish::inspect(&config) {
                let label = match status {
                    LinkStatus::Installed => "installed".to_string(),
                    LinkStatus::Linked => "linked".to_string(),
                    LinkStatus::Foreign(what) => format!("foreign ({})", what),
                    LinkStatus::Missing => "missing".to_string(),
                };
                println!("  {}: {}", path.display(), label);
            }
            Ok(())
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "japirc-setup", &mut io::stdout());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging; warnings go to stderr
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            let code = err
                .downcast_ref::<japirc_setup::Error>()
                .map(japirc_setup::Error::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_launch_accepts_optional_mode() {
        let cli = Cli::try_parse_from(["japirc-setup", "launch", "GUI"]).unwrap();
        match cli.command {
            Commands::Launch { mode, args } => {
                assert_eq!(mode.as_deref(), Some("GUI"));
                assert!(args.is_empty());
            }
            _ => panic!("expected launch"),
        }

        let cli = Cli::try_parse_from(["japirc-setup", "launch"]).unwrap();
        assert!(matches!(cli.command, Commands::Launch { mode: None, .. }));
    }

    #[test]
    fn test_install_flags() {
        let cli = Cli::try_parse_from([
            "japirc-setup",
            "install",
            "--core-only",
            "--use-flag-state",
            "enabled",
        ])
        .unwrap();
        match cli.command {
            Commands::Install {
                core_only,
                use_flag_state,
            } => {
                assert!(core_only);
                assert_eq!(use_flag_state, Some(FlagState::Enabled));
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_use_flag_state_accepts_on_off() {
        let cli =
            Cli::try_parse_from(["japirc-setup", "install", "--use-flag-state", "off"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Install {
                use_flag_state: Some(FlagState::Disabled),
                ..
            }
        ));
    }

    #[test]
    fn test_overrides_apply_before_validation() {
        let cli = Cli::try_parse_from([
            "japirc-setup",
            "--bin-dir",
            "/opt/japirc/bin",
            "--env-dir",
            "/tmp/japirc-env",
            "status",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.target_bin_dir, PathBuf::from("/opt/japirc/bin"));
        assert_eq!(config.environment_dir, PathBuf::from("/tmp/japirc-env"));
    }

    #[test]
    fn test_relative_overrides_become_absolute() {
        let cli = Cli::try_parse_from(["japirc-setup", "--bin-dir", "bin", "status"]).unwrap();
        let config = load_config(&cli).unwrap();

        let cwd = std::env::current_dir().unwrap();
        assert_eq!(config.target_bin_dir, cwd.join("bin"));
        assert_eq!(config.main_target(), cwd.join("bin").join("japirc"));
        assert!(config.source_dir.is_absolute());
    }

    #[test]
    fn test_env_dir_over_sources_is_rejected() {
        let cli = Cli::try_parse_from([
            "japirc-setup",
            "--env-dir",
            "/srv/japirc",
            "--source-dir",
            "/srv/japirc/src",
            "status",
        ])
        .unwrap();
        let err = load_config(&cli).unwrap_err();
        assert!(matches!(err, japirc_setup::Error::ConfigInvalid(_)));
    }
}
