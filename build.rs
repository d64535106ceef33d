// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn global_args() -> Vec<Arg> {
    vec![
        Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .global(true)
            .help("JSON file overriding the built-in configuration"),
        Arg::new("source_dir")
            .long("source-dir")
            .value_name("DIR")
            .global(true)
            .help("Directory holding the application files to install"),
        Arg::new("env_dir")
            .long("env-dir")
            .value_name("DIR")
            .global(true)
            .help("Isolated environment directory"),
        Arg::new("bin_dir")
            .long("bin-dir")
            .value_name("DIR")
            .global(true)
            .help("Directory the executable and aliases are published to"),
        Arg::new("verbose")
            .short('v')
            .long("verbose")
            .action(ArgAction::SetTrue)
            .global(true)
            .help("Log debug output (overridden by RUST_LOG)"),
    ]
}

fn build_cli() -> Command {
    Command::new("japirc-setup")
        .version(env!("CARGO_PKG_VERSION"))
        .author("JAPIRC Contributors")
        .about("Install, launch and remove the JAPIRC chat client and server")
        .args(global_args())
        .subcommand(
            Command::new("install")
                .about(
                    "Install system dependencies, rebuild the environment, publish the executable",
                )
                .arg(
                    Arg::new("core_only")
                        .long("core-only")
                        .action(ArgAction::SetTrue)
                        .help("Continue without the GUI toolkit if it cannot be provided"),
                )
                .arg(
                    Arg::new("use_flag_state")
                        .long("use-flag-state")
                        .value_name("STATE")
                        .value_parser(["enabled", "disabled", "on", "off"])
                        .help("Skip the Gentoo USE flag query and assume this state"),
                ),
        )
        .subcommand(
            Command::new("uninstall")
                .about("Remove the executable, aliases, environment and USE flag entry"),
        )
        .subcommand(
            Command::new("launch")
                .about("Start the TUI client, GUI client or server (prompts when MODE is omitted)")
                .arg(Arg::new("mode").help("tui, gui or server (or 1, 2, 3)"))
                .arg(
                    Arg::new("args")
                        .num_args(0..)
                        .last(true)
                        .help("Extra arguments passed to the application"),
                ),
        )
        .subcommand(
            Command::new("detect").about("Show the detected package manager and elevation method"),
        )
        .subcommand(Command::new("status").about("Show installation state and published names"))
        .subcommand(Command::new("config").about("Print the effective configuration as JSON"))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell", "elvish"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("japirc-setup.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
