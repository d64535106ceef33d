// src/lib.rs

//! JAPIRC installer
//!
//! Bootstraps, rebuilds and removes the JAPIRC chat client/server, which runs
//! from an isolated python environment, across Debian/Ubuntu, Fedora, Arch
//! and Gentoo hosts.
//!
//! # Architecture
//!
//! - Privilege gateway: the only place commands get elevated (root, sudo, doas)
//! - Profile resolver: apt, dnf, pacman, emerge, probed in that order
//! - Dependency installer: one native install call, plus USE flag
//!   reconciliation on Gentoo
//! - Environment lifecycle: every install is a full venv rebuild
//! - Publication: main executable plus alias symlinks in a shared bin dir
//! - Uninstaller: best-effort teardown of only what the installer created

pub mod config;
pub mod deps;
pub mod environment;
mod error;
pub mod installer;
pub mod launcher;
pub mod platform;
pub mod privilege;
pub mod process;
pub mod publish;
pub mod uninstall;

pub use config::InstallationConfig;
pub use error::{Error, Result};
