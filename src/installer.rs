// src/installer.rs

//! Install pipeline
//!
//! Sources → package manager → system dependencies → environment →
//! publication. Any error aborts the run immediately; nothing is rolled
//! back, the next run rebuilds a stale environment from scratch.

use crate::config::InstallationConfig;
use crate::deps::{self, InstallOptions, ToolkitStatus};
use crate::environment::{self, EnvironmentHandle};
use crate::error::Result;
use crate::platform::{self, PackageManagerProfile};
use crate::privilege::PrivilegeGateway;
use crate::publish::{self, PublishedLinks};
use tracing::info;

/// Everything a successful install produced
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub profile: PackageManagerProfile,
    pub toolkit: ToolkitStatus,
    pub environment: EnvironmentHandle,
    pub links: PublishedLinks,
}

/// Run the full install against the host's package manager
pub fn install(
    config: &InstallationConfig,
    gateway: &PrivilegeGateway<'_>,
    options: InstallOptions,
) -> Result<InstallReport> {
    install_with(config, gateway, options, platform::resolve)
}

/// Run the full install with a caller-supplied profile resolver
pub fn install_with(
    config: &InstallationConfig,
    gateway: &PrivilegeGateway<'_>,
    options: InstallOptions,
    resolve: impl FnOnce() -> Result<PackageManagerProfile>,
) -> Result<InstallReport> {
    environment::verify_sources(config)?;

    let profile = resolve()?;
    gateway.require()?;

    let toolkit = deps::install_system_dependencies(&profile, config, gateway, options)?;
    let environment = environment::ensure_environment(config, gateway)?;
    let links = publish::publish(config, gateway)?;

    info!(
        "{} installed: {} (+{} alias(es)), environment at {}",
        config.app_name,
        links.main.display(),
        links.aliases.len(),
        environment.root.display()
    );

    Ok(InstallReport {
        profile,
        toolkit,
        environment,
        links,
    })
}
