// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for japirc-setup
#[derive(Error, Debug)]
pub enum Error {
    /// None of the supported package managers was found on PATH
    #[error(
        "Unsupported platform: no supported package manager found (probed {probed}). \
         Install python3, its venv module, pip and Tk bindings manually, then re-run"
    )]
    UnsupportedPlatform { probed: String },

    /// Not root and no elevation helper (sudo/doas) available
    #[error("Privilege unavailable: {0}")]
    PrivilegeUnavailable(String),

    /// A required application artifact is missing from the source directory
    #[error("Missing source file: {}", .0.display())]
    MissingSourceFile(PathBuf),

    /// A system or environment package failed to install
    #[error("Dependency install failed: {0}")]
    DependencyInstallFailed(String),

    /// The environment directory or its runtime could not be created
    #[error("Failed to create environment: {0}")]
    EnvironmentCreateFailed(String),

    /// Gentoo USE-flag reconciliation failed
    #[error("USE flag reconciliation failed: {0}")]
    FlagReconciliationFailed(String),

    /// Installing the main executable or an alias failed
    #[error("Publication failed: {0}")]
    PublicationFailed(String),

    /// A launch precondition did not hold (bad mode, no display, not installed)
    #[error("{0}")]
    UsagePreconditionFailed(String),

    /// One or more uninstall steps failed
    #[error("Uninstall incomplete: {failed} artifact(s) could not be removed")]
    TeardownPartialFailure { failed: usize },

    /// Configuration violates an invariant
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code for this error kind. Always non-zero.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::UsagePreconditionFailed(_) => 2,
            Error::ConfigInvalid(_) | Error::ConfigParse(_) => 3,
            Error::UnsupportedPlatform { .. } => 10,
            Error::PrivilegeUnavailable(_) => 11,
            Error::MissingSourceFile(_) => 12,
            Error::DependencyInstallFailed(_) => 13,
            Error::EnvironmentCreateFailed(_) => 14,
            Error::FlagReconciliationFailed(_) => 15,
            Error::PublicationFailed(_) => 16,
            Error::TeardownPartialFailure { .. } => 17,
            Error::Io(_) => 1,
        }
    }
}

/// Result type alias using japirc-setup's Error type
pub type Result<T> = std::result::Result<T, Error>;
