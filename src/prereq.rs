// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Prerequisite tool handling.
//!
//! Bootstrapping a repository needs `curl` to download files, and `gpg` to
//! dearmor signing keys. Missing tools are installed through the package
//! manager before anything else happens.

use crate::apt::{AptError, PackageManager};

use std::path::PathBuf;
use tracing::{info, instrument};

/// Command line tool, and the package that ships it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prerequisite {
    pub command: &'static str,
    pub package: &'static str,
}

/// HTTPS transfer tool.
pub const CURL: Prerequisite = Prerequisite {
    command: "curl",
    package: "curl",
};

/// Key verification tool.
pub const GNUPG: Prerequisite = Prerequisite {
    command: "gpg",
    package: "gnupg",
};

/// Locate commands on the search path.
pub trait ToolLocator {
    fn locate(&self, command: &str) -> Option<PathBuf>;
}

/// Tool lookup through `$PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SearchPath;

impl ToolLocator for SearchPath {
    fn locate(&self, command: &str) -> Option<PathBuf> {
        which::which(command).ok()
    }
}

/// Make sure prerequisite tool is available, installing it if needed.
///
/// # Errors
///
/// - Return [`PrerequisiteError::InstallFailed`] if package installation
///   fails, or the tool is still missing afterwards.
#[instrument(skip(locator, manager), level = "debug")]
pub fn ensure_prerequisite(
    tool: &Prerequisite,
    locator: &dyn ToolLocator,
    manager: &dyn PackageManager,
) -> Result<PathBuf> {
    if let Some(path) = locator.locate(tool.command) {
        info!("found {} at {}", tool.command, path.display());
        return Ok(path);
    }

    info!("{} not found, installing {}", tool.command, tool.package);
    manager
        .install(&[tool.package.to_string()])
        .map_err(|source| PrerequisiteError::InstallFailed {
            tool: *tool,
            source: Some(source),
        })?;

    locator
        .locate(tool.command)
        .ok_or(PrerequisiteError::InstallFailed {
            tool: *tool,
            source: None,
        })
}

/// Prerequisite error types.
#[derive(Debug, thiserror::Error)]
pub enum PrerequisiteError {
    #[error(
        "unable to install {}, which is required to set up repositories\n\n\
         Install package {:?} manually, then try again.",
        .tool.command,
        .tool.package
    )]
    InstallFailed {
        tool: Prerequisite,
        #[source]
        source: Option<AptError>,
    },
}

type Result<T, E = PrerequisiteError> = std::result::Result<T, E>;
