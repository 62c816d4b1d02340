// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the provision plan to simplify the process of
//! serialization and deserialization. File I/O is left to the caller to
//! figure out.

use crate::host::HostIdentity;

use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Provision plan layout.
///
/// A __provision plan__ describes everything aptstrap should do to a fresh
/// machine. Every section is optional, and sections are always carried out in
/// the same order: sources, packages, repositories, dotfiles, then mounts.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ProvisionPlan {
    /// Primary apt source listing to track.
    pub sources: Option<SourcesSpec>,

    /// Packages to install from the primary apt sources.
    #[serde(default)]
    pub packages: PackageSelection,

    /// Third-party repositories to bootstrap.
    #[serde(rename = "repository", default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<RepositorySpec>,

    /// Shell configuration files to write.
    #[serde(rename = "dotfile", default, skip_serializing_if = "Vec::is_empty")]
    pub dotfiles: Vec<DotfileSpec>,

    /// Network shares to register in fstab.
    #[serde(rename = "mount", default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<MountSpec>,
}

impl ProvisionPlan {
    /// Find repository entry by name.
    pub fn repository(&self, name: impl AsRef<str>) -> Option<&RepositorySpec> {
        self.repositories
            .iter()
            .find(|repository| repository.name == name.as_ref())
    }
}

impl FromStr for ProvisionPlan {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut plan: ProvisionPlan = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Repository names are unique, because they name files.
        let mut seen = HashSet::new();
        for repository in &plan.repositories {
            if !is_valid_repository_name(&repository.name) {
                return Err(ConfigError::InvalidRepositoryName(repository.name.clone()));
            }

            if !seen.insert(repository.name.as_str()) {
                return Err(ConfigError::DuplicateRepository(repository.name.clone()));
            }
        }

        // INVARIANT: Perform shell expansion on dotfile paths.
        for dotfile in &mut plan.dotfiles {
            dotfile.path = shellexpand::full(dotfile.path.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned()
                .into();
        }

        Ok(plan)
    }
}

/// Apt only reads `sources.list.d` entries named with letters, digits,
/// underscores, hyphens, and periods.
fn is_valid_repository_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

impl Display for ProvisionPlan {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Primary apt source listing.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SourcesSpec {
    /// Mirror URL to fetch packages from.
    pub mirror: String,

    /// Distribution channel to track, e.g., "unstable".
    pub channel: String,

    /// Archive components to enable.
    #[serde(default = "default_components")]
    pub components: Vec<String>,

    /// Also emit a `deb-src` line.
    #[serde(default)]
    pub source: bool,
}

fn default_components() -> Vec<String> {
    vec!["main".into()]
}

/// Package selection from primary apt sources.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PackageSelection {
    #[serde(default)]
    pub install: Vec<String>,
}

/// Third-party apt repository.
///
/// The name of a repository determines where its files land:
/// `sources.list.d/<name>.list`, `keyrings/<name>_archive-keyring.gpg`, or
/// `trusted.gpg.d/<name>.gpg` for older apt releases.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct RepositorySpec {
    /// Local name of repository.
    pub name: String,

    /// URL of repository definition with `{os}` and `{dist}` placeholders.
    pub definition_url: String,

    /// URL of ASCII-armored signing key.
    pub key_url: String,

    /// Packages to install once repository is registered.
    #[serde(default)]
    pub packages: Vec<String>,
}

impl RepositorySpec {
    /// Fill in `{os}` and `{dist}` placeholders of definition URL.
    ///
    /// Host identity values are substituted verbatim.
    pub fn definition_url_for(&self, host: &HostIdentity) -> String {
        self.definition_url
            .replace("{os}", &host.os)
            .replace("{dist}", &host.dist)
    }
}

/// Shell configuration file to write.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct DotfileSpec {
    /// Path to write to, shell expanded on parse.
    pub path: PathBuf,

    /// Full file contents.
    pub contents: String,
}

impl DotfileSpec {
    pub fn as_path(&self) -> &Path {
        self.path.as_path()
    }
}

/// Network share to register in fstab.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct MountSpec {
    pub source: String,
    pub target: PathBuf,
    pub fstype: String,
    #[serde(default = "default_mount_options")]
    pub options: String,
}

fn default_mount_options() -> String {
    "defaults".into()
}

impl MountSpec {
    /// Render mount as fstab entry.
    pub fn fstab_entry(&self) -> String {
        format!(
            "{} {} {} {} 0 0",
            self.source,
            self.target.display(),
            self.fstype,
            self.options
        )
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Two repositories share the same name.
    #[error("repository {0:?} declared more than once")]
    DuplicateRepository(String),

    /// Repository name cannot be used as apt file name.
    #[error("repository name {0:?} may only contain letters, digits, '_', '-', and '.'")]
    InvalidRepositoryName(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
