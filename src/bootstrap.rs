// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Third-party repository bootstrapping.
//!
//! Bootstrapping walks a strictly linear sequence of [`Stage`]s:
//!
//! ```text
//! Start -> DetectHost -> EnsurePrerequisites -> DetectAptVersion
//!       -> PrepareTransport -> FetchRepoDefinition -> InstallSigningKey
//!       -> RefreshIndex -> Done
//! ```
//!
//! Any failure aborts the whole bootstrap. There is no retry, and no
//! rollback. A failed run may leave the repository declaration file missing
//! while the signing key of a previous run remains in place.
//!
//! When several repositories are bootstrapped together, everything up to
//! `PrepareTransport` happens once, and the fetch and key stages run per
//! repository in declaration order.

use crate::{
    apt::{detect_package_manager_version, AptError, AptVersion, PackageManager},
    config::RepositorySpec,
    host::{default_detectors, detect_host_identity, HostDetector, HostError, HostIdentity, PresetIdentity},
    keyring::{install_signing_key, Dearmor, KeyPlacement, KeyringError, KeyringLayout},
    path::SysRoot,
    prereq::{ensure_prerequisite, PrerequisiteError, ToolLocator, CURL, GNUPG},
    repository::{fetch_repository_definition, RepositoryError},
    transfer::TransferClient,
};

use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// Step of the bootstrap sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    DetectHost,
    EnsurePrerequisites,
    DetectAptVersion,
    PrepareTransport,
    FetchRepoDefinition,
    InstallSigningKey,
    RefreshIndex,
    Done,
}

/// Facts established before any repository is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapContext {
    pub host: HostIdentity,
    pub apt_version: AptVersion,
}

/// Outcome of bootstrapping a single repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryReport {
    pub name: String,
    pub definition_path: PathBuf,
    pub key: KeyPlacement,
}

/// Outcome of a whole bootstrap run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub context: BootstrapContext,
    pub repositories: Vec<RepositoryReport>,
}

/// Repository bootstrapper.
///
/// Holds every external collaborator the bootstrap sequence needs. Nothing is
/// shared between runs, all intermediate results are passed along
/// explicitly.
pub struct Bootstrapper<'a> {
    root: SysRoot,
    preset: PresetIdentity,
    detectors: Vec<Box<dyn HostDetector>>,
    locator: &'a dyn ToolLocator,
    manager: &'a dyn PackageManager,
    client: &'a dyn TransferClient,
    dearmor: &'a dyn Dearmor,
}

impl<'a> Bootstrapper<'a> {
    /// Construct new bootstrapper with standard host detection cascade.
    pub fn new(
        root: SysRoot,
        preset: PresetIdentity,
        locator: &'a dyn ToolLocator,
        manager: &'a dyn PackageManager,
        client: &'a dyn TransferClient,
        dearmor: &'a dyn Dearmor,
    ) -> Self {
        Self {
            detectors: default_detectors(&root),
            root,
            preset,
            locator,
            manager,
            client,
            dearmor,
        }
    }

    /// Replace host detection cascade.
    pub fn with_detectors(mut self, detectors: Vec<Box<dyn HostDetector>>) -> Self {
        self.detectors = detectors;
        self
    }

    /// Bootstrap target repositories.
    ///
    /// # Errors
    ///
    /// - Return [`BootstrapError`] for the first stage that fails.
    #[instrument(skip(self, repositories), level = "debug")]
    pub fn run(&self, repositories: &[RepositorySpec]) -> Result<BootstrapReport> {
        enter(Stage::Start);
        let context = self.prepare()?;

        let mut reports = Vec::with_capacity(repositories.len());
        for repository in repositories {
            reports.push(self.register(&context, repository)?);
        }

        enter(Stage::RefreshIndex);
        refresh_index(self.manager);

        enter(Stage::Done);
        info!("repositories are set up, packages can now be installed");

        Ok(BootstrapReport {
            context,
            repositories: reports,
        })
    }

    /// Run every stage that precedes repository registration.
    ///
    /// # Errors
    ///
    /// - Return [`BootstrapError::Host`] if host cannot be detected.
    /// - Return [`BootstrapError::Prerequisite`] if curl or gpg are missing
    ///   and cannot be installed.
    /// - Return [`BootstrapError::AptVersion`] if apt version is unknown.
    /// - Return [`BootstrapError::Transport`] if transport packages cannot be
    ///   installed.
    pub fn prepare(&self) -> Result<BootstrapContext> {
        enter(Stage::DetectHost);
        let host = detect_host_identity(&self.preset, &self.detectors)?;

        enter(Stage::EnsurePrerequisites);
        for tool in [CURL, GNUPG] {
            ensure_prerequisite(&tool, self.locator, self.manager)?;
        }

        enter(Stage::DetectAptVersion);
        let apt_version =
            detect_package_manager_version(self.manager).map_err(BootstrapError::AptVersion)?;

        enter(Stage::PrepareTransport);
        refresh_index(self.manager);
        if host.os == "debian" {
            info!("installing debian-archive-keyring");
            self.manager
                .install(&["debian-archive-keyring".to_string()])
                .map_err(BootstrapError::Transport)?;
        }
        info!("installing apt-transport-https");
        self.manager
            .install(&["apt-transport-https".to_string()])
            .map_err(BootstrapError::Transport)?;

        Ok(BootstrapContext { host, apt_version })
    }

    /// Fetch definition and signing key of a single repository.
    ///
    /// # Errors
    ///
    /// - Return [`BootstrapError::Repository`] if the definition cannot be
    ///   fetched.
    /// - Return [`BootstrapError::Keyring`] if the key cannot be installed.
    #[instrument(skip(self, context, repository), fields(repository = %repository.name), level = "debug")]
    pub fn register(
        &self,
        context: &BootstrapContext,
        repository: &RepositorySpec,
    ) -> Result<RepositoryReport> {
        enter(Stage::FetchRepoDefinition);
        let definition_path =
            fetch_repository_definition(&self.root, repository, &context.host, self.client)?;

        enter(Stage::InstallSigningKey);
        let layout = KeyringLayout::new(&self.root, &repository.name);
        let key = install_signing_key(
            &layout,
            &repository.key_url,
            context.apt_version.code(),
            self.client,
            self.dearmor,
        )?;

        Ok(RepositoryReport {
            name: repository.name.clone(),
            definition_path,
            key,
        })
    }
}

fn enter(stage: Stage) {
    info!("stage {stage:?}");
}

/// Refresh package index, only reporting failure.
pub(crate) fn refresh_index(manager: &dyn PackageManager) {
    info!("running apt-get update");
    if let Err(error) = manager.update() {
        warn!("apt-get update failed, continuing: {error}");
    }
}

/// Bootstrap error types.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Prerequisite(#[from] PrerequisiteError),

    #[error("unable to determine installed apt version")]
    AptVersion(#[source] AptError),

    #[error("unable to install apt transport packages")]
    Transport(#[source] AptError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Keyring(#[from] KeyringError),
}

impl BootstrapError {
    /// Stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Host(_) => Stage::DetectHost,
            Self::Prerequisite(_) => Stage::EnsurePrerequisites,
            Self::AptVersion(_) => Stage::DetectAptVersion,
            Self::Transport(_) => Stage::PrepareTransport,
            Self::Repository(_) => Stage::FetchRepoDefinition,
            Self::Keyring(_) => Stage::InstallSigningKey,
        }
    }
}

type Result<T, E = BootstrapError> = std::result::Result<T, E>;
