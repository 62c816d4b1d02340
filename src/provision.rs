// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Whole machine provisioning.
//!
//! Carry out a [`ProvisionPlan`] section by section: point apt at the
//! configured channel, install packages, bootstrap third-party repositories
//! along with their packages, write dotfiles, then register network mounts.
//! Each section is written once per run. Nothing is reconciled against what
//! is already on the system.

use crate::{
    apt::{AptError, PackageManager},
    bootstrap::{refresh_index, BootstrapError, BootstrapReport, Bootstrapper},
    config::{DotfileSpec, MountSpec, ProvisionPlan, SourcesSpec},
    path::{SysRoot, FSTAB, SOURCES_LIST},
};

use std::{
    fs::{read_to_string, write, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

/// Render primary apt source listing.
pub fn render_sources_list(sources: &SourcesSpec) -> String {
    let components = sources.components.join(" ");
    let mut listing = format!("deb {} {} {components}\n", sources.mirror, sources.channel);
    if sources.source {
        listing.push_str(&format!(
            "deb-src {} {} {components}\n",
            sources.mirror, sources.channel
        ));
    }
    listing
}

/// Replace primary apt source listing.
///
/// # Errors
///
/// - Return [`ProvisionError::Io`] if the listing cannot be written.
#[instrument(skip(root, sources), level = "debug")]
pub fn write_sources_list(root: &SysRoot, sources: &SourcesSpec) -> Result<PathBuf> {
    let path = root.resolve(SOURCES_LIST);
    info!("tracking {} channel through {}", sources.channel, path.display());
    write_file(&path, render_sources_list(sources))?;
    Ok(path)
}

/// Refresh package index, and install target packages.
///
/// Does nothing for an empty package list.
///
/// # Errors
///
/// - Return [`ProvisionError::Packages`] if installation fails.
#[instrument(skip(manager), level = "debug")]
pub fn install_packages(manager: &dyn PackageManager, packages: &[String]) -> Result<()> {
    if packages.is_empty() {
        return Ok(());
    }

    refresh_index(manager);
    info!("installing {}", packages.join(" "));
    manager.install(packages).map_err(ProvisionError::Packages)
}

/// Write dotfiles under system root.
///
/// Parent directories are created as needed, and existing files replaced.
///
/// # Errors
///
/// - Return [`ProvisionError::Io`] if a dotfile cannot be written.
#[instrument(skip(root, dotfiles), level = "debug")]
pub fn write_dotfiles(root: &SysRoot, dotfiles: &[DotfileSpec]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(dotfiles.len());
    for dotfile in dotfiles {
        let path = root.resolve(dotfile.as_path());
        info!("writing {}", path.display());
        write_file(&path, &dotfile.contents)?;
        written.push(path);
    }

    Ok(written)
}

/// Create mount points, and register mounts in fstab.
///
/// Entries already present verbatim in fstab are not appended again.
///
/// # Errors
///
/// - Return [`ProvisionError::Io`] if a mount point or fstab cannot be
///   written.
#[instrument(skip(root, mounts), level = "debug")]
pub fn add_mounts(root: &SysRoot, mounts: &[MountSpec]) -> Result<()> {
    if mounts.is_empty() {
        return Ok(());
    }

    let fstab = root.resolve(FSTAB);
    let mut current = match read_to_string(&fstab) {
        Ok(data) => data,
        Err(error) if error.kind() == ErrorKind::NotFound => String::new(),
        Err(source) => return Err(io_error(&fstab, source)),
    };

    for mount in mounts {
        let target = root.resolve(&mount.target);
        mkdirp::mkdirp(&target).map_err(|source| io_error(&target, source))?;

        let entry = mount.fstab_entry();
        if current.lines().any(|line| line.trim() == entry) {
            info!("fstab already mounts {}", mount.target.display());
            continue;
        }

        info!("adding {} to fstab", mount.target.display());
        if let Some(parent) = fstab.parent() {
            mkdirp::mkdirp(parent).map_err(|source| io_error(parent, source))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&fstab)
            .map_err(|source| io_error(&fstab, source))?;
        writeln!(file, "{entry}").map_err(|source| io_error(&fstab, source))?;

        // INVARIANT: Later duplicates in the same plan see this entry.
        current.push_str(&entry);
        current.push('\n');
    }

    Ok(())
}

/// Carry out whole provision plan.
///
/// # Errors
///
/// - Return [`ProvisionError`] for the first section that fails.
#[instrument(skip_all, level = "debug")]
pub fn provision(
    root: &SysRoot,
    plan: &ProvisionPlan,
    manager: &dyn PackageManager,
    bootstrapper: &Bootstrapper<'_>,
) -> Result<Option<BootstrapReport>> {
    if let Some(sources) = &plan.sources {
        write_sources_list(root, sources)?;
    }

    install_packages(manager, &plan.packages.install)?;

    let mut report = None;
    if !plan.repositories.is_empty() {
        report = Some(bootstrapper.run(&plan.repositories)?);
        let vendor_packages = plan
            .repositories
            .iter()
            .flat_map(|repository| repository.packages.iter().cloned())
            .collect::<Vec<_>>();
        install_packages(manager, &vendor_packages)?;
    }

    write_dotfiles(root, &plan.dotfiles)?;
    add_mounts(root, &plan.mounts)?;

    info!("provisioning done");

    Ok(report)
}

fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    if let Some(parent) = path.parent() {
        mkdirp::mkdirp(parent).map_err(|source| io_error(parent, source))?;
    }
    write(path, contents).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> ProvisionError {
    ProvisionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Provisioning error types.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("failed to install packages")]
    Packages(#[source] AptError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error("failed to write {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

type Result<T, E = ProvisionError> = std::result::Result<T, E>;
