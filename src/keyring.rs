// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Signing key installation.
//!
//! Every third-party repository is verified through its own signing key. Apt
//! 1.1 and newer scope such keys to the repository that references them via
//! `signed-by`, so the key lives in the __keyring directory__ at
//! `/etc/apt/keyrings`.
//!
//! # Legacy Apt
//!
//! Older apt releases ignore `signed-by` entirely, and only trust keys placed
//! in the __legacy trusted-keys directory__ at `/etc/apt/trusted.gpg.d`. When
//! the installed apt is older than [`SIGNED_BY_THRESHOLD`], the key is moved
//! there instead. This is a compatibility shim for those releases only.
//!
//! [`SIGNED_BY_THRESHOLD`]: crate::apt::SIGNED_BY_THRESHOLD

use crate::{
    apt::AptVersionCode,
    path::{SysRoot, KEYRINGS_DIR, TRUSTED_KEYS_DIR},
    repository::remove_if_exists,
    syscall::{syscall_piped, SyscallError},
    transfer::{TransferClient, TransferOutcome},
};

use std::{
    fs::{read_dir, remove_dir, rename, set_permissions, write, Permissions},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

/// File mode of installed keys: world-readable, owner-writable.
pub const KEY_MODE: u32 = 0o644;

/// Convert ASCII-armored key material to binary key material.
pub trait Dearmor {
    fn dearmor(&self, armored: &[u8]) -> Result<Vec<u8>>;
}

/// Dearmor keys through `gpg --dearmor`.
#[derive(Debug, Clone)]
pub struct GpgDearmor {
    program: PathBuf,
}

impl GpgDearmor {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("gpg"),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GpgDearmor {
    fn default() -> Self {
        Self::new()
    }
}

impl Dearmor for GpgDearmor {
    fn dearmor(&self, armored: &[u8]) -> Result<Vec<u8>> {
        Ok(syscall_piped(&self.program, ["--dearmor"], armored)?)
    }
}

/// Candidate key locations of a single repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyringLayout {
    pub keyring_dir: PathBuf,
    pub keyring_path: PathBuf,
    pub legacy_path: PathBuf,
}

impl KeyringLayout {
    /// Lay out key paths for target repository.
    pub fn new(root: &SysRoot, name: &str) -> Self {
        let keyring_dir = root.resolve(KEYRINGS_DIR);
        Self {
            keyring_path: keyring_dir.join(format!("{name}_archive-keyring.gpg")),
            legacy_path: root.resolve(TRUSTED_KEYS_DIR).join(format!("{name}.gpg")),
            keyring_dir,
        }
    }
}

/// Where a signing key ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPlacement {
    /// Repository scoped keyring file.
    Keyring(PathBuf),

    /// Globally trusted legacy key file.
    Legacy(PathBuf),
}

impl KeyPlacement {
    pub fn as_path(&self) -> &Path {
        match self {
            Self::Keyring(path) | Self::Legacy(path) => path.as_path(),
        }
    }
}

/// Download, dearmor, and install repository signing key.
///
/// Stale keys at both candidate paths are removed first, so exactly one key
/// file exists afterwards.
///
/// # Errors
///
/// - Return [`KeyringError::KeyDownload`] if key cannot be downloaded.
/// - Return [`KeyringError::Dearmor`] if key cannot be dearmored.
/// - Return [`KeyringError::Io`] if key files cannot be written, moved, or
///   removed, including stale keys.
#[instrument(skip(layout, client, dearmor), level = "debug")]
pub fn install_signing_key(
    layout: &KeyringLayout,
    key_url: &str,
    version: AptVersionCode,
    client: &dyn TransferClient,
    dearmor: &dyn Dearmor,
) -> Result<KeyPlacement> {
    info!("importing gpg key from {key_url}");
    mkdirp::mkdirp(&layout.keyring_dir).map_err(|source| KeyringError::Io {
        path: layout.keyring_dir.clone(),
        source,
    })?;

    // INVARIANT: Only one key file may exist per repository.
    for stale in [&layout.keyring_path, &layout.legacy_path] {
        remove_if_exists(stale).map_err(|source| io_error(stale, source))?;
    }

    let armored = match client.get(key_url) {
        TransferOutcome::Success(body) => body,
        failure => {
            return Err(KeyringError::KeyDownload {
                url: key_url.to_string(),
                outcome: failure,
            })
        }
    };
    let key = dearmor.dearmor(&armored)?;

    write(&layout.keyring_path, key).map_err(|source| io_error(&layout.keyring_path, source))?;
    set_key_mode(&layout.keyring_path)?;

    if version.supports_signed_by() {
        info!("gpg key imported to {}", layout.keyring_path.display());
        return Ok(KeyPlacement::Keyring(layout.keyring_path.clone()));
    }

    if let Some(parent) = layout.legacy_path.parent() {
        mkdirp::mkdirp(parent).map_err(|source| io_error(parent, source))?;
    }
    rename(&layout.keyring_path, &layout.legacy_path)
        .map_err(|source| io_error(&layout.legacy_path, source))?;
    set_key_mode(&layout.legacy_path)?;

    if is_empty_dir(&layout.keyring_dir)? {
        info!("removing unused {}", layout.keyring_dir.display());
        remove_dir(&layout.keyring_dir).map_err(|source| io_error(&layout.keyring_dir, source))?;
    }

    info!("gpg key imported to {}", layout.legacy_path.display());

    Ok(KeyPlacement::Legacy(layout.legacy_path.clone()))
}

fn set_key_mode(path: &Path) -> Result<()> {
    set_permissions(path, Permissions::from_mode(KEY_MODE)).map_err(|source| io_error(path, source))
}

fn is_empty_dir(path: &Path) -> Result<bool> {
    Ok(read_dir(path)
        .map_err(|source| io_error(path, source))?
        .next()
        .is_none())
}

fn io_error(path: &Path, source: std::io::Error) -> KeyringError {
    KeyringError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Signing key error types.
#[derive(Debug, thiserror::Error)]
pub enum KeyringError {
    #[error("unable to download signing key from {url}: {outcome:?}")]
    KeyDownload { url: String, outcome: TransferOutcome },

    #[error("failed to dearmor signing key")]
    Dearmor(#[from] SyscallError),

    #[error("failed to install signing key at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

type Result<T, E = KeyringError> = std::result::Result<T, E>;
