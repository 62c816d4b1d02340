// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Every file aptstrap touches lives at a fixed location in the filesystem
//! hierarchy of a Debian system, e.g., `/etc/apt/keyrings`. These locations
//! are always resolved relative to a [`SysRoot`], so the whole tool can be
//! pointed at a scratch directory instead of the running host.

use std::path::{Component, Path, PathBuf};

/// Full replacement target for the primary apt source listing.
pub const SOURCES_LIST: &str = "/etc/apt/sources.list";

/// Directory holding per-repository source declarations.
pub const SOURCES_LIST_DIR: &str = "/etc/apt/sources.list.d";

/// Keyring directory for keys scoped to a repository through `signed-by`.
pub const KEYRINGS_DIR: &str = "/etc/apt/keyrings";

/// Legacy trusted-keys directory that older apt releases trust globally.
pub const TRUSTED_KEYS_DIR: &str = "/etc/apt/trusted.gpg.d";

pub const LSB_RELEASE: &str = "/etc/lsb-release";
pub const DEBIAN_VERSION: &str = "/etc/debian_version";
pub const ISSUE: &str = "/etc/issue";
pub const FSTAB: &str = "/etc/fstab";

/// Root directory that fixed system paths are resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysRoot(PathBuf);

impl SysRoot {
    /// Construct new system root at target directory.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// System root of the running host, i.e., `/`.
    pub fn host() -> Self {
        Self(PathBuf::from("/"))
    }

    /// Resolve absolute system path under this root.
    ///
    /// Leading root components of `path` are dropped before joining, so
    /// `/etc/fstab` under root `/tmp/scratch` becomes `/tmp/scratch/etc/fstab`.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let relative = path
            .as_ref()
            .components()
            .filter(|component| !matches!(component, Component::RootDir | Component::Prefix(_)))
            .collect::<PathBuf>();
        self.0.join(relative)
    }
}

impl Default for SysRoot {
    fn default() -> Self {
        Self::host()
    }
}

/// Determine default absolute path to provision plan.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/aptstrap/plan.toml` as the
/// default location. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_plan_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("aptstrap").join("plan.toml"))
        .ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
