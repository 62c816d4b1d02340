// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package manager interaction.
//!
//! Aptstrap talks to apt through the [`PackageManager`] trait. The
//! [`AptGet`] implementation shells out to `apt-get` in non-interactive
//! mode.
//!
//! # Version Codes
//!
//! Apt releases before 1.1 ignore per-repository `signed-by` references, and
//! only trust keys placed in the legacy trusted-keys directory. The installed
//! version is reduced to a single [`AptVersionCode`] by gluing the major and
//! minor numbers together followed by a zero, e.g., 1.0 becomes 100 and 2.6
//! becomes 260, which is then compared against [`SIGNED_BY_THRESHOLD`].

use crate::syscall::{syscall_non_interactive, SyscallError};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};
use tracing::{info, instrument};

/// Version code of the first apt release that honors `signed-by`, i.e., 1.1.
pub const SIGNED_BY_THRESHOLD: u32 = 110;

const NONINTERACTIVE: [(&str, &str); 1] = [("DEBIAN_FRONTEND", "noninteractive")];

/// Layer of indirection for package manager access.
pub trait PackageManager {
    /// Obtain version banner of package manager.
    fn version_banner(&self) -> Result<String>;

    /// Refresh package index.
    fn update(&self) -> Result<()>;

    /// Install target packages.
    fn install(&self, packages: &[String]) -> Result<()>;
}

/// Package manager access through `apt-get`.
#[derive(Debug, Clone)]
pub struct AptGet {
    program: PathBuf,
}

impl AptGet {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("apt-get"),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for AptGet {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageManager for AptGet {
    fn version_banner(&self) -> Result<String> {
        let output = syscall_non_interactive(&self.program, ["-v"], NONINTERACTIVE)?;
        Ok(output
            .strip_prefix("stdout: ")
            .map(ToString::to_string)
            .unwrap_or(output))
    }

    #[instrument(skip(self), level = "debug")]
    fn update(&self) -> Result<()> {
        syscall_non_interactive(&self.program, ["update"], NONINTERACTIVE)?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn install(&self, packages: &[String]) -> Result<()> {
        let mut args = vec!["install".to_string(), "-y".to_string()];
        args.extend(packages.iter().cloned());
        syscall_non_interactive(&self.program, args, NONINTERACTIVE)?;
        Ok(())
    }
}

/// Major and minor version of apt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AptVersion {
    pub major: u32,
    pub minor: u32,
}

impl AptVersion {
    /// Parse version out of `apt-get -v` banner.
    ///
    /// The version is the second whitespace separated field of the first line,
    /// e.g., "apt 2.6.1 (amd64)".
    ///
    /// # Errors
    ///
    /// - Return [`AptError::InvalidVersionFormat`] if the banner does not
    ///   carry a numeric major and minor version.
    pub fn parse(banner: &str) -> Result<Self> {
        let invalid = || AptError::InvalidVersionFormat(banner.lines().next().unwrap_or_default().into());
        let full = banner
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .ok_or_else(invalid)?;

        let mut parts = full.split('.');
        let major = parts.next().and_then(|part| part.parse().ok()).ok_or_else(invalid)?;
        let minor = parts.next().and_then(|part| part.parse().ok()).ok_or_else(invalid)?;

        Ok(Self { major, minor })
    }

    /// Reduce version to comparison code.
    pub fn code(&self) -> AptVersionCode {
        // INVARIANT: Digits are concatenated, not weighted.
        let minor_digits = self.minor.to_string().len() as u32;
        let code = self
            .major
            .saturating_mul(10u32.saturating_pow(minor_digits + 1))
            .saturating_add(self.minor.saturating_mul(10));
        AptVersionCode(code)
    }
}

impl Display for AptVersion {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}.{}", self.major, self.minor)
    }
}

/// Comparison code of apt version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AptVersionCode(pub u32);

impl AptVersionCode {
    /// Check if apt honors per-repository `signed-by` references.
    pub fn supports_signed_by(&self) -> bool {
        self.0 >= SIGNED_BY_THRESHOLD
    }
}

impl Display for AptVersionCode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}", self.0)
    }
}

/// Query installed apt version.
///
/// # Errors
///
/// - Return [`AptError::Syscall`] if `apt-get -v` cannot be run.
/// - Return [`AptError::InvalidVersionFormat`] if its output is malformed.
#[instrument(skip(manager), level = "debug")]
pub fn detect_package_manager_version(manager: &dyn PackageManager) -> Result<AptVersion> {
    let version = AptVersion::parse(&manager.version_banner()?)?;
    info!("detected apt version as {version} (code {})", version.code());
    Ok(version)
}

/// Package manager error types.
#[derive(Debug, thiserror::Error)]
pub enum AptError {
    #[error(transparent)]
    Syscall(#[from] SyscallError),

    #[error("cannot determine apt version from {0:?}")]
    InvalidVersionFormat(String),
}

type Result<T, E = AptError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case("apt 2.6.1 (amd64)", 2, 6, 260; "modern")]
    #[test_case("apt 1.0.9.8.4 for amd64 compiled on Oct  2 2018", 1, 0, 100; "trusty era")]
    #[test_case("apt 1.1 (amd64)\nSupported modules:", 1, 1, 110; "threshold")]
    #[test_case("apt 0.9.7.9 for amd64", 0, 9, 90; "wheezy era")]
    #[test_case("apt 1.10.2", 1, 10, 1100; "two digit minor")]
    #[test]
    fn parse_version_banner(banner: &str, major: u32, minor: u32, code: u32) -> anyhow::Result<()> {
        let version = AptVersion::parse(banner)?;
        assert_eq!(version, AptVersion { major, minor });
        assert_eq!(version.code(), AptVersionCode(code));
        Ok(())
    }

    #[test_case(""; "empty")]
    #[test_case("apt"; "missing version")]
    #[test_case("apt x.y (amd64)"; "not numeric")]
    #[test_case("apt 2 (amd64)"; "missing minor")]
    #[test]
    fn reject_malformed_banner(banner: &str) {
        let result = AptVersion::parse(banner);
        assert!(matches!(result, Err(AptError::InvalidVersionFormat(_))));
    }

    #[test_case(95, false; "below threshold")]
    #[test_case(100, false; "apt 1.0")]
    #[test_case(110, true; "at threshold")]
    #[test_case(200, true; "above threshold")]
    #[test]
    fn signed_by_support(code: u32, expect: bool) {
        assert_eq!(AptVersionCode(code).supports_signed_by(), expect);
    }
}
