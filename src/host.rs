// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host operating system detection.
//!
//! Third-party repositories hand out a repository definition tailored to the
//! operating system and distribution codename of the host, e.g.,
//! `ubuntu/jammy` or `debian/bookworm`. Aptstrap figures out this
//! __host identity__ through an ordered cascade of [`HostDetector`]s. The
//! first detector to come up with a non-empty distribution codename wins.
//!
//! # Overriding Detection
//!
//! Detection can be skipped entirely by supplying both the `os` and `dist`
//! values up front. Pre-set values are used verbatim, no normalization is
//! applied to them.

use crate::{
    path::{SysRoot, DEBIAN_VERSION, ISSUE, LSB_RELEASE},
    syscall::syscall_non_interactive,
};

use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::PathBuf,
};
use tracing::{debug, info, instrument};

/// Operating system and distribution codename of host.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub os: String,
    pub dist: String,
}

impl HostIdentity {
    /// Construct new host identity from values as given.
    pub fn new(os: impl Into<String>, dist: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            dist: dist.into(),
        }
    }

    /// Construct new host identity from detected values.
    ///
    /// Lower-cases the operating system name, and strips all whitespace from
    /// both fields.
    pub fn normalized(os: impl AsRef<str>, dist: impl AsRef<str>) -> Self {
        Self {
            os: strip_whitespace(os.as_ref()).to_lowercase(),
            dist: strip_whitespace(dist.as_ref()),
        }
    }
}

impl Display for HostIdentity {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}/{}", self.os, self.dist)
    }
}

/// Caller supplied host identity values.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PresetIdentity {
    pub os: Option<String>,
    pub dist: Option<String>,
}

impl PresetIdentity {
    pub fn new(os: Option<String>, dist: Option<String>) -> Self {
        // INVARIANT: Empty values count as unset.
        Self {
            os: os.filter(|os| !os.is_empty()),
            dist: dist.filter(|dist| !dist.is_empty()),
        }
    }

    /// Host identity if both values were supplied.
    pub fn complete(&self) -> Option<HostIdentity> {
        match (&self.os, &self.dist) {
            (Some(os), Some(dist)) => Some(HostIdentity::new(os, dist)),
            _ => None,
        }
    }
}

/// Single source of host identity information.
pub trait HostDetector {
    /// Short name of detector for logging.
    fn name(&self) -> &str;

    /// Try to determine host identity.
    ///
    /// Return [`None`] if the source this detector consults is unavailable.
    fn attempt_detect(&self) -> Option<HostIdentity>;
}

/// Detect host identity through `/etc/lsb-release`.
///
/// Raspbian does not list a codename here, so its codename is taken from the
/// major version number in `/etc/debian_version` instead.
#[derive(Debug, Clone)]
pub struct LsbReleaseFile {
    root: SysRoot,
}

impl LsbReleaseFile {
    pub fn new(root: SysRoot) -> Self {
        Self { root }
    }
}

impl HostDetector for LsbReleaseFile {
    fn name(&self) -> &str {
        "lsb-release file"
    }

    fn attempt_detect(&self) -> Option<HostIdentity> {
        let data = read_to_string(self.root.resolve(LSB_RELEASE)).ok()?;
        let fields = parse_shell_assignments(&data);
        let field = |key: &str| fields.get(key).map(String::as_str).unwrap_or_default();

        if field("ID") == "raspbian" {
            let version = read_to_string(self.root.resolve(DEBIAN_VERSION)).ok()?;
            let major = version.trim().split('.').next().unwrap_or_default();
            return Some(HostIdentity::new("raspbian", major));
        }

        let dist = match field("DISTRIB_CODENAME") {
            "" => field("DISTRIB_RELEASE"),
            codename => codename,
        };

        Some(HostIdentity::new(field("DISTRIB_ID"), dist))
    }
}

/// Detect host identity through `lsb_release` command.
#[derive(Debug, Clone)]
pub struct LsbReleaseCommand {
    program: Option<PathBuf>,
}

impl LsbReleaseCommand {
    /// Construct new detector using `lsb_release` from search path.
    pub fn new() -> Self {
        Self {
            program: which::which("lsb_release").ok(),
        }
    }

    /// Construct new detector using target program.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    fn query(&self, flag: &str) -> Option<String> {
        let program = self.program.as_ref()?;
        let output = syscall_non_interactive(program, [flag], NO_ENV).ok()?;
        let output = output.strip_prefix("stdout: ").unwrap_or(&output);
        parse_lsb_release_field(output)
    }
}

impl Default for LsbReleaseCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl HostDetector for LsbReleaseCommand {
    fn name(&self) -> &str {
        "lsb_release command"
    }

    fn attempt_detect(&self) -> Option<HostIdentity> {
        let dist = self.query("-c")?;
        let os = self.query("-i")?;
        Some(HostIdentity::new(os, dist))
    }
}

/// Detect host identity through `/etc/debian_version` and `/etc/issue`.
///
/// Some Debian releases store a codename pair like "bookworm/sid" in the
/// version file, while others store a version number like "6.0.7".
#[derive(Debug, Clone)]
pub struct DebianVersionFile {
    root: SysRoot,
}

impl DebianVersionFile {
    pub fn new(root: SysRoot) -> Self {
        Self { root }
    }
}

impl HostDetector for DebianVersionFile {
    fn name(&self) -> &str {
        "debian_version file"
    }

    fn attempt_detect(&self) -> Option<HostIdentity> {
        let version = read_to_string(self.root.resolve(DEBIAN_VERSION)).ok()?;
        let version = version.trim();
        let dist = match version.split_once('/') {
            Some((codename, _)) => codename,
            None => version.split('.').next().unwrap_or_default(),
        };

        let issue = read_to_string(self.root.resolve(ISSUE)).unwrap_or_default();
        let os = issue
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().next())
            .unwrap_or_default();

        Some(HostIdentity::new(os, dist))
    }
}

/// Standard detection cascade for target system root.
pub fn default_detectors(root: &SysRoot) -> Vec<Box<dyn HostDetector>> {
    vec![
        Box::new(LsbReleaseFile::new(root.clone())),
        Box::new(LsbReleaseCommand::new()),
        Box::new(DebianVersionFile::new(root.clone())),
    ]
}

/// Determine host identity.
///
/// A complete preset is returned as is. Otherwise every detector is tried in
/// order, and the first one that yields a non-empty codename wins. If only one
/// of the preset values was supplied, it replaces the detected value.
///
/// # Errors
///
/// - Return [`HostError::Unsupported`] if no detector yields a codename.
#[instrument(skip(preset, detectors), level = "debug")]
pub fn detect_host_identity(
    preset: &PresetIdentity,
    detectors: &[Box<dyn HostDetector>],
) -> Result<HostIdentity> {
    if let Some(host) = preset.complete() {
        info!("using preset operating system {host}");
        return Ok(host);
    }

    let mut detected = None;
    for detector in detectors {
        debug!("attempt detection through {}", detector.name());
        let Some(found) = detector.attempt_detect() else {
            continue;
        };

        let found = HostIdentity::normalized(found.os, found.dist);
        if found.dist.is_empty() {
            debug!("{} yielded no distribution codename", detector.name());
            continue;
        }

        detected = Some(found);
        break;
    }

    let mut host = detected.ok_or(HostError::Unsupported)?;
    if let Some(os) = &preset.os {
        host.os = os.clone();
    }
    if let Some(dist) = &preset.dist {
        host.dist = dist.clone();
    }

    info!("detected operating system as {host}");

    Ok(host)
}

fn parse_shell_assignments(data: &str) -> HashMap<String, String> {
    data.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|value| value.strip_suffix('"'))
                .unwrap_or(value);
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

fn parse_lsb_release_field(output: &str) -> Option<String> {
    output
        .lines()
        .next()
        .and_then(|line| line.split('\t').nth(1))
        .map(ToString::to_string)
}

fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}

const NO_ENV: [(&str, &str); 0] = [];

/// Host detection error types.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error(
        "unfortunately, your operating system distribution and version could not be detected\n\n\
         You can override the OS detection by setting os= and dist= prior to running aptstrap.\n\n\
         For example, to force Ubuntu Jammy: os=ubuntu dist=jammy aptstrap repo"
    )]
    Unsupported,
}

type Result<T, E = HostError> = std::result::Result<T, E>;
