// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Debian desktop provisioning.
//!
//! Aptstrap sets up a fresh Debian-family machine from a __provision plan__:
//! it points apt at the configured distribution channel, installs packages,
//! registers third-party apt repositories together with their signing keys,
//! writes dotfiles, and registers network mounts.
//!
//! The heart of aptstrap is the repository [`bootstrap`]. It detects the host
//! operating system, makes sure curl and gpg are available, fetches the
//! repository definition tailored to the host, and installs the signing key
//! wherever the installed apt release expects it.

pub mod apt;
pub mod bootstrap;
pub mod config;
pub mod host;
pub mod keyring;
pub mod path;
pub mod prereq;
pub mod provision;
pub mod repository;
pub mod transfer;

mod syscall;

pub use syscall::SyscallError;
