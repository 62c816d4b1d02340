// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External command invocation.
//!
//! Everything aptstrap does to a system eventually goes through some external
//! tool, e.g., apt-get, curl, or gpg. These helpers run those tools without
//! any user interaction, and turn unsuccessful exits into errors.

use std::{
    ffi::OsStr,
    io::Write,
    process::{Command, Output, Stdio},
    thread,
};
use tracing::debug;

/// Run command and collect its standard output and error together.
///
/// # Errors
///
/// - Return [`SyscallError::Spawn`] if command cannot be executed.
/// - Return [`SyscallError::Failed`] if command exits unsuccessfully.
pub(crate) fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    envs: impl IntoIterator<Item = (impl AsRef<OsStr>, impl AsRef<OsStr>)>,
) -> Result<String> {
    let output = syscall_output(cmd.as_ref(), args, envs)?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    let message = message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message);

    if !output.status.success() {
        return Err(SyscallError::Failed {
            cmd: cmd.as_ref().to_string_lossy().into_owned(),
            code: output.status.code(),
            message,
        });
    }

    Ok(message)
}

/// Run command and hand back its raw output regardless of exit status.
///
/// # Errors
///
/// - Return [`SyscallError::Spawn`] if command cannot be executed.
pub(crate) fn syscall_output(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    envs: impl IntoIterator<Item = (impl AsRef<OsStr>, impl AsRef<OsStr>)>,
) -> Result<Output> {
    let mut command = Command::new(cmd.as_ref());
    command.args(args).envs(envs).stdin(Stdio::null());
    debug!("run {command:?}");

    command.output().map_err(|source| SyscallError::Spawn {
        cmd: cmd.as_ref().to_string_lossy().into_owned(),
        source,
    })
}

/// Feed bytes through command's standard input, and collect standard output.
///
/// # Errors
///
/// - Return [`SyscallError::Spawn`] if command cannot be executed, or its
///   standard input cannot be written.
/// - Return [`SyscallError::Failed`] if command exits unsuccessfully.
pub(crate) fn syscall_piped(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    input: &[u8],
) -> Result<Vec<u8>> {
    let name = cmd.as_ref().to_string_lossy().into_owned();
    let spawn_error = |source| SyscallError::Spawn {
        cmd: name.clone(),
        source,
    };

    let mut command = Command::new(cmd.as_ref());
    command
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    debug!("run {command:?}");

    let mut child = command.spawn().map_err(spawn_error)?;
    let stdin = child.stdin.take();

    // INVARIANT: Feed stdin while stdout is drained, or a full pipe blocks both sides.
    let (written, output) = thread::scope(|scope| {
        let writer = scope.spawn(move || match stdin {
            // Dropping stdin afterwards closes it, so the child sees EOF.
            Some(mut stdin) => stdin.write_all(input),
            None => Ok(()),
        });
        let output = child.wait_with_output();
        (writer.join(), output)
    });
    let output = output.map_err(spawn_error)?;

    if !output.status.success() {
        return Err(SyscallError::Failed {
            cmd: name.clone(),
            code: output.status.code(),
            message: String::from_utf8_lossy(output.stderr.as_slice())
                .trim_end()
                .to_string(),
        });
    }

    if let Ok(Err(source)) = written {
        return Err(spawn_error(source));
    }

    Ok(output.stdout)
}

#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    #[error("failed to run {cmd:?}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command {cmd:?} failed with exit code {code:?}:\n{message}")]
    Failed {
        cmd: String,
        code: Option<i32>,
        message: String,
    },
}

type Result<T, E = SyscallError> = std::result::Result<T, E>;
