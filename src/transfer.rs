// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! HTTPS transfers.
//!
//! Downloads go through the [`TransferClient`] trait, which reports a typed
//! [`TransferOutcome`] instead of raw exit codes. The [`Curl`] client runs
//! `curl` and classifies its exit status:
//!
//! | exit code | outcome |
//! |---|---|
//! | 0 | [`TransferOutcome::Success`] |
//! | 22 | [`TransferOutcome::HttpRejected`] |
//! | 35, 60 | [`TransferOutcome::TlsFailure`] |
//! | anything else | [`TransferOutcome::OtherTransferError`] |

use crate::syscall::syscall_output;

use indicatif::{ProgressBar, ProgressStyle};
use std::{path::PathBuf, time::Duration};
use tracing::{debug, instrument};

/// Curl exit code for HTTP responses with status 400 or above.
pub const CURL_HTTP_ERROR: i32 = 22;

/// Curl exit code for SSL connect errors.
pub const CURL_SSL_CONNECT_ERROR: i32 = 35;

/// Curl exit code for peer certificates that cannot be authenticated.
pub const CURL_PEER_FAILED_VERIFICATION: i32 = 60;

/// Result of a single HTTPS GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Response body of successful request.
    Success(Vec<u8>),

    /// Remote answered with an HTTP error status.
    HttpRejected,

    /// TLS handshake or certificate verification failed.
    TlsFailure,

    /// Transfer failed for any other reason.
    OtherTransferError {
        code: Option<i32>,
        detail: String,
    },
}

impl TransferOutcome {
    /// Classify curl exit status.
    ///
    /// A missing exit code means curl was killed by a signal.
    pub fn from_curl_exit(code: Option<i32>, body: Vec<u8>, detail: impl Into<String>) -> Self {
        match code {
            Some(0) => Self::Success(body),
            Some(CURL_HTTP_ERROR) => Self::HttpRejected,
            Some(CURL_SSL_CONNECT_ERROR | CURL_PEER_FAILED_VERIFICATION) => Self::TlsFailure,
            code => Self::OtherTransferError {
                code,
                detail: detail.into(),
            },
        }
    }
}

/// Layer of indirection for HTTPS downloads.
pub trait TransferClient {
    /// Perform HTTPS GET on target URL.
    fn get(&self, url: &str) -> TransferOutcome;
}

/// HTTPS downloads through `curl`.
#[derive(Debug, Clone)]
pub struct Curl {
    program: PathBuf,
}

impl Curl {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("curl"),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Curl {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferClient for Curl {
    #[instrument(skip(self), level = "debug")]
    fn get(&self, url: &str) -> TransferOutcome {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
            bar.set_style(style);
        }
        bar.set_message(url.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        let output = syscall_output(&self.program, ["-fsSL", url], NO_ENV);
        bar.finish_and_clear();

        match output {
            Ok(output) => {
                let detail = String::from_utf8_lossy(output.stderr.as_slice())
                    .trim_end()
                    .to_string();
                debug!("curl exited with {:?}", output.status.code());
                TransferOutcome::from_curl_exit(output.status.code(), output.stdout, detail)
            }
            Err(error) => TransferOutcome::OtherTransferError {
                code: None,
                detail: error.to_string(),
            },
        }
    }
}

const NO_ENV: [(&str, &str); 0] = [];
