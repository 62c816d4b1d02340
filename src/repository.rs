// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository definition handling.
//!
//! A __repository definition__ is the apt source declaration that a
//! third-party vendor hands out for a given host identity. It is stored at
//! `/etc/apt/sources.list.d/<name>.list`, and always replaced in full so
//! repeated runs never stack duplicate source entries.

use crate::{
    config::RepositorySpec,
    host::HostIdentity,
    path::{SysRoot, SOURCES_LIST_DIR},
    transfer::{TransferClient, TransferOutcome},
};

use std::{
    fs::{remove_file, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

/// Path of repository declaration file for target repository.
pub fn definition_path(root: &SysRoot, name: &str) -> PathBuf {
    root.resolve(SOURCES_LIST_DIR).join(format!("{name}.list"))
}

/// Download repository definition for host into its declaration file.
///
/// Any previous declaration file is removed first. On failure no declaration
/// file is left behind.
///
/// # Errors
///
/// - Return [`RepositoryError::UnsupportedHostOrRepo`] if the remote rejects
///   the request, usually because it does not know the host identity.
/// - Return [`RepositoryError::TlsTrustFailure`] if TLS cannot be established.
/// - Return [`RepositoryError::TransferFailure`] for any other transfer
///   failure.
/// - Return [`RepositoryError::Write`] if the declaration file cannot be
///   replaced.
#[instrument(skip(root, repository, client), fields(repository = %repository.name), level = "debug")]
pub fn fetch_repository_definition(
    root: &SysRoot,
    repository: &RepositorySpec,
    host: &HostIdentity,
    client: &dyn TransferClient,
) -> Result<PathBuf> {
    let path = definition_path(root, &repository.name);
    let url = repository.definition_url_for(host);

    info!("installing {}", path.display());
    remove_if_exists(&path).map_err(|source| RepositoryError::Write {
        path: path.clone(),
        source,
    })?;

    let failure = match client.get(&url) {
        TransferOutcome::Success(body) => {
            if let Some(parent) = path.parent() {
                mkdirp::mkdirp(parent).map_err(|source| RepositoryError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            write(&path, body).map_err(|source| RepositoryError::Write {
                path: path.clone(),
                source,
            })?;
            return Ok(path);
        }
        TransferOutcome::HttpRejected => RepositoryError::UnsupportedHostOrRepo { url },
        TransferOutcome::TlsFailure => RepositoryError::TlsTrustFailure { url },
        TransferOutcome::OtherTransferError { code, detail } => {
            RepositoryError::TransferFailure { url, code, detail }
        }
    };

    // INVARIANT: No partial declaration file survives a failed transfer.
    remove_if_exists(&path).map_err(|source| RepositoryError::Write {
        path: path.clone(),
        source,
    })?;

    Err(failure)
}

/// Remove file, treating an already missing file as success.
pub(crate) fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match remove_file(path) {
        Ok(()) => {
            info!("removed existing {}", path.display());
            Ok(())
        }
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}

/// Repository definition error types.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error(
        "unable to download repository definition from: {url}\n\n\
         This usually happens if your operating system is not supported by the\n\
         repository provider, or aptstrap's OS detection failed.\n\n\
         You can override the OS detection by setting os= and dist= prior to running aptstrap.\n\
         For example, to force Ubuntu Jammy: os=ubuntu dist=jammy aptstrap repo"
    )]
    UnsupportedHostOrRepo { url: String },

    #[error(
        "curl is unable to connect over TLS when running:\n    curl {url}\n\n\
         This is usually due to one of two things:\n\n \
         1.) Missing CA root certificates (make sure the ca-certificates package is installed)\n \
         2.) An old version of libssl. Try upgrading libssl on your system to a more recent version"
    )]
    TlsTrustFailure { url: String },

    #[error(
        "unable to run:\n    curl {url}\n\n\
         curl exited with {code:?}: {detail}\n\n\
         Double check your curl installation and try again."
    )]
    TransferFailure {
        url: String,
        code: Option<i32>,
        detail: String,
    },

    #[error("failed to write {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

type Result<T, E = RepositoryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, fs::{create_dir_all, read_to_string}};
    use tempfile::TempDir;

    struct FakeClient {
        outcome: TransferOutcome,
        requests: RefCell<Vec<String>>,
    }

    impl FakeClient {
        fn new(outcome: TransferOutcome) -> Self {
            Self {
                outcome,
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl TransferClient for FakeClient {
        fn get(&self, url: &str) -> TransferOutcome {
            self.requests.borrow_mut().push(url.into());
            self.outcome.clone()
        }
    }

    fn editor() -> RepositorySpec {
        RepositorySpec {
            name: "editor".into(),
            definition_url: "https://blah.org/list?os={os}&dist={dist}".into(),
            key_url: "https://blah.org/key".into(),
            packages: vec![],
        }
    }

    fn stale_definition(root: &SysRoot) -> anyhow::Result<PathBuf> {
        let path = definition_path(root, "editor");
        create_dir_all(path.parent().unwrap())?;
        write(&path, "deb stale stale main\n")?;
        Ok(path)
    }

    #[test]
    fn successful_fetch_replaces_definition() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let root = SysRoot::new(temp.path());
        stale_definition(&root)?;
        let client = FakeClient::new(TransferOutcome::Success(b"deb fresh jammy main\n".to_vec()));

        let path = fetch_repository_definition(
            &root,
            &editor(),
            &HostIdentity::new("ubuntu", "jammy"),
            &client,
        )?;

        assert_eq!(read_to_string(path)?, "deb fresh jammy main\n");
        assert_eq!(
            client.requests.borrow().as_slice(),
            ["https://blah.org/list?os=ubuntu&dist=jammy"]
        );

        Ok(())
    }

    #[test]
    fn http_rejection_leaves_no_definition() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let root = SysRoot::new(temp.path());
        let path = stale_definition(&root)?;
        let client = FakeClient::new(TransferOutcome::HttpRejected);

        let result = fetch_repository_definition(
            &root,
            &editor(),
            &HostIdentity::new("plan9", "4e"),
            &client,
        );

        assert!(matches!(result, Err(RepositoryError::UnsupportedHostOrRepo { .. })));
        assert!(!path.exists());

        Ok(())
    }

    #[test]
    fn tls_failure_leaves_no_definition() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let root = SysRoot::new(temp.path());
        let client = FakeClient::new(TransferOutcome::TlsFailure);

        let error = fetch_repository_definition(
            &root,
            &editor(),
            &HostIdentity::new("debian", "bookworm"),
            &client,
        )
        .unwrap_err();

        assert!(matches!(error, RepositoryError::TlsTrustFailure { .. }));
        assert!(error.to_string().contains("ca-certificates"));
        assert!(!definition_path(&root, "editor").exists());

        Ok(())
    }

    #[test]
    fn other_failure_leaves_no_definition() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let root = SysRoot::new(temp.path());
        let path = stale_definition(&root)?;
        let client = FakeClient::new(TransferOutcome::OtherTransferError {
            code: Some(7),
            detail: "Failed to connect".into(),
        });

        let result = fetch_repository_definition(
            &root,
            &editor(),
            &HostIdentity::new("debian", "bookworm"),
            &client,
        );

        assert!(matches!(
            result,
            Err(RepositoryError::TransferFailure { code: Some(7), .. })
        ));
        assert!(!path.exists());

        Ok(())
    }

    #[test]
    fn preset_identity_is_templated_verbatim() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let root = SysRoot::new(temp.path());
        let client = FakeClient::new(TransferOutcome::Success(Vec::new()));

        fetch_repository_definition(
            &root,
            &editor(),
            &HostIdentity::new("Ubuntu", "Jammy"),
            &client,
        )?;

        assert_eq!(
            client.requests.borrow().as_slice(),
            ["https://blah.org/list?os=Ubuntu&dist=Jammy"]
        );

        Ok(())
    }
}
