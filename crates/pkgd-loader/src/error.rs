//! Loader failure taxonomy (§4.G: "If any step fails, the handle is
//! cleared, the one-shot guard is rearmed after 10 seconds").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("ranged fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("ranged fetch returned status {0}")]
    BadStatus(reqwest::StatusCode),
    #[error("local cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("remote header does not match the catalog-recorded hash")]
    HeaderHashMismatch,
    #[error(transparent)]
    Package(#[from] pkgd_format::PackageError),
    #[error(transparent)]
    Superblock(#[from] pkgd_squash::SuperblockError),
    #[error(transparent)]
    SuperblockRead(#[from] pkgd_squash::SuperblockReadError),
    /// §5: the caller's cancellation token fired before the fetch
    /// completed; nothing was mutated, so it is always retryable.
    #[error(transparent)]
    Cancelled(#[from] pkgd_fskit::Cancelled),
}

impl LoaderError {
    /// §5 Propagation policy: transient I/O is retried (10s re-arm), a
    /// cancelled fetch is retryable immediately since it never committed
    /// anything; cryptographic/format failures are terminal for this
    /// package until the remote object itself changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LoaderError::Fetch(_)
                | LoaderError::BadStatus(_)
                | LoaderError::Io(_)
                | LoaderError::Cancelled(_)
        )
    }
}

impl From<LoaderError> for pkgd_fskit::PkgdError {
    fn from(err: LoaderError) -> Self {
        match err {
            LoaderError::Fetch(_) | LoaderError::BadStatus(_) | LoaderError::Io(_) => {
                pkgd_fskit::PkgdError::TransientNetwork(err.to_string())
            }
            LoaderError::HeaderHashMismatch => {
                pkgd_fskit::PkgdError::IntegrityFailure(err.to_string())
            }
            LoaderError::Package(pkgd_format::PackageError::Signature(_)) => {
                pkgd_fskit::PkgdError::SignatureInvalid(err.to_string())
            }
            LoaderError::Package(_) => pkgd_fskit::PkgdError::IntegrityFailure(err.to_string()),
            LoaderError::Superblock(_) | LoaderError::SuperblockRead(_) => {
                pkgd_fskit::PkgdError::IntegrityFailure(err.to_string())
            }
            LoaderError::Cancelled(e) => e.into(),
        }
    }
}
