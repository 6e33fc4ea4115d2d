//! Updater/unsigned-staging failure taxonomy (§7), joining
//! [`pkgd_catalog::CatalogError`] at the boundary where this crate's
//! background tasks hand results back to the rest of the daemon.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("fetching the LATEST pointer failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("LATEST fetch returned status {0}")]
    BadStatus(reqwest::StatusCode),
    #[error("neither LATEST.jwt nor LATEST.txt could be retrieved")]
    NoLatestPointer,
    #[error("LATEST.jwt failed verification: {0}")]
    Jwt(#[from] pkgd_format::DatabaseError),
    #[error(transparent)]
    Catalog(#[from] pkgd_catalog::CatalogError),
    #[error("local temp file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsigned-staging watcher failed: {0}")]
    Watcher(#[from] notify::Error),
    /// §5: the updater's cancellation token fired mid-fetch, before
    /// `Catalog::index` was ever reached.
    #[error(transparent)]
    Cancelled(#[from] pkgd_fskit::Cancelled),
}

impl RuntimeError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RuntimeError::Fetch(_)
                | RuntimeError::BadStatus(_)
                | RuntimeError::NoLatestPointer
                | RuntimeError::Cancelled(_)
        )
    }
}

impl From<RuntimeError> for pkgd_fskit::PkgdError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Fetch(_) | RuntimeError::BadStatus(_) | RuntimeError::NoLatestPointer => {
                pkgd_fskit::PkgdError::TransientNetwork(err.to_string())
            }
            RuntimeError::Jwt(_) => pkgd_fskit::PkgdError::SignatureInvalid(err.to_string()),
            RuntimeError::Catalog(e) => e.into(),
            RuntimeError::Io(_) | RuntimeError::Watcher(_) => {
                pkgd_fskit::PkgdError::Internal(err.to_string())
            }
            RuntimeError::Cancelled(e) => e.into(),
        }
    }
}
