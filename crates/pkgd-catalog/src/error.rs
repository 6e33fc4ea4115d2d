//! Catalog-scoped error taxonomy (§7), convertible into the top-level
//! [`pkgd_fskit::PkgdError`] at the boundary where this crate's callers
//! join the rest of the daemon's error handling.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog storage error: {0}")]
    Store(#[from] sled::Error),
    #[error("malformed database file: {0}")]
    Database(#[from] pkgd_format::DatabaseError),
    #[error("signature verification failed: {0}")]
    Signature(#[from] pkgd_crypto::VerifyError),
    #[error("downloaded database is for {got}, expected {expected}")]
    NameMismatch { expected: String, got: String },
    #[error("name has no dot, rejected early")]
    NoDotInName,
    #[error("package {0} not found in catalog")]
    NotFound(String),
    #[error("foreign (os, arch) suffix names an unrecognized combination")]
    UnrecognizedOsArch,
    #[error("catalog entry is corrupt: {0}")]
    CorruptEntry(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CatalogError> for pkgd_fskit::PkgdError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(_) | CatalogError::NoDotInName => {
                pkgd_fskit::PkgdError::NotFound
            }
            CatalogError::UnrecognizedOsArch => {
                pkgd_fskit::PkgdError::InvalidArgument("unrecognized os/arch suffix".into())
            }
            CatalogError::NameMismatch { .. } | CatalogError::Database(_) => {
                pkgd_fskit::PkgdError::IntegrityFailure(err.to_string())
            }
            CatalogError::Signature(_) => pkgd_fskit::PkgdError::SignatureInvalid(err.to_string()),
            CatalogError::Store(_) | CatalogError::CorruptEntry(_) | CatalogError::Internal(_) => {
                pkgd_fskit::PkgdError::Internal(err.to_string())
            }
        }
    }
}
