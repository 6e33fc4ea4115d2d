//! The top-level error taxonomy (§7), shared by every crate above
//! `pkgd-fskit` in the dependency chain. Each variant carries a
//! [`PkgdError::kernel_errno`] mapping so the taxonomy is machine-checkable
//! instead of only documented in prose.

use thiserror::Error;

// Linux POSIX errno values. Kept as local constants rather than a `libc`
// dependency: the kernel adapter that actually surfaces these to the
// kernel is out of scope for this workspace, so no FFI boundary needs the
// crate's definitions to match a particular libc build.
const ENOENT: i32 = 2;
const EPERM: i32 = 1;
const EIO: i32 = 5;
const EINTR: i32 = 4;
const EAGAIN: i32 = 11;
const EINVAL: i32 = 22;
const EROFS: i32 = 30;

#[derive(Debug, Error)]
pub enum PkgdError {
    /// Lookup of an unknown name, or an inode outside any allocated range.
    #[error("not found")]
    NotFound,
    /// Wrong magic, unsupported version, or a non-regular-file operation
    /// attempted on an inode that doesn't support it.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A write was attempted against the read-only filesystem.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// A block hash, metadata hash, or hash-table hash mismatch. Terminal
    /// for the specific package: it is evicted and a retry window starts.
    #[error("integrity failure: {0}")]
    IntegrityFailure(String),
    /// A bad Ed25519 signature, an untrusted key, or a malformed signature
    /// blob. Terminal for the specific object; it is never materialised.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),
    /// A failed or partial HTTP fetch. Retryable by the caller (the
    /// updater waits for its next tick, the loader re-arms after 10s).
    #[error("transient network error: {0}")]
    TransientNetwork(String),
    /// A locking or consistency violation that must never happen.
    #[error("internal error: {0}")]
    Internal(String),
    /// §5: the operation's cancellation token fired before it completed.
    /// Nothing it touched was mutated, so the caller may retry freely.
    #[error(transparent)]
    Cancelled(#[from] crate::Cancelled),
}

impl PkgdError {
    /// The POSIX errno a kernel filesystem adapter should surface for this
    /// error, per the §7 error taxonomy table.
    pub fn kernel_errno(&self) -> i32 {
        match self {
            Self::NotFound => ENOENT,
            Self::InvalidArgument(_) => EINVAL,
            Self::PermissionDenied(_) => EROFS,
            Self::IntegrityFailure(_) => EIO,
            Self::SignatureInvalid(_) => EIO,
            Self::TransientNetwork(_) => EAGAIN,
            Self::Internal(_) => EIO,
            Self::Cancelled(_) => EINTR,
        }
    }

    /// `true` for errors a caller may usefully retry (transient network
    /// failures, and a cancelled operation — it never mutated anything);
    /// `false` for errors terminal to the object involved.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_) | Self::Cancelled(_))
    }
}
