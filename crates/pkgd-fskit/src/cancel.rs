//! The cancellation primitive §5 requires of every long-running async
//! operation: "all long-running operations carry a cancellation token
//! from the kernel request; if the token signals, the operation returns a
//! retryable error without mutating catalog state." Shared here, rather
//! than duplicated in `pkgd-loader` and `pkgd-runtime`, since both already
//! depend on this crate for [`crate::PkgdError`].

use std::future::Future;

use thiserror::Error;
pub use tokio_util::sync::CancellationToken;

/// Raised when `cancel` fires before the operation it guards completes.
/// Always retryable (§5): callers must only wrap the pre-commit portion
/// of an operation (a network fetch, not the local write that follows),
/// so a `Cancelled` never leaves partial state behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Races `fut` against `cancel`, returning [`Cancelled`] if the token
/// fires first. `fut` is dropped mid-flight on cancellation.
pub async fn cancelable<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, Cancelled> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        out = fut => Ok(out),
    }
}
