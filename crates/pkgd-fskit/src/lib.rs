//! Inode-space allocation, resolution, and the `RootInode`/`Inode`
//! contracts the out-of-scope kernel filesystem adapter consumes (§6, §4.E).
//!
//! Lock ordering (§5), for crates building on top of this one: sub-catalog
//! map, then catalog store mode, then this crate's inode-next/pkg-ino
//! state, then the package cache, then a per-package loader guard. No long
//! I/O (HTTP fetch, disk read, SHA-256, embedded-KV transaction) may be
//! performed while holding any of these.

mod allocator;
mod cancel;
mod error;
mod traits;

pub use allocator::{
    FIRST_ASSIGNABLE_INO, InodeAllocator, LDSO_INO, PackageRange, ROOT_INO, ResolvedInode,
};
pub use cancel::{Cancelled, CancellationToken, cancelable};
pub use error::PkgdError;
pub use traits::{DirEntry, FileAttr, Inode, InodeKind, KernelNotifier, NullNotifier, RootInode, StatFs};
