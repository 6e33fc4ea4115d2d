//! The `RootInode`/`Inode` contracts (§6) consumed by the out-of-scope
//! kernel filesystem adapter, and the `NotifyInode` notification interface
//! this workspace exposes back to it. Grounded in
//! `original_source/apkgfs/inode.go`'s `Inode`/`RootInode` interfaces and
//! `apkgdb/inode.go`'s per-catalog `StatFs`, expressed as plain Rust
//! traits (no C ABI boundary is implied — the consumer is another Rust
//! crate or process, not a C caller — unlike the teacher's `cdylib`-facing
//! `frankenlibc-abi` crate, which plays the analogous "stable extern
//! surface" role for a C caller).

use crate::error::PkgdError;

/// The file-type tag a kernel adapter needs to pick the right `st_mode`
/// bits. User/group-aware permissions are out of scope (§1 Non-goals); the
/// filesystem this contract describes is uniformly read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    Directory,
    File,
    Symlink,
}

/// Minimal attributes a kernel adapter needs to answer `getattr`/`lookup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttr {
    pub ino: u64,
    pub kind: InodeKind,
    pub size: u64,
    pub mtime_unix: i64,
}

/// One entry returned by `ReadDir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub ino: u64,
    pub kind: InodeKind,
}

/// Filesystem-wide usage statistics (`statfs(2)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

/// Operations common to every inode kind (directory, symlink, or a
/// delegate into an embedded package image).
pub trait Inode: Send + Sync {
    fn mode(&self) -> InodeKind;
    fn fill_attr(&self) -> FileAttr;

    /// Only meaningful for [`InodeKind::Symlink`] inodes.
    fn readlink(&self) -> Result<Vec<u8>, PkgdError>;

    /// Only meaningful for [`InodeKind::File`] inodes; `flags` carries the
    /// requested open mode, rejected outright for any write intent (§1
    /// Non-goals: writable filesystem semantics).
    fn open(&self, flags: u32) -> Result<(), PkgdError>;

    /// Only meaningful for [`InodeKind::File`] inodes.
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, PkgdError>;

    fn add_ref(&self, count: u64) -> u64;
    fn del_ref(&self, count: u64) -> u64;
}

/// The root of one catalog's inode tree: resolves names to inodes and
/// serves directory listings in addition to the plain [`Inode`]
/// operations the root directory itself supports.
pub trait RootInode: Inode {
    fn lookup(&self, parent_ino: u64, name: &str) -> Result<u64, PkgdError>;
    fn get_inode(&self, ino: u64) -> Result<std::sync::Arc<dyn Inode>, PkgdError>;
    fn read_dir(&self, ino: u64, offset: u64, plus: bool) -> Result<Vec<DirEntry>, PkgdError>;
    fn stat_fs(&self) -> StatFs;
}

/// Implemented by the external kernel filesystem adapter; the updater
/// (§4.I) calls this after a successful `index` so the adapter can
/// invalidate any kernel page-cache entries tied to an inode whose
/// contents changed.
pub trait KernelNotifier: Send + Sync {
    fn notify_inode(&self, ino: u64, offset: i64, data: &[u8]);
}

/// A `KernelNotifier` that does nothing; useful for tests and for running
/// the daemon without a live kernel adapter attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl KernelNotifier for NullNotifier {
    fn notify_inode(&self, _ino: u64, _offset: i64, _data: &[u8]) {}
}
