//! The global inode-space allocator and resolver (§4.E): a single
//! monotonic counter shared by a catalog and every sub-catalog it spawns,
//! a `pkg_hash -> start_ino` map making allocation idempotent per package,
//! and a `start_ino`-ordered set enabling predecessor search for
//! `GetInode`. Grounded in the `BTreeMap::range(..=x).next_back()`
//! idiom as the Rust analogue of `llrb.Tree::DescendLessOrEqual`
//! (`original_source/apkgdb/lookup.go`'s `GetInode`), the same structural
//! role `examples/j-martina-viletech/crates/vfs`'s `VirtualFs` plays for
//! its own slot-keyed lookup.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::error::PkgdError;

/// Inode `1`: the catalog root directory.
pub const ROOT_INO: u64 = 1;
/// Inode `2`: the synthesised `ld.so.cache` file.
pub const LDSO_INO: u64 = 2;
/// Inodes `3..999` are reserved and never assigned.
pub const FIRST_ASSIGNABLE_INO: u64 = 1000;

/// One package's contribution to the flat inode namespace: its identity,
/// its allocated start inode, how many inner inodes its embedded image
/// translates verbatim, and the name its symlink anchor resolves to.
///
/// Object-safe so the allocator can hold a `dyn PackageRange` without
/// depending on whatever crate owns the concrete cached-package type
/// (`pkgd-catalog`/`pkgd-loader`, which sit above this crate).
pub trait PackageRange: Send + Sync {
    fn pkg_hash(&self) -> [u8; 32];
    fn start_ino(&self) -> u64;
    /// Inner inode count `N`; the range spans `[start_ino, start_ino + N + 1)`.
    fn inner_inodes(&self) -> u64;
    fn full_name(&self) -> &str;
}

/// What `InodeAllocator::resolve` found for a requested inode number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedInode {
    /// Inode 1: the catalog root directory.
    Root,
    /// Inode 2: the synthesised `ld.so.cache` file.
    LdSoCache,
    /// `start_ino` of some package's range: a virtual symlink whose
    /// `readlink` target is the package's full dotted name.
    Symlink { target: String },
    /// An inode inside some package's range, translated to that package's
    /// own (embedded SquashFS) inode numbering. Decoding the inode's
    /// content is the external kernel adapter's job (§1); this only
    /// identifies which package and which inner inode number own it.
    PackageDelegate { owner_hash: [u8; 32], image_ino: u64 },
}

/// Shared, read-mostly allocator for one catalog tree (a root catalog and
/// every sub-catalog it spawns via §4.H all allocate from the same
/// instance, via a back-reference).
pub struct InodeAllocator {
    next: AtomicU64,
    pkg_ino: Mutex<HashMap<[u8; 32], u64>>,
    live: RwLock<BTreeMap<u64, Arc<dyn PackageRange>>>,
}

impl Default for InodeAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(FIRST_ASSIGNABLE_INO),
            pkg_ino: Mutex::new(HashMap::new()),
            live: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the existing start inode for `pkg_hash`, or allocates a
    /// fresh `inner_inodes + 1`-sized range and registers the range
    /// returned by `make_range`. At-most-once per `pkg_hash`, per the
    /// "allocation is idempotent per package-hash" invariant (§3).
    pub fn allocate_or_get(
        &self,
        pkg_hash: [u8; 32],
        inner_inodes: u64,
        make_range: impl FnOnce(u64) -> Arc<dyn PackageRange>,
    ) -> u64 {
        let mut pkg_ino = self.pkg_ino.lock();
        if let Some(&start) = pkg_ino.get(&pkg_hash) {
            return start;
        }

        let start = self.next.fetch_add(inner_inodes + 1, Ordering::SeqCst);
        let range = make_range(start);
        pkg_ino.insert(pkg_hash, start);
        // Drop the short pkg_ino critical section before taking `live`,
        // matching the lock-ordering discipline of §5 (pkg-ino map, then
        // the live-range set, each held only for a short section).
        drop(pkg_ino);

        self.live.write().insert(start, range);
        start
    }

    /// Resolves `req_ino` to its owning object. Reserved inodes `3..999`
    /// with no package range registered there are `NotFound`, matching the
    /// spec's reservation table.
    pub fn resolve(&self, req_ino: u64) -> Result<ResolvedInode, PkgdError> {
        if req_ino == ROOT_INO {
            return Ok(ResolvedInode::Root);
        }
        if req_ino == LDSO_INO {
            return Ok(ResolvedInode::LdSoCache);
        }
        if req_ino < FIRST_ASSIGNABLE_INO {
            return Err(PkgdError::NotFound);
        }

        let live = self.live.read();
        let (&start, range) = live
            .range(..=req_ino)
            .next_back()
            .ok_or(PkgdError::NotFound)?;

        if req_ino >= start + range.inner_inodes() + 1 {
            return Err(PkgdError::NotFound);
        }

        if req_ino == start {
            return Ok(ResolvedInode::Symlink {
                target: range.full_name().to_string(),
            });
        }

        Ok(ResolvedInode::PackageDelegate {
            owner_hash: range.pkg_hash(),
            image_ino: req_ino - start,
        })
    }

    /// The start inode already assigned to `pkg_hash`, if any, without
    /// allocating a new one.
    pub fn start_ino_for(&self, pkg_hash: &[u8; 32]) -> Option<u64> {
        self.pkg_ino.lock().get(pkg_hash).copied()
    }

    /// Number of package ranges currently live. Exposed for `StatFs`-style
    /// reporting and tests.
    pub fn live_range_count(&self) -> usize {
        self.live.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRange {
        pkg_hash: [u8; 32],
        start_ino: u64,
        inner_inodes: u64,
        full_name: String,
    }

    impl PackageRange for FakeRange {
        fn pkg_hash(&self) -> [u8; 32] {
            self.pkg_hash
        }
        fn start_ino(&self) -> u64 {
            self.start_ino
        }
        fn inner_inodes(&self) -> u64 {
            self.inner_inodes
        }
        fn full_name(&self) -> &str {
            &self.full_name
        }
    }

    fn alloc_fixture(alloc: &InodeAllocator, hash: u8, inner_inodes: u64, name: &str) -> u64 {
        let pkg_hash = [hash; 32];
        let name = name.to_string();
        alloc.allocate_or_get(pkg_hash, inner_inodes, move |start_ino| {
            Arc::new(FakeRange {
                pkg_hash,
                start_ino,
                inner_inodes,
                full_name: name,
            })
        })
    }

    #[test]
    fn root_and_ldso_are_reserved() {
        let alloc = InodeAllocator::new();
        assert_eq!(alloc.resolve(ROOT_INO).unwrap(), ResolvedInode::Root);
        assert_eq!(alloc.resolve(LDSO_INO).unwrap(), ResolvedInode::LdSoCache);
    }

    #[test]
    fn reserved_gap_is_not_found() {
        let alloc = InodeAllocator::new();
        assert!(matches!(alloc.resolve(500), Err(PkgdError::NotFound)));
    }

    #[test]
    fn allocation_is_idempotent_per_hash() {
        let alloc = InodeAllocator::new();
        let a = alloc_fixture(&alloc, 1, 4, "a.b.c.1.0.0.linux.amd64");
        let b = alloc_fixture(&alloc, 1, 4, "a.b.c.1.0.0.linux.amd64");
        assert_eq!(a, b);
        assert_eq!(alloc.live_range_count(), 1);
    }

    #[test]
    fn symlink_is_the_range_start_and_delegate_covers_inner_span() {
        let alloc = InodeAllocator::new();
        let start = alloc_fixture(&alloc, 7, 3, "x.y.z.1.0.0.linux.amd64");

        assert_eq!(
            alloc.resolve(start).unwrap(),
            ResolvedInode::Symlink {
                target: "x.y.z.1.0.0.linux.amd64".to_string()
            }
        );

        for inner in 1..=3u64 {
            assert_eq!(
                alloc.resolve(start + inner).unwrap(),
                ResolvedInode::PackageDelegate {
                    owner_hash: [7; 32],
                    image_ino: inner,
                }
            );
        }

        assert!(matches!(
            alloc.resolve(start + 4),
            Err(PkgdError::NotFound)
        ));
    }

    #[test]
    fn two_packages_get_disjoint_ranges() {
        let alloc = InodeAllocator::new();
        let start_a = alloc_fixture(&alloc, 1, 5, "a.1.0.0.linux.amd64");
        let start_b = alloc_fixture(&alloc, 2, 2, "b.1.0.0.linux.amd64");

        assert_ne!(start_a, start_b);
        let (lo, hi) = if start_a < start_b {
            (start_a, start_b)
        } else {
            (start_b, start_a)
        };
        let lo_inner = if lo == start_a { 5 } else { 2 };
        assert!(hi >= lo + lo_inner + 1);
    }
}
