//! The catalog itself (§4.D data model) plus the sub-catalog manager
//! (§4.H) and the `Lookup(name)` rule table (§4.E), wired together: a
//! catalog owns one [`CatalogStore`] and shares one
//! [`pkgd_fskit::InodeAllocator`] with every sub-catalog it spawns.
//! Grounded in `original_source/apkgdb/db.go` (`DB` struct field layout),
//! `apkgdb/sub.go` (`SubGet`/`ListSubs` double-checked locking), and
//! `apkgdb/lookup.go` (`Lookup`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use pkgd_fskit::{InodeAllocator, PackageRange};
use pkgd_format::{Arch, Os};

use crate::error::CatalogError;
use crate::store::{CatalogEntry, CatalogStore};

/// Hook into the unsigned-staging registry (§4.J), implemented by
/// `pkgd-runtime`. Checked first by `Lookup(name)`, per the rule table's
/// step 1; kept as a trait here so this crate never depends on the
/// runtime crate that sits above it in the dependency chain.
pub trait UnsignedLookup: Send + Sync {
    fn lookup_unsigned(&self, name: &str) -> Option<u64>;
}

struct CatalogPackageRange {
    entry: CatalogEntry,
    start_ino: u64,
}

impl PackageRange for CatalogPackageRange {
    fn pkg_hash(&self) -> [u8; 32] {
        self.entry.pkg_hash
    }
    fn start_ino(&self) -> u64 {
        self.start_ino
    }
    fn inner_inodes(&self) -> u64 {
        self.entry.inode_count as u64
    }
    fn full_name(&self) -> &str {
        &self.entry.full_name
    }
}

/// One (name, OS, arch) catalog: its persistent store, its share of the
/// process-wide inode allocator, and its spawned sub-catalogs.
pub struct Catalog {
    storage_root: PathBuf,
    name: String,
    os: Os,
    arch: Arch,
    store: CatalogStore,
    allocator: Arc<InodeAllocator>,
    sub: RwLock<HashMap<(Os, Arch), Arc<Catalog>>>,
    parent: Option<Weak<Catalog>>,
    unsigned: Option<Arc<dyn UnsignedLookup>>,
}

impl Catalog {
    /// Opens (creating if absent) the root catalog for the host's own
    /// (OS, arch). `allocator` is taken by reference rather than created
    /// here so an unsigned-staging watcher (§4.J) constructed before the
    /// catalog can allocate from the very same inode space.
    pub fn open_root(
        storage_root: impl Into<PathBuf>,
        name: impl Into<String>,
        os: Os,
        arch: Arch,
        allocator: Arc<InodeAllocator>,
        unsigned: Option<Arc<dyn UnsignedLookup>>,
    ) -> Result<Arc<Self>, CatalogError> {
        let storage_root = storage_root.into();
        let name = name.into();
        let dir = store_dir(&storage_root, &name, os, arch);
        let store = CatalogStore::open(&dir)?;
        Ok(Arc::new(Self {
            storage_root,
            name,
            os,
            arch,
            store,
            allocator,
            sub: RwLock::new(HashMap::new()),
            parent: None,
            unsigned,
        }))
    }

    fn open_child(
        parent: &Arc<Catalog>,
        os: Os,
        arch: Arch,
    ) -> Result<Arc<Self>, CatalogError> {
        let dir = store_dir(&parent.storage_root, &parent.name, os, arch);
        let store = CatalogStore::open(&dir)?;
        Ok(Arc::new(Self {
            storage_root: parent.storage_root.clone(),
            name: parent.name.clone(),
            os,
            arch,
            store,
            allocator: parent.allocator.clone(),
            sub: RwLock::new(HashMap::new()),
            parent: Some(Arc::downgrade(parent)),
            unsigned: parent.unsigned.clone(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn os(&self) -> Os {
        self.os
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn allocator(&self) -> &Arc<InodeAllocator> {
        &self.allocator
    }

    pub fn parent(&self) -> Option<Arc<Catalog>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn current_version(&self) -> Option<String> {
        self.store.current_version()
    }

    pub fn index(&self, raw: &[u8], trust: &pkgd_crypto::TrustTable) -> Result<String, CatalogError> {
        self.store.index(&self.name, raw, trust)
    }

    pub fn remove_package(&self, full_name: &str) -> Result<(), CatalogError> {
        self.store.remove_package(full_name)
    }

    pub fn header_blob(&self, pkg_hash: &[u8; 32]) -> Result<Option<Vec<u8>>, CatalogError> {
        self.store.header_blob(pkg_hash)
    }

    pub fn signature_blob(&self, pkg_hash: &[u8; 32]) -> Result<Option<Vec<u8>>, CatalogError> {
        self.store.signature_blob(pkg_hash)
    }

    pub fn meta_blob(&self, pkg_hash: &[u8; 32]) -> Result<Option<Vec<u8>>, CatalogError> {
        self.store.meta_blob(pkg_hash)
    }

    pub fn list_ldso_entries(&self) -> Result<Vec<(String, Vec<u8>)>, CatalogError> {
        self.store.list_ldso_entries()
    }

    /// Reverse lookup from a package hash back to its [`CatalogEntry`],
    /// for resolving a [`pkgd_fskit::ResolvedInode::PackageDelegate`]
    /// back into something the package loader can fetch.
    pub fn entry_by_hash(&self, pkg_hash: &[u8; 32]) -> Result<Option<CatalogEntry>, CatalogError> {
        self.store.entry_by_hash(pkg_hash)
    }

    /// Returns the current catalog if `(os, arch)` matches it, otherwise a
    /// previously-materialised or freshly-constructed sub-catalog sharing
    /// this catalog's inode allocator (§4.H).
    pub fn sub_get(self: &Arc<Self>, os: Os, arch: Arch) -> Result<Arc<Catalog>, CatalogError> {
        if os == self.os && arch == self.arch {
            return Ok(self.clone());
        }

        if let Some(existing) = self.sub.read().get(&(os, arch)) {
            return Ok(existing.clone());
        }

        let mut sub = self.sub.write();
        if let Some(existing) = sub.get(&(os, arch)) {
            return Ok(existing.clone());
        }

        let child = Catalog::open_child(self, os, arch)?;
        sub.insert((os, arch), child.clone());
        Ok(child)
    }

    pub fn list_subs(&self) -> Vec<(Os, Arch)> {
        self.sub.read().keys().copied().collect()
    }

    /// Every indexed package's full name paired with its symlink-anchor
    /// inode, allocating a range for any entry not yet looked up — directory
    /// listing (§6 `ReadDir`) observes the same "allocate on lookup" rule
    /// ordinary `Lookup(name)` calls do, per the `p2p`-only Open Question
    /// resolution (no inode is ever persisted ahead of first reference).
    pub fn list_packages(&self) -> Result<Vec<(String, u64)>, CatalogError> {
        self.store
            .list_entries()?
            .into_iter()
            .map(|entry| {
                let full_name = entry.full_name.clone();
                let start_ino = self.register(entry);
                Ok((full_name, start_ino))
            })
            .collect()
    }

    /// `Lookup(name)` (§4.E): dispatches cross-arch names to the matching
    /// sub-catalog, then resolves within a single catalog.
    pub fn lookup(self: &Arc<Self>, name: &str) -> Result<u64, CatalogError> {
        if !name.contains('.') {
            return Err(CatalogError::NoDotInName);
        }

        if let Some((os, arch)) = trailing_os_arch(name) {
            if os != self.os || arch != self.arch {
                let sub = self.sub_get(os, arch)?;
                return sub.lookup_local(name);
            }
        }

        self.lookup_local(name)
    }

    /// The rule table minus cross-arch dispatch: unsigned-staging check,
    /// exact `p2p` hit, predecessor prefix match, not-found.
    fn lookup_local(&self, name: &str) -> Result<u64, CatalogError> {
        if let Some(unsigned) = &self.unsigned {
            if let Some(ino) = unsigned.lookup_unsigned(name) {
                return Ok(ino);
            }
        }

        if let Some(entry) = self.store.exact(name)? {
            let start_ino = self.register(entry);
            return Ok(start_ino + 1);
        }

        if let Some(entry) = self.store.prefix_match(name)? {
            let start_ino = self.register(entry);
            return Ok(start_ino);
        }

        Err(CatalogError::NotFound(name.to_string()))
    }

    fn register(&self, entry: CatalogEntry) -> u64 {
        let inner = entry.inode_count as u64;
        let pkg_hash = entry.pkg_hash;
        self.allocator.allocate_or_get(pkg_hash, inner, move |start_ino| {
            Arc::new(CatalogPackageRange { entry, start_ino }) as Arc<dyn PackageRange>
        })
    }
}

fn store_dir(storage_root: &Path, name: &str, os: Os, arch: Arch) -> PathBuf {
    storage_root.join(format!("{name}.{os}.{arch}.db"))
}

fn trailing_os_arch(name: &str) -> Option<(Os, Arch)> {
    let mut parts = name.rsplit('.');
    let arch = Arch::parse(parts.next()?)?;
    let os = Os::parse(parts.next()?)?;
    Some((os, arch))
}
