//! Unsigned-package staging (§4.J): a disk directory of bare `.squashfs`
//! files, watched for changes, that `Lookup(name)` consults before the
//! signed catalog — intended only for local development, never for a
//! production distribution root.
//!
//! Grounded in `original_source/apkgdb/unsigned.go`'s `initUnsigned`/
//! `unsignedScan`/`addUnsignedFile`/`removeUnsignedFile` (the
//! `fsnotify`-watched directory, the `category.package.core.1.2.3.
//! linux.amd64.squashfs` filename grammar parsed from the right: strip
//! `.squashfs`, then arch, then OS, leaving the package name) ported onto
//! the `notify` crate, and onto [`pkgd_fskit::InodeAllocator`] for the
//! inode-range registration the original leaves to its lazy-loading
//! `unsignedPkg.load`.

use std::collections::HashMap;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use pkgd_fskit::{InodeAllocator, PackageRange};
use pkgd_format::{Arch, Os};
use tokio::sync::mpsc;

use crate::error::RuntimeError;

struct LocalFile(std::fs::File);

impl pkgd_squash::ReadAt for LocalFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        self.0.read_at(buf, offset)
    }
}

/// One registered unsigned package: enough to answer `PackageRange` and
/// to hand a local file path to whatever opens the package's content.
struct UnsignedEntry {
    path: PathBuf,
    start_ino: u64,
    inode_count: u64,
    #[allow(dead_code)] // kept for symmetry with the original's unsignedPkg.{os,arch}; not yet consulted by lookup
    os: Os,
    #[allow(dead_code)]
    arch: Arch,
}

struct UnsignedPackageRange {
    name: String,
    pkg_hash: [u8; 32],
    start_ino: u64,
    inode_count: u64,
}

impl PackageRange for UnsignedPackageRange {
    fn pkg_hash(&self) -> [u8; 32] {
        self.pkg_hash
    }
    fn start_ino(&self) -> u64 {
        self.start_ino
    }
    fn inner_inodes(&self) -> u64 {
        self.inode_count
    }
    fn full_name(&self) -> &str {
        &self.name
    }
}

/// The "-load_unsigned" staging registry: a flat map of parsed package
/// name to on-disk `.squashfs` file, shared across every catalog and
/// sub-catalog (mirroring the original's single process-wide
/// `unsignedMap`), backed by the same inode allocator the signed catalog
/// tree uses so a resolved inode never collides with a signed one.
pub struct UnsignedStaging {
    dir: PathBuf,
    allocator: Arc<InodeAllocator>,
    entries: RwLock<HashMap<String, UnsignedEntry>>,
}

impl UnsignedStaging {
    /// Prepares (but does not yet scan) the staging directory `root/unsigned`.
    pub fn new(root: impl AsRef<Path>, allocator: Arc<InodeAllocator>) -> std::io::Result<Arc<Self>> {
        let dir = root.as_ref().join("unsigned");
        std::fs::create_dir_all(&dir)?;
        tracing::warn!(
            dir = %dir.display(),
            "unsigned package staging is ENABLED: packages placed here load with no signature check"
        );
        Ok(Arc::new(Self {
            dir,
            allocator,
            entries: RwLock::new(HashMap::new()),
        }))
    }

    pub fn staging_dir(&self) -> &Path {
        &self.dir
    }

    /// Performs the initial directory scan, then watches for further
    /// create/remove events until the returned task is dropped or the
    /// process exits. Mirrors `unsignedScan`'s "scan, then select loop".
    pub async fn run(self: Arc<Self>) -> Result<(), RuntimeError> {
        for file in std::fs::read_dir(&self.dir)?.flatten() {
            if file.file_type().map(|t| t.is_file()).unwrap_or(false) {
                self.add_file(&file.file_name().to_string_lossy());
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;
        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;

        while let Some(res) = rx.recv().await {
            match res {
                Ok(event) => self.handle_event(event),
                Err(err) => tracing::warn!(error = %err, "unsigned staging watcher error"),
            }
        }
        Ok(())
    }

    fn handle_event(&self, event: Event) {
        for path in &event.paths {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            match event.kind {
                EventKind::Create(_) => self.add_file(&name),
                EventKind::Remove(_) => self.remove_file(&name),
                _ => {}
            }
        }
    }

    /// Parses `category.package.core.1.2.3.linux.amd64.squashfs`, trailing
    /// arch then OS, leaving the package name; registers an inode range
    /// sized from the package's own SquashFS superblock.
    fn add_file(&self, filename: &str) {
        let Some(stem) = filename.strip_suffix(".squashfs") else {
            return;
        };

        let Some(arch_dot) = stem.rfind('.') else {
            tracing::warn!(file = filename, "skipping unsigned file: no dots");
            return;
        };
        let Some(arch) = Arch::parse(&stem[arch_dot + 1..]) else {
            tracing::warn!(file = filename, "skipping unsigned file: bad arch");
            return;
        };
        let rest = &stem[..arch_dot];

        let Some(os_dot) = rest.rfind('.') else {
            tracing::warn!(file = filename, "skipping unsigned file: no OS");
            return;
        };
        let Some(os) = Os::parse(&rest[os_dot + 1..]) else {
            tracing::warn!(file = filename, "skipping unsigned file: bad OS");
            return;
        };
        let name = rest[..os_dot].to_string();

        let path = self.dir.join(filename);
        match std::fs::metadata(&path) {
            Ok(m) if m.is_file() => {}
            _ => return,
        }

        let inode_count = match read_inode_count(&path) {
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(file = filename, error = %err, "skipping unsigned file: bad squashfs superblock");
                return;
            }
        };

        let pkg_hash = pseudo_hash(&name, os, arch);
        let name_for_range = name.clone();
        let start_ino = self.allocator.allocate_or_get(pkg_hash, inode_count, move |start_ino| {
            Arc::new(UnsignedPackageRange {
                name: name_for_range,
                pkg_hash,
                start_ino,
                inode_count,
            }) as Arc<dyn PackageRange>
        });

        tracing::info!(package = name, %os, %arch, "registered unsigned package");
        self.entries.write().insert(
            name,
            UnsignedEntry {
                path,
                start_ino,
                inode_count,
                os,
                arch,
            },
        );
    }

    /// The original deletes by raw filename even though it indexes by
    /// parsed package name, a known discrepancy in `removeUnsignedFile`
    /// (the map is never actually pruned unless the filename and the
    /// parsed name happen to match). This reimplementation re-parses the
    /// filename so removal always succeeds.
    fn remove_file(&self, filename: &str) {
        let Some(stem) = filename.strip_suffix(".squashfs") else {
            return;
        };
        let Some(arch_dot) = stem.rfind('.') else { return };
        let rest = &stem[..arch_dot];
        let Some(os_dot) = rest.rfind('.') else { return };
        let name = &rest[..os_dot];

        if self.entries.write().remove(name).is_some() {
            tracing::info!(package = name, "removed unsigned package");
        }
    }

    pub fn local_path(&self, name: &str) -> Option<PathBuf> {
        self.entries.read().get(name).map(|e| e.path.clone())
    }
}

impl pkgd_catalog::UnsignedLookup for UnsignedStaging {
    fn lookup_unsigned(&self, name: &str) -> Option<u64> {
        self.entries.read().get(name).map(|e| e.start_ino)
    }
}

fn read_inode_count(path: &Path) -> Result<u64, std::io::Error> {
    let file = LocalFile(std::fs::File::open(path)?);
    let sb = pkgd_squash::read_superblock(&file)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()))?;
    Ok(sb.inode_count as u64)
}

/// Unsigned packages have no catalog-recorded content hash to key the
/// allocator by, so this derives a stable stand-in from the parsed name
/// and (os, arch) — stable across rescans of the same file, and
/// disjoint from any real SHA-256 package hash with overwhelming
/// probability.
fn pseudo_hash(name: &str, os: Os, arch: Arch) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"unsigned\0");
    hasher.update(name.as_bytes());
    hasher.update([0u8, os as u8, arch as u8]);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixture_squashfs(dir: &Path, filename: &str, inode_count: u32) {
        let mut buf = [0u8; pkgd_squash::SUPERBLOCK_LEN];
        buf[0..4].copy_from_slice(b"hsqs");
        buf[4..8].copy_from_slice(&inode_count.to_le_bytes());
        std::fs::write(dir.join(filename), buf).unwrap();
    }

    #[tokio::test]
    async fn initial_scan_registers_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture_squashfs(dir.path(), "demo.widget.1.0.0.linux.amd64.squashfs", 5);

        let allocator = Arc::new(InodeAllocator::new());
        let staging = UnsignedStaging::new(dir.path(), allocator).unwrap();

        for file in std::fs::read_dir(staging.staging_dir()).unwrap().flatten() {
            staging.add_file(&file.file_name().to_string_lossy());
        }

        let ino = pkgd_catalog::UnsignedLookup::lookup_unsigned(&*staging, "demo.widget.1.0.0")
            .expect("registered");
        assert!(ino >= pkgd_fskit::FIRST_ASSIGNABLE_INO);
        assert!(staging.local_path("demo.widget.1.0.0").is_some());
    }

    #[tokio::test]
    async fn rejects_filenames_without_enough_dots() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = Arc::new(InodeAllocator::new());
        let staging = UnsignedStaging::new(dir.path(), allocator).unwrap();
        staging.add_file("nodots.squashfs");
        assert!(pkgd_catalog::UnsignedLookup::lookup_unsigned(&*staging, "nodots").is_none());
    }

    #[tokio::test]
    async fn remove_drops_a_previously_added_entry() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture_squashfs(dir.path(), "demo.widget.1.0.0.linux.amd64.squashfs", 5);
        let allocator = Arc::new(InodeAllocator::new());
        let staging = UnsignedStaging::new(dir.path(), allocator).unwrap();
        staging.add_file("demo.widget.1.0.0.linux.amd64.squashfs");
        assert!(staging.local_path("demo.widget.1.0.0").is_some());

        staging.remove_file("demo.widget.1.0.0.linux.amd64.squashfs");
        assert!(staging.local_path("demo.widget.1.0.0").is_none());
    }
}
