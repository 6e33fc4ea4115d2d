//! Wires the library crates together into one running process: the root
//! catalog, its shared inode allocator, the package cache (keyed by
//! content hash, holding one-shot [`pkgd_loader::PackageLoader`]s rather
//! than fully-loaded packages so a cache hit before first access is still
//! cheap), the updater, and — if enabled — the unsigned-staging watcher.
//!
//! This struct is the boundary the out-of-scope kernel filesystem adapter
//! (§1) would call into: [`Daemon::resolve`] answers `Lookup`/`GetInode`,
//! [`Daemon::read_verified`] answers a delegate inode's `ReadAt`. Decoding
//! SquashFS directory/inode tables into file content remains the
//! adapter's job; this binary stops at handing it a verified byte range
//! plus the mounted [`pkgd_squash::Superblock`].

use std::path::PathBuf;
use std::sync::Arc;

use pkgd_cache::{PackageCache, SysinfoPressureSignal};
use pkgd_catalog::{Catalog, CatalogError};
use pkgd_fskit::{CancellationToken, InodeAllocator, KernelNotifier, ResolvedInode};
use pkgd_format::{Arch, Os};
use pkgd_loader::{LoadedPackage, LoaderError, PackageLoader};
use pkgd_runtime::{UnsignedStaging, Updater};

use crate::config::PkgdConfig;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error("package {0:x?} is not registered in the catalog")]
    UnknownPackage([u8; 32]),
}

impl From<DaemonError> for pkgd_fskit::PkgdError {
    fn from(err: DaemonError) -> Self {
        match err {
            DaemonError::Catalog(e) => e.into(),
            DaemonError::Loader(e) => e.into(),
            DaemonError::UnknownPackage(_) => pkgd_fskit::PkgdError::NotFound,
        }
    }
}

/// One running daemon instance: the root catalog tree plus everything
/// needed to materialise a package named inside it on demand.
pub struct Daemon {
    pub root: Arc<Catalog>,
    pub allocator: Arc<InodeAllocator>,
    storage_root: PathBuf,
    prefix: String,
    loaders: PackageCache<PackageLoader>,
    client: reqwest::Client,
    unsigned: Option<Arc<UnsignedStaging>>,
    /// §5: cancelled once, at shutdown, to unwind every background
    /// updater's `run` loop. Per-request cancellation (a single
    /// `read_verified` call, say) uses its own caller-supplied token
    /// instead of this one.
    shutdown: CancellationToken,
}

impl Daemon {
    /// Builds every component named in SPEC_FULL.md §0's crate table
    /// except the ones that run as independent background tasks (the
    /// updater, the cache sweeper, the unsigned-staging watcher) — those
    /// are spawned by [`crate::run`] once this constructor returns, since
    /// they borrow `Arc<Daemon>` pieces rather than living inside it.
    pub fn new(config: &PkgdConfig, client: reqwest::Client) -> Result<Arc<Self>, DaemonError> {
        let os = config.parsed_os_or_panic();
        let arch = config.parsed_arch_or_panic();

        let allocator = Arc::new(InodeAllocator::new());

        let unsigned = if config.unsigned_staging {
            Some(UnsignedStaging::new(&config.storage_root, allocator.clone()).map_err(
                |err| {
                    // Directory creation failures here are a startup-time
                    // configuration problem, not a per-request one; surface
                    // it as NotFound-adjacent rather than invent a new
                    // DaemonError variant for a condition the caller can't
                    // usefully retry from.
                    tracing::error!(error = %err, "failed to prepare unsigned staging directory");
                    CatalogError::Internal(err.to_string())
                },
            )?)
        } else {
            None
        };

        let unsigned_lookup = unsigned
            .clone()
            .map(|u| u as Arc<dyn pkgd_catalog::UnsignedLookup>);

        let root = Catalog::open_root(
            config.storage_root.clone(),
            config.name.clone(),
            os,
            arch,
            allocator.clone(),
            unsigned_lookup,
        )?;

        Ok(Arc::new(Self {
            root,
            allocator,
            storage_root: config.storage_root.clone(),
            prefix: config.repo_prefix.clone(),
            loaders: PackageCache::new(
                std::num::NonZeroUsize::new(config.cache_capacity.max(1)).unwrap(),
            ),
            client,
            unsigned,
            shutdown: CancellationToken::new(),
        }))
    }

    pub fn unsigned_staging(&self) -> Option<Arc<UnsignedStaging>> {
        self.unsigned.clone()
    }

    /// Fires this daemon's shutdown token, unwinding every background
    /// updater's `run` loop started through [`Daemon::spawn_updater`].
    /// In-flight per-request work is untouched — it carries its own token.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// `Lookup(name) → GetInode` composed into one call (§6): resolves a
    /// dotted name to whatever the inode allocator holds for it.
    pub fn resolve(self: &Arc<Self>, name: &str) -> Result<ResolvedInode, DaemonError> {
        let ino = self.root.lookup(name)?;
        Ok(self.allocator.resolve(ino)?)
    }

    /// Builds a trusted database table for a catalog's updater. Only the
    /// compiled-in trusted keys are ever honoured (§4.A); this is not an
    /// injection point for arbitrary keys.
    pub fn db_trust(&self) -> pkgd_crypto::TrustTable {
        pkgd_crypto::compiled_db_trust().clone()
    }

    /// Spawns an [`Updater`] task for `catalog` against this daemon's HTTP
    /// client and repo prefix. Called once for the root catalog at
    /// startup and again, on demand, for every sub-catalog a cross-arch
    /// lookup materialises (§4.H/§4.I).
    pub fn spawn_updater(self: &Arc<Self>, catalog: Arc<Catalog>, notifier: Arc<dyn KernelNotifier>) {
        let updater = Updater::new(
            catalog,
            self.client.clone(),
            self.prefix.clone(),
            self.db_trust(),
            notifier,
            self.shutdown.clone(),
        );
        tokio::spawn(async move { updater.run().await });
    }

    /// Returns the loaded, verified, SquashFS-mounted package for
    /// `pkg_hash`, triggering the one-shot remote fetch+verify on first
    /// reference (§4.G) and reusing the cached loader on every subsequent
    /// call until it's evicted by the package-cache sweep (§4.F).
    ///
    /// §5: `cancel` is the token carried by the kernel request this call
    /// answers; if it fires before the fetch completes, this returns a
    /// retryable error without having mutated the package cache or the
    /// catalog.
    pub async fn get_or_load_package(
        self: &Arc<Self>,
        pkg_hash: [u8; 32],
        cancel: &CancellationToken,
    ) -> Result<Arc<LoadedPackage>, DaemonError> {
        if let Some(loader) = self.loaders.get(&pkg_hash) {
            return Ok(loader.get_or_init(cancel).await?);
        }

        let entry = self
            .root
            .entry_by_hash(&pkg_hash)?
            .ok_or(DaemonError::UnknownPackage(pkg_hash))?;

        let local_path = self
            .storage_root
            .join(self.root.name())
            .join(&entry.repo_path);

        let loader = Arc::new(PackageLoader::new(
            self.client.clone(),
            &self.prefix,
            self.root.name(),
            &entry.repo_path,
            local_path,
            entry.pkg_hash,
            entry.size,
        ));
        self.loaders.insert(pkg_hash, loader.clone());
        Ok(loader.get_or_init(cancel).await?)
    }

    /// Answers a delegate inode's `ReadAt` (§6): loads the owning package
    /// if needed, then serves a block-hash-verified read from its
    /// payload at `offset`. `cancel` is the same per-request token
    /// [`Daemon::get_or_load_package`] races its fetch against.
    pub async fn read_verified(
        self: &Arc<Self>,
        pkg_hash: [u8; 32],
        offset: u64,
        len: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, DaemonError> {
        let loaded = self.get_or_load_package(pkg_hash, cancel).await?;
        Ok(loaded.read_verified(offset, len)?)
    }

    pub fn package_cache_len(&self) -> usize {
        self.loaders.len()
    }

    pub fn spawn_cache_sweeper(self: &Arc<Self>) {
        // `loaders` lives on `Daemon` itself, not behind its own `Arc`, so
        // the sweeper borrows the whole daemon rather than just the cache
        // — still a single background task per process, matching §4.F's
        // "one sweeper" design.
        let daemon = self.clone();
        let pressure: Arc<dyn pkgd_cache::MemoryPressureSignal> =
            Arc::new(SysinfoPressureSignal::new());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pkgd_cache::SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                let (ttl_evicted, pressure_evicted) =
                    daemon.loaders.sweep_once(pressure.as_ref(), pkgd_cache::TTL);
                if ttl_evicted > 0 || pressure_evicted > 0 {
                    tracing::info!(ttl_evicted, pressure_evicted, "package loader cache sweep");
                }
            }
        });
    }
}

impl PkgdConfig {
    fn parsed_os_or_panic(&self) -> Os {
        // Validated once at startup in `main` before any `Daemon` is
        // constructed; reaching this with an invalid value would be a
        // programming error in `main`, not a runtime condition callers
        // should handle.
        self.parsed_os().expect("PkgdConfig::os validated before Daemon::new")
    }

    fn parsed_arch_or_panic(&self) -> Arch {
        self.parsed_arch().expect("PkgdConfig::arch validated before Daemon::new")
    }
}
