//! The per-package one-shot loader (§4.G): first access downloads and
//! verifies the package header and signature, fetches and verifies the
//! block hash table, and mounts the embedded SquashFS superblock. A
//! failed attempt clears the handle and re-arms after 10 seconds.
//!
//! Grounded in `original_source/apkgdb/package.go`'s `handleLookup`
//! (`p.dl.Do(p.doDl)`) and `doDl`/`validate` (header re-fetch + hash
//! check, 128-byte signature read at `signature_offset`, `offset`/
//! `blockSize` populated from the header, `squashfs.New` mount on
//! success) and `p.dl = sync.Once{}` reset after a 10-second sleep on
//! failure — the async analogue is a `tokio::sync::OnceCell` behind an
//! indirection that gets replaced wholesale once the cooldown elapses.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pkgd_fskit::{CancellationToken, cancelable};
use pkgd_format::{PackageError, PackageHeader};
use pkgd_squash::{OffsetReader, ReadAt, Superblock};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use crate::error::LoaderError;
use crate::ranged_file::{dist_url, RangedHttpFile};

/// §5: "10 second loader re-arm after failure".
pub const REARM_DELAY: Duration = Duration::from_secs(10);

/// The signature region read at `signature_offset`, mirroring the
/// original's 128-byte read (a little more than `pkgd_crypto::SIGNATURE_SIZE`
/// to tolerate trailing padding before `data_offset`).
const SIGNATURE_READ_LEN: usize = 128;

/// A package whose remote header and signature have been verified, with
/// its block hash table loaded and its SquashFS superblock mounted.
pub struct LoadedPackage {
    pub header: PackageHeader,
    pub signer_name: &'static str,
    pub superblock: Superblock,
    pub block_table: Mutex<pkgd_format::BlockTable>,
    pub image: OffsetReader<Arc<RangedHttpFile>>,
    file: Arc<RangedHttpFile>,
    package_size: u64,
}

impl LoadedPackage {
    /// Reads `len` bytes at payload-relative `offset`, verifying every
    /// full block touched against the package's hash table before
    /// returning the requested slice. A block already verified in this
    /// package's lifetime is not re-hashed (§4.G "Block-verified reads").
    pub fn read_verified(&self, offset: u64, len: usize) -> Result<Vec<u8>, LoaderError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let block_size = self.header.block_size as u64;
        let first_block = offset / block_size;
        let last_byte = offset + len as u64 - 1;
        let last_block = last_byte / block_size;

        let mut out = Vec::with_capacity(len);
        for block_index in first_block..=last_block {
            let block_start = block_index * block_size;
            let block_len = block_size.min(self.package_size.saturating_sub(block_start)) as usize;
            let mut block = vec![0u8; block_len];
            self.file
                .read_at(&mut block, self.header.data_offset as u64 + block_start)?;

            let already_validated = {
                let table = self.block_table.lock();
                table.is_validated(block_index as u32)
            };
            if !already_validated {
                self.block_table
                    .lock()
                    .verify_block(block_index as u32, &block)?;
            }

            let slice_start = offset.max(block_start) - block_start;
            let slice_end = (offset + len as u64).min(block_start + block_len as u64) - block_start;
            out.extend_from_slice(&block[slice_start as usize..slice_end as usize]);
        }
        Ok(out)
    }
}

struct Cell {
    once: Arc<OnceCell<Arc<LoadedPackage>>>,
    failed_at: Option<Instant>,
}

/// One-shot loader for a single catalog-registered package.
pub struct PackageLoader {
    client: reqwest::Client,
    url: String,
    local_path: PathBuf,
    recorded_header_hash: [u8; 32],
    package_size: u64,
    cell: Mutex<Cell>,
}

impl PackageLoader {
    pub fn new(
        client: reqwest::Client,
        prefix: &str,
        catalog_name: &str,
        repo_path: &str,
        local_path: PathBuf,
        recorded_header_hash: [u8; 32],
        package_size: u64,
    ) -> Self {
        Self {
            client,
            url: dist_url(prefix, catalog_name, repo_path),
            local_path,
            recorded_header_hash,
            package_size,
            cell: Mutex::new(Cell {
                once: Arc::new(OnceCell::new()),
                failed_at: None,
            }),
        }
    }

    /// Returns the loaded, verified, mounted package, triggering the
    /// one-shot initialisation at most once per (re-armed) attempt.
    ///
    /// §5: races the whole fetch-and-verify sequence against `cancel`. A
    /// cancellation never corrupts the shared one-shot guard — it only
    /// means *this* caller stops waiting; an initialisation already in
    /// flight from another caller runs to completion and is cached
    /// normally for whoever asks next.
    pub async fn get_or_init(&self, cancel: &CancellationToken) -> Result<Arc<LoadedPackage>, LoaderError> {
        let once = {
            let mut cell = self.cell.lock();
            if let Some(failed_at) = cell.failed_at {
                if failed_at.elapsed() < REARM_DELAY {
                    return Err(LoaderError::Io(std::io::Error::new(
                        std::io::ErrorKind::WouldBlock,
                        "loader is cooling down after a failed initialisation",
                    )));
                }
                cell.once = Arc::new(OnceCell::new());
                cell.failed_at = None;
            }
            cell.once.clone()
        };

        match cancelable(cancel, once.get_or_try_init(|| self.init(cancel))).await {
            Ok(Ok(loaded)) => Ok(loaded.clone()),
            Ok(Err(err)) => {
                self.cell.lock().failed_at = Some(Instant::now());
                Err(err)
            }
            Err(cancelled) => Err(cancelled.into()),
        }
    }

    async fn init(&self, cancel: &CancellationToken) -> Result<Arc<LoadedPackage>, LoaderError> {
        let file = Arc::new(RangedHttpFile::open(
            self.client.clone(),
            self.url.clone(),
            &self.local_path,
        )?);

        let mut header_bytes = [0u8; pkgd_format::PACKAGE_HEADER_LEN];
        file.ensure_covered(0, pkgd_format::PACKAGE_HEADER_LEN as u64, cancel).await?;
        file.read_at(&mut header_bytes, 0)?;

        let actual_hash: [u8; 32] = Sha256::digest(header_bytes).into();
        if actual_hash != self.recorded_header_hash {
            return Err(LoaderError::HeaderHashMismatch);
        }

        let header = PackageHeader::parse(&header_bytes)?;

        let mut sig_bytes = vec![0u8; SIGNATURE_READ_LEN];
        file.ensure_covered(header.signature_offset as u64, SIGNATURE_READ_LEN as u64, cancel)
            .await?;
        file.read_at(&mut sig_bytes, header.signature_offset as u64)?;
        let signer = pkgd_crypto::verify_pkg(&header_bytes, &sig_bytes)
            .map_err(PackageError::from)?;
        tracing::debug!(signer = signer.name, "verified package signature");

        let mut hashtable_bytes = vec![0u8; header.hashtable_len as usize];
        file.ensure_covered(header.hashtable_offset as u64, header.hashtable_len as u64, cancel)
            .await?;
        file.read_at(&mut hashtable_bytes, header.hashtable_offset as u64)?;
        pkgd_format::verify_hashtable_bytes(&header, &hashtable_bytes)?;
        let block_table = pkgd_format::BlockTable::parse(&hashtable_bytes);

        let image = OffsetReader::new(file.clone(), header.data_offset as u64);
        let superblock = pkgd_squash::read_superblock(&image)?;

        Ok(Arc::new(LoadedPackage {
            header,
            signer_name: signer.name,
            superblock,
            block_table: Mutex::new(block_table),
            image,
            file,
            package_size: self.package_size,
        }))
    }
}
