//! The persistent catalog store (§4.D): a `sled`-backed embedded KV
//! database whose named `Tree`s mirror the bucket table exactly, built
//! over `pkgd_format::database` parsing/verification. Grounded in
//! `original_source/apkgdb/index.go` and `apkgdb/db.go`, adapted to the
//! `p2p`-only bucket layout (the `i2p`/`p2i` split the original also
//! carries is superseded).

use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use parking_lot::Mutex;
use sled::Tree;

use pkgd_format::{DatabaseHeader, collated, data_section_start, parse_entries, verify_section};

use crate::error::CatalogError;

const TREE_INFO: &str = "info";
const TREE_P2P: &str = "p2p";
const TREE_PKG: &str = "pkg";
const TREE_HEADER: &str = "header";
const TREE_SIG: &str = "sig";
const TREE_META: &str = "meta";
const TREE_PATH: &str = "path";
const TREE_LDSO: &str = "ldso";

const KEY_VERSION: &[u8] = b"version";

const PKG_TAG_PACKAGE: u8 = 0x00;

/// A catalog entry as recovered from the `pkg`/`path` trees: everything
/// the loader (§4.G) and the inode resolver (§4.E) need about one package,
/// without the raw header/signature/metadata blobs (those are fetched
/// separately, on demand, since most lookups never need them).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub pkg_hash: [u8; 32],
    pub size: u64,
    pub inode_count: u32,
    pub full_name: String,
    pub repo_path: String,
}

/// The catalog store: eight named trees inside one `sled::Db`, plus a
/// write-serialization mutex standing in for the original's
/// write-start/write-end exclusive-reopen pair (see DESIGN.md).
pub struct CatalogStore {
    info: Tree,
    p2p: Tree,
    pkg: Tree,
    header: Tree,
    sig: Tree,
    meta: Tree,
    path: Tree,
    ldso: Tree,
    write_lock: Mutex<()>,
}

impl CatalogStore {
    pub fn open(dir: &Path) -> Result<Self, CatalogError> {
        let db = sled::open(dir)?;
        Ok(Self {
            info: db.open_tree(TREE_INFO)?,
            p2p: db.open_tree(TREE_P2P)?,
            pkg: db.open_tree(TREE_PKG)?,
            header: db.open_tree(TREE_HEADER)?,
            sig: db.open_tree(TREE_SIG)?,
            meta: db.open_tree(TREE_META)?,
            path: db.open_tree(TREE_PATH)?,
            ldso: db.open_tree(TREE_LDSO)?,
            write_lock: Mutex::new(()),
        })
    }

    /// The stamp of the currently indexed catalog, if any `index` call has
    /// ever succeeded.
    pub fn current_version(&self) -> Option<String> {
        let raw = self.info.get(KEY_VERSION).ok().flatten()?;
        String::from_utf8(raw.to_vec()).ok()
    }

    /// Ingests a freshly downloaded, fully-verified database file: checks
    /// the header magic/version, the claimed `name`, the signature over
    /// the header, and the data section's recorded hash, then populates
    /// every bucket, skipping any `pkg_hash` already present. Returns the
    /// new version stamp.
    pub fn index(
        &self,
        expected_name: &str,
        raw: &[u8],
        trust: &pkgd_crypto::TrustTable,
    ) -> Result<String, CatalogError> {
        let _guard = self.write_lock.lock();

        if raw.len() < pkgd_format::DATABASE_HEADER_LEN {
            return Err(CatalogError::CorruptEntry("database file shorter than its header"));
        }
        let header_bytes = &raw[..pkgd_format::DATABASE_HEADER_LEN];
        let header = DatabaseHeader::parse(header_bytes)?;

        let got_name = header.name_str()?;
        if got_name != expected_name {
            return Err(CatalogError::NameMismatch {
                expected: expected_name.to_string(),
                got: got_name.to_string(),
            });
        }

        let sig_start = pkgd_format::DATABASE_HEADER_LEN;
        let sig_end = data_section_start();
        let sig_blob = raw
            .get(sig_start..sig_end)
            .ok_or(CatalogError::CorruptEntry("truncated signature region"))?;
        pkgd_crypto::verify_with_trust(header_bytes, sig_blob, trust)?;

        let data_start = header.data_offset as usize;
        let data_end = data_start + header.data_len as usize;
        let data_buf = raw
            .get(data_start..data_end)
            .ok_or(CatalogError::CorruptEntry("data section out of range"))?;
        verify_section(header.data_len, &header.data_sha256, data_buf)?;

        let entries = parse_entries(data_buf)?;

        for entry in &entries {
            if self.pkg.contains_key(entry.pkg_hash)? {
                continue;
            }
            self.insert_entry(entry)?;
        }

        let stamp = pkgd_format::version_stamp(header.created_secs);
        self.info.insert(KEY_VERSION, stamp.as_bytes())?;
        self.info.flush()?;

        Ok(stamp)
    }

    fn insert_entry(&self, entry: &pkgd_format::DatabaseEntry) -> Result<(), CatalogError> {
        let p2p_key = collated(&entry.full_name);
        let mut p2p_value = Vec::with_capacity(32 + 8 + entry.full_name.len());
        p2p_value.extend_from_slice(&entry.pkg_hash);
        p2p_value.extend_from_slice(&(entry.inode_count as u64).to_be_bytes());
        p2p_value.extend_from_slice(entry.full_name.as_bytes());
        self.p2p.insert(p2p_key, p2p_value)?;

        let mut pkg_value = Vec::with_capacity(1 + 8 + 8 + 8 + entry.full_name.len());
        pkg_value.push(PKG_TAG_PACKAGE);
        pkg_value.extend_from_slice(&entry.size.to_be_bytes());
        pkg_value.extend_from_slice(&[0u8; 8]);
        pkg_value.extend_from_slice(&(entry.inode_count as u64).to_be_bytes());
        pkg_value.extend_from_slice(entry.full_name.as_bytes());
        self.pkg.insert(entry.pkg_hash, pkg_value)?;

        self.header.insert(entry.pkg_hash, entry.header.clone())?;
        self.sig.insert(entry.pkg_hash, entry.signature.clone())?;
        self.meta.insert(entry.pkg_hash, entry.meta.clone())?;
        self.path
            .insert(entry.pkg_hash, entry.repo_path.as_bytes())?;

        Ok(())
    }

    /// Deletes only the `p2p` entry for `full_name`; the other buckets'
    /// stale data is reclaimed by the next full ingest (§4.D "Remove").
    pub fn remove_package(&self, full_name: &str) -> Result<(), CatalogError> {
        let _guard = self.write_lock.lock();
        self.p2p.remove(collated(full_name))?;
        Ok(())
    }

    /// Exact `p2p` hit: decodes the stored value into a [`CatalogEntry`].
    pub fn exact(&self, full_name: &str) -> Result<Option<CatalogEntry>, CatalogError> {
        let Some(raw) = self.p2p.get(collated(full_name))? else {
            return Ok(None);
        };
        let (pkg_hash, inode_count, stored_name) = decode_p2p_value(&raw)?;
        self.entry_for(pkg_hash, inode_count, stored_name)
    }

    /// Predecessor seek for the version-collated prefix-match rule: finds
    /// the highest-versioned stored name `<=` `collated(name) ‖ 0xFF`
    /// whose name has `name + "."` as a prefix.
    pub fn prefix_match(&self, name: &str) -> Result<Option<CatalogEntry>, CatalogError> {
        let mut probe = collated(name);
        probe.push(0xFF);

        let Some((_, raw)) = self.p2p.range(..=probe).next_back().transpose()? else {
            return Ok(None);
        };
        let (pkg_hash, inode_count, stored_name) = decode_p2p_value(&raw)?;

        let wanted_prefix = format!("{name}.");
        if !stored_name.starts_with(&wanted_prefix) {
            return Ok(None);
        }

        self.entry_for(pkg_hash, inode_count, stored_name)
    }

    /// Every package currently indexed, in `p2p`'s version-collated key
    /// order, for directory-listing the catalog root (§6 `ReadDir`).
    pub fn list_entries(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        let mut out = Vec::new();
        for row in self.p2p.iter() {
            let (_, raw) = row?;
            let (pkg_hash, inode_count, full_name) = decode_p2p_value(&raw)?;
            if let Some(entry) = self.entry_for(pkg_hash, inode_count, full_name)? {
                out.push(entry);
            }
        }
        Ok(out)
    }

    fn entry_for(
        &self,
        pkg_hash: [u8; 32],
        inode_count: u32,
        full_name: String,
    ) -> Result<Option<CatalogEntry>, CatalogError> {
        let Some(pkg_raw) = self.pkg.get(pkg_hash)? else {
            return Ok(None);
        };
        let size = decode_pkg_size(&pkg_raw)?;
        let repo_path = self
            .path
            .get(pkg_hash)?
            .map(|v| String::from_utf8_lossy(&v).into_owned())
            .unwrap_or_default();

        Ok(Some(CatalogEntry {
            pkg_hash,
            size,
            inode_count,
            full_name,
            repo_path,
        }))
    }

    /// Reverse lookup by package hash, for callers (the package loader's
    /// wiring) that only have the hash an already-allocated inode range
    /// was registered under. The `pkg` tree's value already carries
    /// `inode_count` and `full_name`, so this needs no `p2p` scan.
    pub fn entry_by_hash(&self, pkg_hash: &[u8; 32]) -> Result<Option<CatalogEntry>, CatalogError> {
        let Some(raw) = self.pkg.get(pkg_hash)? else {
            return Ok(None);
        };
        let (size, inode_count, full_name) = decode_pkg_entry(&raw)?;
        let repo_path = self
            .path
            .get(pkg_hash)?
            .map(|v| String::from_utf8_lossy(&v).into_owned())
            .unwrap_or_default();

        Ok(Some(CatalogEntry {
            pkg_hash: *pkg_hash,
            size,
            inode_count,
            full_name,
            repo_path,
        }))
    }

    pub fn header_blob(&self, pkg_hash: &[u8; 32]) -> Result<Option<Vec<u8>>, CatalogError> {
        Ok(self.header.get(pkg_hash)?.map(|v| v.to_vec()))
    }

    pub fn signature_blob(&self, pkg_hash: &[u8; 32]) -> Result<Option<Vec<u8>>, CatalogError> {
        Ok(self.sig.get(pkg_hash)?.map(|v| v.to_vec()))
    }

    pub fn meta_blob(&self, pkg_hash: &[u8; 32]) -> Result<Option<Vec<u8>>, CatalogError> {
        Ok(self.meta.get(pkg_hash)?.map(|v| v.to_vec()))
    }

    /// `ld.so.cache`-related entries (§4.D's `ldso` bucket), keyed by
    /// library name; JSON-encoded values are left to the caller to parse.
    pub fn ldso_entry(&self, key: &str) -> Result<Option<Vec<u8>>, CatalogError> {
        Ok(self.ldso.get(key)?.map(|v| v.to_vec()))
    }

    pub fn put_ldso_entry(&self, key: &str, value: &[u8]) -> Result<(), CatalogError> {
        let _guard = self.write_lock.lock();
        self.ldso.insert(key, value)?;
        Ok(())
    }

    /// Every `ldso` bucket row, key order, for synthesising the `ld.so.cache`
    /// inode's content. Entry *encoding* (the glibc cache binary format) is
    /// left to whatever populates this bucket; this only exposes what's
    /// stored.
    pub fn list_ldso_entries(&self) -> Result<Vec<(String, Vec<u8>)>, CatalogError> {
        let mut out = Vec::new();
        for row in self.ldso.iter() {
            let (k, v) = row?;
            out.push((String::from_utf8_lossy(&k).into_owned(), v.to_vec()));
        }
        Ok(out)
    }
}

fn decode_p2p_value(raw: &[u8]) -> Result<([u8; 32], u32, String), CatalogError> {
    if raw.len() < 40 {
        return Err(CatalogError::CorruptEntry("p2p value shorter than its fixed prefix"));
    }
    let mut pkg_hash = [0u8; 32];
    pkg_hash.copy_from_slice(&raw[0..32]);
    let inode_count = BigEndian::read_u64(&raw[32..40]) as u32;
    let full_name = String::from_utf8(raw[40..].to_vec())
        .map_err(|_| CatalogError::CorruptEntry("p2p full_name is not valid UTF-8"))?;
    Ok((pkg_hash, inode_count, full_name))
}

fn decode_pkg_size(raw: &[u8]) -> Result<u64, CatalogError> {
    if raw.len() < 9 {
        return Err(CatalogError::CorruptEntry("pkg value shorter than its fixed prefix"));
    }
    Ok(BigEndian::read_u64(&raw[1..9]))
}

fn decode_pkg_entry(raw: &[u8]) -> Result<(u64, u32, String), CatalogError> {
    if raw.len() < 25 {
        return Err(CatalogError::CorruptEntry("pkg value shorter than its fixed prefix"));
    }
    let size = BigEndian::read_u64(&raw[1..9]);
    let inode_count = BigEndian::read_u64(&raw[17..25]) as u32;
    let full_name = String::from_utf8(raw[25..].to_vec())
        .map_err(|_| CatalogError::CorruptEntry("pkg full_name is not valid UTF-8"))?;
    Ok((size, inode_count, full_name))
}
