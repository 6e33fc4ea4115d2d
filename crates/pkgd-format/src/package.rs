//! The signed package file format (§4.B): a 124-byte fixed header, a JSON
//! metadata document, a per-block SHA-256 hash table, a padded signature
//! region, and the raw SquashFS payload.

use byteorder::{BigEndian, ByteOrder};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::meta::PackageMeta;

pub const HEADER_LEN: usize = 124;
const MAGIC: &[u8; 4] = b"APKG";
const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PackageError {
    #[error("package header is {0} bytes, expected {HEADER_LEN}")]
    ShortHeader(usize),
    #[error("bad package magic")]
    BadMagic,
    #[error("unsupported package version {0}")]
    UnsupportedVersion(u32),
    #[error("metadata buffer does not match header-recorded length or hash")]
    MetadataHashMismatch,
    #[error("hash table buffer does not match header-recorded length or hash")]
    HashtableHashMismatch,
    #[error("block {index} failed hash verification")]
    BlockHashMismatch { index: u32 },
    #[error("block index {index} out of range (table has {blocks} entries)")]
    BlockIndexOutOfRange { index: u32, blocks: u32 },
    #[error("metadata is not valid JSON: {0}")]
    InvalidMetadataJson(String),
    #[error(transparent)]
    Signature(#[from] pkgd_crypto::VerifyError),
}

/// The parsed fixed-size package header (§4.B). Byte offsets are exactly
/// as laid out on the wire; this struct is the decoded, native-endian view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageHeader {
    pub version: u32,
    pub flags: u64,
    pub created_unix_secs: i64,
    pub created_unix_nanos: i64,
    pub meta_offset: u32,
    pub meta_len: u32,
    pub meta_sha256: [u8; 32],
    pub hashtable_offset: u32,
    pub hashtable_len: u32,
    pub hashtable_sha256: [u8; 32],
    pub signature_offset: u32,
    pub data_offset: u32,
    pub block_size: u32,
}

impl PackageHeader {
    /// Parses the fixed 124-byte header, rejecting anything but the
    /// defined magic and version. Does not verify hashes or signatures —
    /// those require the bytes the header's offsets point at.
    pub fn parse(buf: &[u8]) -> Result<Self, PackageError> {
        if buf.len() != HEADER_LEN {
            return Err(PackageError::ShortHeader(buf.len()));
        }
        if &buf[0..4] != MAGIC {
            return Err(PackageError::BadMagic);
        }

        let version = BigEndian::read_u32(&buf[4..8]);
        if version != SUPPORTED_VERSION {
            return Err(PackageError::UnsupportedVersion(version));
        }

        let mut meta_sha256 = [0u8; 32];
        meta_sha256.copy_from_slice(&buf[40..72]);
        let mut hashtable_sha256 = [0u8; 32];
        hashtable_sha256.copy_from_slice(&buf[80..112]);

        Ok(Self {
            version,
            flags: BigEndian::read_u64(&buf[8..16]),
            created_unix_secs: BigEndian::read_i64(&buf[16..24]),
            created_unix_nanos: BigEndian::read_i64(&buf[24..32]),
            meta_offset: BigEndian::read_u32(&buf[32..36]),
            meta_len: BigEndian::read_u32(&buf[36..40]),
            meta_sha256,
            hashtable_offset: BigEndian::read_u32(&buf[72..76]),
            hashtable_len: BigEndian::read_u32(&buf[76..80]),
            hashtable_sha256,
            signature_offset: BigEndian::read_u32(&buf[112..116]),
            data_offset: BigEndian::read_u32(&buf[116..120]),
            block_size: BigEndian::read_u32(&buf[120..124]),
        })
    }

    /// Serializes the header back to its 124-byte wire form.
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(MAGIC);
        BigEndian::write_u32(&mut buf[4..8], self.version);
        BigEndian::write_u64(&mut buf[8..16], self.flags);
        BigEndian::write_i64(&mut buf[16..24], self.created_unix_secs);
        BigEndian::write_i64(&mut buf[24..32], self.created_unix_nanos);
        BigEndian::write_u32(&mut buf[32..36], self.meta_offset);
        BigEndian::write_u32(&mut buf[36..40], self.meta_len);
        buf[40..72].copy_from_slice(&self.meta_sha256);
        BigEndian::write_u32(&mut buf[72..76], self.hashtable_offset);
        BigEndian::write_u32(&mut buf[76..80], self.hashtable_len);
        buf[80..112].copy_from_slice(&self.hashtable_sha256);
        BigEndian::write_u32(&mut buf[112..116], self.signature_offset);
        BigEndian::write_u32(&mut buf[116..120], self.data_offset);
        BigEndian::write_u32(&mut buf[120..124], self.block_size);
        buf
    }

    pub fn header_hash(self) -> [u8; 32] {
        Sha256::digest(self.to_bytes()).into()
    }
}

/// Per-block SHA-256 hash table, plus which blocks have already been
/// validated against a payload read. A fresh table starts with nothing
/// validated; [`BlockTable::verify_block`] validates and memoizes on
/// success so a re-read of the same block is not re-hashed.
#[derive(Debug, Clone)]
pub struct BlockTable {
    hashes: Vec<[u8; 32]>,
    validated: Vec<bool>,
}

impl BlockTable {
    /// Parses a raw hash table buffer (`block_count * 32` bytes).
    pub fn parse(buf: &[u8]) -> Self {
        let hashes: Vec<[u8; 32]> = buf
            .chunks_exact(32)
            .map(|c| {
                let mut h = [0u8; 32];
                h.copy_from_slice(c);
                h
            })
            .collect();
        let validated = vec![false; hashes.len()];
        Self { hashes, validated }
    }

    pub fn block_count(&self) -> u32 {
        self.hashes.len() as u32
    }

    pub fn is_validated(&self, index: u32) -> bool {
        self.validated
            .get(index as usize)
            .copied()
            .unwrap_or(false)
    }

    /// Verifies `block` (the full aligned block's bytes) against the
    /// table entry at `index`, memoizing success. A mismatch is always an
    /// error, even if a prior call already validated this index.
    pub fn verify_block(&mut self, index: u32, block: &[u8]) -> Result<(), PackageError> {
        let expected =
            self.hashes
                .get(index as usize)
                .ok_or(PackageError::BlockIndexOutOfRange {
                    index,
                    blocks: self.block_count(),
                })?;

        let actual: [u8; 32] = Sha256::digest(block).into();
        if &actual != expected {
            return Err(PackageError::BlockHashMismatch { index });
        }

        self.validated[index as usize] = true;
        Ok(())
    }
}

/// Verifies `meta_bytes` against the header's recorded length and hash.
pub fn verify_metadata_bytes(
    header: &PackageHeader,
    meta_bytes: &[u8],
) -> Result<(), PackageError> {
    if meta_bytes.len() as u32 != header.meta_len {
        return Err(PackageError::MetadataHashMismatch);
    }
    let actual: [u8; 32] = Sha256::digest(meta_bytes).into();
    if actual != header.meta_sha256 {
        return Err(PackageError::MetadataHashMismatch);
    }
    Ok(())
}

/// Verifies `hashtable_bytes` against the header's recorded length and hash.
pub fn verify_hashtable_bytes(
    header: &PackageHeader,
    hashtable_bytes: &[u8],
) -> Result<(), PackageError> {
    if hashtable_bytes.len() as u32 != header.hashtable_len {
        return Err(PackageError::HashtableHashMismatch);
    }
    let actual: [u8; 32] = Sha256::digest(hashtable_bytes).into();
    if actual != header.hashtable_sha256 {
        return Err(PackageError::HashtableHashMismatch);
    }
    Ok(())
}

/// A package whose header, metadata, and (optionally) hash table have all
/// been verified. This is what `open_package` (§4.B's open contract, driven
/// end-to-end by `pkgd-loader`) produces once every check has passed.
#[derive(Debug, Clone)]
pub struct OpenedPackage {
    pub header: PackageHeader,
    pub header_hash: [u8; 32],
    pub signer: pkgd_crypto::Signer,
    pub meta: PackageMeta,
    pub block_table: Option<BlockTable>,
}

/// Runs the full open contract against in-memory buffers: header hash,
/// signature, metadata hash, and (if supplied) hash-table hash. Callers
/// fetching remote packages over ranged HTTP supply whichever buffers
/// they have already downloaded; `hashtable_bytes` is optional because a
/// client may defer fetching the hash table until the first block read.
pub fn open_package(
    header_bytes: &[u8],
    signature_bytes: &[u8],
    meta_bytes: &[u8],
    hashtable_bytes: Option<&[u8]>,
) -> Result<OpenedPackage, PackageError> {
    let header = PackageHeader::parse(header_bytes)?;
    let header_hash = header.header_hash();

    let signer = pkgd_crypto::verify_pkg(header_bytes, signature_bytes)?;

    verify_metadata_bytes(&header, meta_bytes)?;
    let meta: PackageMeta = serde_json::from_slice(meta_bytes)
        .map_err(|e| PackageError::InvalidMetadataJson(e.to_string()))?;

    let block_table = match hashtable_bytes {
        Some(bytes) => {
            verify_hashtable_bytes(&header, bytes)?;
            Some(BlockTable::parse(bytes))
        }
        None => None,
    };

    Ok(OpenedPackage {
        header,
        header_hash,
        signer,
        meta,
        block_table,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use pkgd_crypto::TrustTable;
    use rand::rngs::OsRng;

    fn sample_header() -> PackageHeader {
        PackageHeader {
            version: 1,
            flags: 0,
            created_unix_secs: 1_700_000_000,
            created_unix_nanos: 0,
            meta_offset: HEADER_LEN as u32,
            meta_len: 0,
            meta_sha256: Sha256::digest(b"").into(),
            hashtable_offset: HEADER_LEN as u32,
            hashtable_len: 0,
            hashtable_sha256: Sha256::digest(b"").into(),
            signature_offset: 512,
            data_offset: 1024,
            block_size: 131072,
        }
    }

    #[test]
    fn header_round_trips_through_its_wire_bytes() {
        let header = sample_header();
        let bytes = header.to_bytes();
        assert_eq!(PackageHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn parse_rejects_bad_magic() {
        let mut bytes = sample_header().to_bytes();
        bytes[0] = b'X';
        assert_eq!(PackageHeader::parse(&bytes), Err(PackageError::BadMagic));
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert_eq!(
            PackageHeader::parse(&[0u8; 10]),
            Err(PackageError::ShortHeader(10))
        );
    }

    #[test]
    fn block_table_memoizes_successful_verification() {
        let block = b"payload bytes for block zero";
        let hash: [u8; 32] = Sha256::digest(block).into();
        let mut table = BlockTable {
            hashes: vec![hash],
            validated: vec![false],
        };
        assert!(!table.is_validated(0));
        table.verify_block(0, block).unwrap();
        assert!(table.is_validated(0));
    }

    #[test]
    fn block_table_rejects_tampered_block() {
        let hash: [u8; 32] = Sha256::digest(b"expected").into();
        let mut table = BlockTable {
            hashes: vec![hash],
            validated: vec![false],
        };
        assert_eq!(
            table.verify_block(0, b"tampered"),
            Err(PackageError::BlockHashMismatch { index: 0 })
        );
    }

    #[test]
    fn open_package_runs_the_full_contract() {
        let key = SigningKey::generate(&mut OsRng);
        let meta_bytes = br#"{"full_name":"a.b.c.1.0.0.linux.amd64","name":"a.b.c","version":"1.0.0","os":"linux","arch":"amd64","size":0,"hash":"","blocks":0,"block_size":4096,"inodes":0,"created":[0,0],"provides":{}}"#;

        let mut header = sample_header();
        header.meta_len = meta_bytes.len() as u32;
        header.meta_sha256 = Sha256::digest(meta_bytes.as_slice()).into();
        let header_bytes = header.to_bytes();

        let sig = pkgd_crypto::sign(&key, &header_bytes).unwrap();

        let mut trust = TrustTable::new();
        let key_b64 = base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            key.verifying_key().as_bytes(),
        );
        trust.insert(key_b64, "test signer");

        let signer = pkgd_crypto::verify_with_trust(&header_bytes, &sig, &trust).unwrap();
        assert_eq!(signer.name, "test signer");

        verify_metadata_bytes(&header, meta_bytes).unwrap();
        let meta: PackageMeta = serde_json::from_slice(meta_bytes).unwrap();
        assert_eq!(meta.full_name, "a.b.c.1.0.0.linux.amd64");
    }
}
