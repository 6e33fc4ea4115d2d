use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::SigningKey;
use pkgd_catalog::Catalog;
use pkgd_fskit::InodeAllocator;
use pkgd_format::{
    Arch, Created, DatabaseEntry, DatabaseHeader, Os, PackageHeader, PackageMeta,
    data_section_start,
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Generates a fresh Ed25519 keypair for a single test's signer.
pub fn fixture_keypair() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// A trust table recognizing only `key`, bound to `name`. Same shape the
/// catalog and format crates each build ad hoc in their own test modules.
pub fn trust_table_with(key: &SigningKey, name: &'static str) -> pkgd_crypto::TrustTable {
    let key_b64 = URL_SAFE_NO_PAD.encode(key.verifying_key().as_bytes());
    let mut trust = pkgd_crypto::TrustTable::new();
    trust.insert(key_b64, name);
    trust
}

/// Rounds `n` up to the next multiple of 512, the package format's payload
/// alignment (§4.B).
fn round_up_512(n: u32) -> u32 {
    let rem = n % 512;
    if rem == 0 { n } else { n + (512 - rem) }
}

/// A fully assembled, signed package file plus the pieces it was built from,
/// so a test can tamper with specific bytes and re-verify.
pub struct PackageFixture {
    pub bytes: Vec<u8>,
    pub header: PackageHeader,
    pub meta: PackageMeta,
    pub meta_bytes: Vec<u8>,
    pub hashtable_bytes: Vec<u8>,
    pub block_hashes: Vec<[u8; 32]>,
    pub payload: Vec<u8>,
}

/// Builds a complete, signed package file around `payload`, split into
/// `block_size`-byte blocks (the last block may be shorter). Mirrors the
/// header-offset arithmetic `pkgd_format::package`'s own tests hand-assemble
/// for a single zero-length case.
#[allow(clippy::too_many_arguments)]
pub fn build_package_fixture(
    key: &SigningKey,
    full_name: &str,
    name: &str,
    version: &str,
    os: Os,
    arch: Arch,
    inodes: u32,
    block_size: u32,
    payload: &[u8],
) -> PackageFixture {
    let block_hashes: Vec<[u8; 32]> = payload
        .chunks(block_size.max(1) as usize)
        .map(|block| Sha256::digest(block).into())
        .collect();

    let mut hashtable_bytes = Vec::with_capacity(block_hashes.len() * 32);
    for h in &block_hashes {
        hashtable_bytes.extend_from_slice(h);
    }
    let hashtable_sha256: [u8; 32] = Sha256::digest(&hashtable_bytes).into();

    let meta = PackageMeta {
        full_name: full_name.to_string(),
        name: name.to_string(),
        names: Vec::new(),
        version: version.to_string(),
        os: os.as_str().to_string(),
        arch: arch.as_str().to_string(),
        size: payload.len() as i64,
        hash: hex::encode(hashtable_sha256),
        blocks: block_hashes.len() as u32,
        block_size: block_size as i64,
        inodes,
        created: Created(1_700_000_000, 0),
        category: None,
        subcat: None,
        ld_so_cache: None,
        provides: HashMap::new(),
        r#virtual: HashMap::new(),
    };
    let meta_bytes = serde_json::to_vec(&meta).expect("PackageMeta always serializes");
    let meta_sha256: [u8; 32] = Sha256::digest(&meta_bytes).into();

    let meta_offset = pkgd_format::PACKAGE_HEADER_LEN as u32;
    let hashtable_offset = meta_offset + meta_bytes.len() as u32;
    let signature_offset = hashtable_offset + hashtable_bytes.len() as u32;
    let data_offset = round_up_512(signature_offset + pkgd_crypto::SIGNATURE_SIZE as u32);

    let header = PackageHeader {
        version: 1,
        flags: 0,
        created_unix_secs: 1_700_000_000,
        created_unix_nanos: 0,
        meta_offset,
        meta_len: meta_bytes.len() as u32,
        meta_sha256,
        hashtable_offset,
        hashtable_len: hashtable_bytes.len() as u32,
        hashtable_sha256,
        signature_offset,
        data_offset,
        block_size,
    };
    let header_bytes = header.to_bytes();
    let sig_blob = pkgd_crypto::sign(key, &header_bytes).expect("signature fits the fixed budget");

    let mut bytes = header_bytes.to_vec();
    bytes.extend_from_slice(&meta_bytes);
    bytes.extend_from_slice(&hashtable_bytes);
    bytes.resize(signature_offset as usize, 0);
    bytes.extend_from_slice(&sig_blob);
    bytes.resize(data_offset as usize, 0);
    bytes.extend_from_slice(payload);

    PackageFixture {
        bytes,
        header,
        meta,
        meta_bytes,
        hashtable_bytes,
        block_hashes,
        payload: payload.to_vec(),
    }
}

/// One package record destined for a signed database fixture; the same
/// shape [`pkgd_format::DatabaseEntry`] already carries, spelled out here
/// so callers don't need to import that type just to build one.
pub struct DatabaseFixtureEntry {
    pub pkg_hash: [u8; 32],
    pub size: u64,
    pub inode_count: u32,
    pub full_name: String,
    pub repo_path: String,
    pub header: Vec<u8>,
    pub signature: Vec<u8>,
    pub meta: Vec<u8>,
}

impl From<DatabaseFixtureEntry> for DatabaseEntry {
    fn from(e: DatabaseFixtureEntry) -> Self {
        DatabaseEntry {
            pkg_hash: e.pkg_hash,
            size: e.size,
            inode_count: e.inode_count,
            full_name: e.full_name,
            repo_path: e.repo_path,
            header: e.header,
            signature: e.signature,
            meta: e.meta,
        }
    }
}

/// Builds a complete, signed catalog database file carrying `entries`.
/// `idx`/`name_idx` are left empty, matching every database fixture already
/// built by hand in `pkgd-catalog`'s test modules (neither section is
/// consumed by anything in this workspace yet — see DESIGN.md).
pub fn build_database_fixture(
    key: &SigningKey,
    name: &str,
    os: Os,
    arch: Arch,
    entries: Vec<DatabaseFixtureEntry>,
    created_secs: i64,
) -> Vec<u8> {
    let mut data = Vec::new();
    for e in entries {
        let entry: DatabaseEntry = e.into();
        entry.encode(&mut data);
    }
    let data_sha256: [u8; 32] = Sha256::digest(&data).into();

    let mut name_field = [0u8; 32];
    let name_bytes = name.as_bytes();
    name_field[..name_bytes.len()].copy_from_slice(name_bytes);

    let data_offset = data_section_start() as u32;
    let header = DatabaseHeader {
        version: 1,
        flags: 0,
        created_secs,
        created_nanos: 0,
        os: os as u32,
        arch: arch as u32,
        pkg_count: 0,
        name: name_field,
        data_offset,
        data_len: data.len() as u32,
        data_sha256,
        idx_offset: data_offset,
        idx_len: 0,
        idx_sha256: Sha256::digest(b"").into(),
        name_idx_offset: data_offset,
        name_idx_len: 0,
        name_idx_sha256: Sha256::digest(b"").into(),
    };
    let header_bytes = header.to_bytes();
    let sig_blob = pkgd_crypto::sign(key, &header_bytes).expect("signature fits the fixed budget");

    let mut out = header_bytes.to_vec();
    out.extend_from_slice(&sig_blob);
    out.resize(data_section_start(), 0);
    out.extend_from_slice(&data);
    out
}

/// Builds a signed package fixture and the catalog-database entry that
/// references it, keyed consistently (the entry's `pkg_hash` is the
/// package file's own SHA-256, matching how `original_source/apkg/pkg.go`
/// derives a database entry's hash from the package it describes) so a
/// test can index the entry into a [`pkgd_catalog::Catalog`] and then
/// separately exercise the package bytes against a loader.
#[allow(clippy::too_many_arguments)]
pub fn build_catalog_package(
    pkg_key: &SigningKey,
    full_name: &str,
    name: &str,
    version: &str,
    os: Os,
    arch: Arch,
    inodes: u32,
    block_size: u32,
    payload: &[u8],
    repo_path: &str,
) -> (PackageFixture, DatabaseFixtureEntry) {
    let fixture = build_package_fixture(
        pkg_key, full_name, name, version, os, arch, inodes, block_size, payload,
    );
    let pkg_hash: [u8; 32] = Sha256::digest(&fixture.bytes).into();

    let header_bytes = fixture.bytes[..pkgd_format::PACKAGE_HEADER_LEN].to_vec();
    let sig_start = fixture.header.signature_offset as usize;
    let sig_end = sig_start + pkgd_crypto::SIGNATURE_SIZE;
    let sig_bytes = fixture.bytes[sig_start..sig_end].to_vec();

    let entry = DatabaseFixtureEntry {
        pkg_hash,
        size: fixture.payload.len() as u64,
        inode_count: inodes,
        full_name: full_name.to_string(),
        repo_path: repo_path.to_string(),
        header: header_bytes,
        signature: sig_bytes,
        meta: fixture.meta_bytes.clone(),
    };

    (fixture, entry)
}

/// Opens a fresh catalog rooted at `dir` and indexes a database fixture
/// carrying `entries`, signed by `db_key`: the common setup every
/// end-to-end scenario test needs before exercising `Catalog::lookup`.
pub fn open_populated_catalog(
    dir: &Path,
    db_key: &SigningKey,
    name: &str,
    os: Os,
    arch: Arch,
    entries: Vec<DatabaseFixtureEntry>,
) -> Arc<Catalog> {
    let raw = build_database_fixture(db_key, name, os, arch, entries, 1_700_000_000);
    let trust = trust_table_with(db_key, "fixture database signer");

    let catalog = Catalog::open_root(dir, name, os, arch, Arc::new(InodeAllocator::new()), None)
        .expect("fixture catalog opens");
    catalog.index(&raw, &trust).expect("fixture database verifies");
    catalog
}

/// Builds an EdDSA-signed `LATEST.jwt` body carrying `claims`, keyed by
/// `key`'s base64url public key as the JWT `kid` header — mirrors
/// `pkgd_format::database`'s own `verify_latest_jwt` test fixture.
pub fn build_latest_jwt(key: &SigningKey, claims: &pkgd_format::LatestClaims) -> String {
    use jsonwebtoken::{Algorithm, EncodingKey, Header};

    const ED25519_PKCS8_PREFIX: [u8; 16] = [
        0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04,
        0x20,
    ];

    let key_b64 = URL_SAFE_NO_PAD.encode(key.verifying_key().as_bytes());

    let mut pkcs8 = Vec::with_capacity(ED25519_PKCS8_PREFIX.len() + 32);
    pkcs8.extend_from_slice(&ED25519_PKCS8_PREFIX);
    pkcs8.extend_from_slice(&key.to_bytes());
    let encoding_key = EncodingKey::from_ed_der(&pkcs8);

    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = Some(key_b64);

    jsonwebtoken::encode(&header, claims, &encoding_key).expect("claims always encode")
}
