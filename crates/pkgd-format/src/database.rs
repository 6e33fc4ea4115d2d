//! The signed catalog database format (§4.C): a 196-byte fixed header
//! describing three hash-verified sections (data/idx/name_idx), a padded
//! signature region, and the `LATEST` pointer that tells a client which
//! stamp of the database is current.

use std::collections::HashSet;

use byteorder::{BigEndian, ByteOrder};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use pkgd_crypto::{read_varblob, write_varblob};

pub const HEADER_LEN: usize = 196;
const MAGIC: &[u8; 4] = b"APDB";
const SUPPORTED_VERSION: u32 = 1;
const NAME_FIELD_LEN: usize = 32;

/// DER prefix for an Ed25519 `SubjectPublicKeyInfo`; the raw 32-byte public
/// key is appended to form a complete DER blob for [`DecodingKey::from_ed_der`].
const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("database header is {0} bytes, expected {HEADER_LEN}")]
    ShortHeader(usize),
    #[error("bad database magic")]
    BadMagic,
    #[error("unsupported database version {0}")]
    UnsupportedVersion(u32),
    #[error("database name field is not valid UTF-8")]
    BadNameField,
    #[error("section buffer does not match header-recorded length or hash")]
    SectionHashMismatch,
    #[error("malformed data entry: {0}")]
    MalformedEntry(&'static str),
    #[error("unsupported data entry tag {0}")]
    UnsupportedTag(u8),
    #[error("the LATEST pointer carries no key id")]
    MissingKeyId,
    #[error("the LATEST pointer's key id is not a recognized database signer")]
    UntrustedKeyId,
    #[error("the LATEST pointer's key id is not valid base64url")]
    BadKeyId,
    #[error("JWT decoding failed: {0}")]
    Jwt(String),
}

/// The parsed fixed-size database header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseHeader {
    pub version: u32,
    pub flags: u64,
    pub created_secs: i64,
    pub created_nanos: i64,
    pub os: u32,
    pub arch: u32,
    pub pkg_count: u32,
    pub name: [u8; NAME_FIELD_LEN],
    pub data_offset: u32,
    pub data_len: u32,
    pub data_sha256: [u8; 32],
    pub idx_offset: u32,
    pub idx_len: u32,
    pub idx_sha256: [u8; 32],
    pub name_idx_offset: u32,
    pub name_idx_len: u32,
    pub name_idx_sha256: [u8; 32],
}

impl DatabaseHeader {
    pub fn parse(buf: &[u8]) -> Result<Self, DatabaseError> {
        if buf.len() != HEADER_LEN {
            return Err(DatabaseError::ShortHeader(buf.len()));
        }
        if &buf[0..4] != MAGIC {
            return Err(DatabaseError::BadMagic);
        }
        let version = BigEndian::read_u32(&buf[4..8]);
        if version != SUPPORTED_VERSION {
            return Err(DatabaseError::UnsupportedVersion(version));
        }

        let mut name = [0u8; NAME_FIELD_LEN];
        name.copy_from_slice(&buf[44..76]);
        let mut data_sha256 = [0u8; 32];
        data_sha256.copy_from_slice(&buf[84..116]);
        let mut idx_sha256 = [0u8; 32];
        idx_sha256.copy_from_slice(&buf[124..156]);
        let mut name_idx_sha256 = [0u8; 32];
        name_idx_sha256.copy_from_slice(&buf[164..196]);

        Ok(Self {
            version,
            flags: BigEndian::read_u64(&buf[8..16]),
            created_secs: BigEndian::read_i64(&buf[16..24]),
            created_nanos: BigEndian::read_i64(&buf[24..32]),
            os: BigEndian::read_u32(&buf[32..36]),
            arch: BigEndian::read_u32(&buf[36..40]),
            pkg_count: BigEndian::read_u32(&buf[40..44]),
            name,
            data_offset: BigEndian::read_u32(&buf[76..80]),
            data_len: BigEndian::read_u32(&buf[80..84]),
            data_sha256,
            idx_offset: BigEndian::read_u32(&buf[116..120]),
            idx_len: BigEndian::read_u32(&buf[120..124]),
            idx_sha256,
            name_idx_offset: BigEndian::read_u32(&buf[156..160]),
            name_idx_len: BigEndian::read_u32(&buf[160..164]),
            name_idx_sha256,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(MAGIC);
        BigEndian::write_u32(&mut buf[4..8], self.version);
        BigEndian::write_u64(&mut buf[8..16], self.flags);
        BigEndian::write_i64(&mut buf[16..24], self.created_secs);
        BigEndian::write_i64(&mut buf[24..32], self.created_nanos);
        BigEndian::write_u32(&mut buf[32..36], self.os);
        BigEndian::write_u32(&mut buf[36..40], self.arch);
        BigEndian::write_u32(&mut buf[40..44], self.pkg_count);
        buf[44..76].copy_from_slice(&self.name);
        BigEndian::write_u32(&mut buf[76..80], self.data_offset);
        BigEndian::write_u32(&mut buf[80..84], self.data_len);
        buf[84..116].copy_from_slice(&self.data_sha256);
        BigEndian::write_u32(&mut buf[116..120], self.idx_offset);
        BigEndian::write_u32(&mut buf[120..124], self.idx_len);
        buf[124..156].copy_from_slice(&self.idx_sha256);
        BigEndian::write_u32(&mut buf[156..160], self.name_idx_offset);
        BigEndian::write_u32(&mut buf[160..164], self.name_idx_len);
        buf[164..196].copy_from_slice(&self.name_idx_sha256);
        buf
    }

    /// Decodes `name` as a trailing-NUL-trimmed UTF-8 string.
    pub fn name_str(&self) -> Result<&str, DatabaseError> {
        let trimmed = self
            .name
            .split(|&b| b == 0)
            .next()
            .unwrap_or(&self.name[..0]);
        std::str::from_utf8(trimmed).map_err(|_| DatabaseError::BadNameField)
    }
}

/// Byte offset at which the data section begins: the header plus a fixed
/// signature reservation of [`pkgd_crypto::SIGNATURE_SIZE`] bytes.
pub fn data_section_start() -> usize {
    HEADER_LEN + pkgd_crypto::SIGNATURE_SIZE
}

pub fn verify_section(
    expected_len: u32,
    expected_sha256: &[u8; 32],
    buf: &[u8],
) -> Result<(), DatabaseError> {
    if buf.len() as u32 != expected_len {
        return Err(DatabaseError::SectionHashMismatch);
    }
    let actual: [u8; 32] = Sha256::digest(buf).into();
    if &actual != expected_sha256 {
        return Err(DatabaseError::SectionHashMismatch);
    }
    Ok(())
}

const MAX_NAME_LEN: usize = 512;
const MAX_PATH_LEN: usize = 1024;
const MAX_BLOB_LEN: usize = 16 * 1024 * 1024;

/// One decoded data-section entry: a package record (tag `0x00`). No other
/// tag is currently defined; `parse_entries` rejects anything else rather
/// than silently skipping it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseEntry {
    pub pkg_hash: [u8; 32],
    pub size: u64,
    pub inode_count: u32,
    pub full_name: String,
    pub repo_path: String,
    pub header: Vec<u8>,
    pub signature: Vec<u8>,
    pub meta: Vec<u8>,
}

const TAG_PACKAGE: u8 = 0x00;

impl DatabaseEntry {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(TAG_PACKAGE);
        out.extend_from_slice(&self.pkg_hash);
        out.extend_from_slice(&self.size.to_be_bytes());
        out.extend_from_slice(&self.inode_count.to_be_bytes());
        write_varblob(out, self.full_name.as_bytes());
        write_varblob(out, self.repo_path.as_bytes());
        write_varblob(out, &self.header);
        write_varblob(out, &self.signature);
        write_varblob(out, &self.meta);
    }
}

/// Decodes every entry in a data-section buffer, in on-disk order (which is
/// the natural-collated insertion order the writer produced).
pub fn parse_entries(mut buf: &[u8]) -> Result<Vec<DatabaseEntry>, DatabaseError> {
    let mut entries = Vec::new();

    while !buf.is_empty() {
        let tag = buf[0];
        buf = &buf[1..];
        if tag != TAG_PACKAGE {
            return Err(DatabaseError::UnsupportedTag(tag));
        }

        if buf.len() < 32 + 8 + 4 {
            return Err(DatabaseError::MalformedEntry("truncated fixed fields"));
        }
        let mut pkg_hash = [0u8; 32];
        pkg_hash.copy_from_slice(&buf[0..32]);
        let size = BigEndian::read_u64(&buf[32..40]);
        let inode_count = BigEndian::read_u32(&buf[40..44]);
        buf = &buf[44..];

        let full_name = read_string(&mut buf, MAX_NAME_LEN, "full_name")?;
        let repo_path = read_string(&mut buf, MAX_PATH_LEN, "repo_path")?;
        let header =
            read_varblob(&mut buf, MAX_BLOB_LEN).ok_or(DatabaseError::MalformedEntry("header"))?;
        let signature = read_varblob(&mut buf, pkgd_crypto::SIGNATURE_SIZE)
            .ok_or(DatabaseError::MalformedEntry("signature"))?;
        let meta =
            read_varblob(&mut buf, MAX_BLOB_LEN).ok_or(DatabaseError::MalformedEntry("meta"))?;

        entries.push(DatabaseEntry {
            pkg_hash,
            size,
            inode_count,
            full_name,
            repo_path,
            header,
            signature,
            meta,
        });
    }

    Ok(entries)
}

fn read_string(buf: &mut &[u8], max_len: usize, field: &'static str) -> Result<String, DatabaseError> {
    let bytes = read_varblob(buf, max_len).ok_or(DatabaseError::MalformedEntry(field))?;
    String::from_utf8(bytes).map_err(|_| DatabaseError::MalformedEntry(field))
}

/// The claims carried by a `LATEST.jwt` pointer (§4.C).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestClaims {
    pub ver: String,
    pub os: String,
    pub arch: String,
    pub name: String,
}

/// Outcome of successfully verifying a `LATEST.jwt` pointer: its claims and
/// the trusted signer name recovered from the `kid` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestPointer {
    pub claims: LatestClaims,
    pub signer_name: &'static str,
}

/// Verifies `token` as an EdDSA-signed `LATEST.jwt` whose `kid` header names
/// a base64url-encoded Ed25519 public key trusted as a database signer.
pub fn verify_latest_jwt(token: &str) -> Result<LatestPointer, DatabaseError> {
    verify_latest_jwt_against(token, pkgd_crypto::compiled_db_trust())
}

/// As [`verify_latest_jwt`] but against an explicit trust table, so callers
/// can exercise this against fixture keypairs without the compiled-in table.
pub fn verify_latest_jwt_against(
    token: &str,
    trust: &pkgd_crypto::TrustTable,
) -> Result<LatestPointer, DatabaseError> {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let header =
        jsonwebtoken::decode_header(token).map_err(|e| DatabaseError::Jwt(e.to_string()))?;
    let kid = header.kid.ok_or(DatabaseError::MissingKeyId)?;

    let signer_name = trust.name_for(&kid).ok_or(DatabaseError::UntrustedKeyId)?;

    let raw_key = URL_SAFE_NO_PAD
        .decode(&kid)
        .map_err(|_| DatabaseError::BadKeyId)?;
    if raw_key.len() != 32 {
        return Err(DatabaseError::BadKeyId);
    }

    let mut spki = Vec::with_capacity(ED25519_SPKI_PREFIX.len() + 32);
    spki.extend_from_slice(&ED25519_SPKI_PREFIX);
    spki.extend_from_slice(&raw_key);
    let decoding_key = DecodingKey::from_ed_der(&spki);

    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.required_spec_claims = HashSet::new();
    validation.validate_exp = false;

    let data = jsonwebtoken::decode::<LatestClaims>(token, &decoding_key, &validation)
        .map_err(|e| DatabaseError::Jwt(e.to_string()))?;

    Ok(LatestPointer {
        claims: data.claims,
        signer_name,
    })
}

/// The legacy `LATEST.txt` fallback: a bare stamp with no signature. The
/// literal payload `NEW` means the catalog does not yet exist remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyLatest {
    Stamp(String),
    New,
}

pub fn parse_legacy_latest(body: &str) -> LegacyLatest {
    let trimmed = body.trim();
    if trimmed == "NEW" {
        LegacyLatest::New
    } else {
        LegacyLatest::Stamp(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use jsonwebtoken::{EncodingKey, Header};
    use rand::rngs::OsRng;

    const ED25519_PKCS8_PREFIX: [u8; 16] = [
        0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04,
        0x20,
    ];

    fn sample_header() -> DatabaseHeader {
        let mut name = [0u8; NAME_FIELD_LEN];
        name[..3].copy_from_slice(b"sys");
        DatabaseHeader {
            version: 1,
            flags: 0,
            created_secs: 1_700_000_000,
            created_nanos: 0,
            os: 0,
            arch: 1,
            pkg_count: 0,
            name,
            data_offset: data_section_start() as u32,
            data_len: 0,
            data_sha256: Sha256::digest(b"").into(),
            idx_offset: data_section_start() as u32,
            idx_len: 0,
            idx_sha256: Sha256::digest(b"").into(),
            name_idx_offset: data_section_start() as u32,
            name_idx_len: 0,
            name_idx_sha256: Sha256::digest(b"").into(),
        }
    }

    #[test]
    fn header_round_trips_through_its_wire_bytes() {
        let header = sample_header();
        let bytes = header.to_bytes();
        assert_eq!(DatabaseHeader::parse(&bytes).unwrap(), header);
        assert_eq!(header.name_str().unwrap(), "sys");
    }

    #[test]
    fn parse_rejects_bad_magic() {
        let mut bytes = sample_header().to_bytes();
        bytes[0] = b'X';
        assert_eq!(DatabaseHeader::parse(&bytes), Err(DatabaseError::BadMagic));
    }

    #[test]
    fn entry_round_trips_through_its_wire_bytes() {
        let entry = DatabaseEntry {
            pkg_hash: [7u8; 32],
            size: 409_600,
            inode_count: 12,
            full_name: "x11-libs.libdrm.libs.2.4.115.linux.amd64".to_string(),
            repo_path: "x11-libs/libdrm/libdrm-2.4.115.linux.amd64.pkg".to_string(),
            header: vec![1, 2, 3],
            signature: vec![4, 5, 6],
            meta: vec![7, 8, 9],
        };
        let mut buf = Vec::new();
        entry.encode(&mut buf);
        let parsed = parse_entries(&buf).unwrap();
        assert_eq!(parsed, vec![entry]);
    }

    #[test]
    fn parse_entries_rejects_unknown_tag() {
        let buf = [0xffu8];
        assert_eq!(parse_entries(&buf), Err(DatabaseError::UnsupportedTag(0xff)));
    }

    #[test]
    fn legacy_latest_recognizes_the_new_sentinel() {
        assert_eq!(parse_legacy_latest("NEW"), LegacyLatest::New);
        assert_eq!(
            parse_legacy_latest(" 20260101120000 \n"),
            LegacyLatest::Stamp("20260101120000".to_string())
        );
    }

    #[test]
    fn verify_latest_jwt_round_trips_against_a_fixture_trust_table() {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let key = SigningKey::generate(&mut OsRng);
        let key_b64 = URL_SAFE_NO_PAD.encode(key.verifying_key().as_bytes());

        let mut pkcs8 = Vec::with_capacity(ED25519_PKCS8_PREFIX.len() + 32);
        pkcs8.extend_from_slice(&ED25519_PKCS8_PREFIX);
        pkcs8.extend_from_slice(&key.to_bytes());
        let encoding_key = EncodingKey::from_ed_der(&pkcs8);

        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(key_b64.clone());

        let claims = LatestClaims {
            ver: "20260101120000".to_string(),
            os: "linux".to_string(),
            arch: "amd64".to_string(),
            name: "sys".to_string(),
        };
        let token = jsonwebtoken::encode(&header, &claims, &encoding_key).unwrap();

        let mut trust = pkgd_crypto::TrustTable::new();
        trust.insert(key_b64, "fixture database signer");

        let pointer = verify_latest_jwt_against(&token, &trust).unwrap();
        assert_eq!(pointer.claims, claims);
        assert_eq!(pointer.signer_name, "fixture database signer");
    }

    #[test]
    fn verify_latest_jwt_rejects_untrusted_key_id() {
        let key = SigningKey::generate(&mut OsRng);
        let key_b64 = {
            use base64::Engine;
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(key.verifying_key().as_bytes())
        };

        let mut pkcs8 = Vec::with_capacity(ED25519_PKCS8_PREFIX.len() + 32);
        pkcs8.extend_from_slice(&ED25519_PKCS8_PREFIX);
        pkcs8.extend_from_slice(&key.to_bytes());
        let encoding_key = EncodingKey::from_ed_der(&pkcs8);

        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(key_b64);
        let claims = LatestClaims {
            ver: "x".to_string(),
            os: "linux".to_string(),
            arch: "amd64".to_string(),
            name: "sys".to_string(),
        };
        let token = jsonwebtoken::encode(&header, &claims, &encoding_key).unwrap();

        let empty_trust = pkgd_crypto::TrustTable::new();
        assert_eq!(
            verify_latest_jwt_against(&token, &empty_trust),
            Err(DatabaseError::UntrustedKeyId)
        );
    }
}
