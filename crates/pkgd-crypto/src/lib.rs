//! Signature primitives for signed packages and signed catalog databases.
//!
//! Every signature blob has the same wire shape: `varint(version) ‖
//! varblob(public key) ‖ varblob(signature)`. Two trust tables decide
//! whether a recovered public key is allowed to sign packages or
//! databases respectively; a structurally valid Ed25519 signature from a
//! key outside its table is still rejected.

mod trust;
mod varblob;

pub use trust::{TrustTable, compiled_db_trust, compiled_pkg_trust};
pub use varblob::{read_varblob, write_varblob};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use thiserror::Error;

/// Signature format version. Only `1` (Ed25519) is defined.
const SIG_VERSION: u64 = 1;

/// Upper bound on a serialized signature blob: version varint (1 byte for
/// value `1`) + pubkey varint-len (1) + pubkey (32) + sig varint-len (1) +
/// sig (64) = 99 bytes.
pub const SIGNATURE_SIZE: usize = 3 + 32 + 64;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("signature blob exceeds the {SIGNATURE_SIZE}-byte ceiling ({0} bytes)")]
    Oversized(usize),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("unsupported signature version {0}")]
    UnsupportedVersion(u64),
    #[error("malformed signature blob: {0}")]
    Malformed(&'static str),
    #[error("signature does not verify against the signed data")]
    InvalidSignature,
    #[error("valid signature from an untrusted key")]
    UntrustedKey,
}

/// Outcome of a successful verification: the recovered key (base64url, no
/// padding) and the human-readable name bound to it in the trust table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signer {
    pub version: u64,
    pub key_b64: String,
    pub name: &'static str,
}

/// Signs `data` with `key`, returning the framed signature blob.
pub fn sign(key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, SignError> {
    let mut out = Vec::with_capacity(SIGNATURE_SIZE);
    write_varblob_version(&mut out);
    write_varblob(&mut out, key.verifying_key().as_bytes());
    let sig: Signature = key.sign(data);
    write_varblob(&mut out, &sig.to_bytes());

    if out.len() > SIGNATURE_SIZE {
        return Err(SignError::Oversized(out.len()));
    }

    Ok(out)
}

fn write_varblob_version(out: &mut Vec<u8>) {
    varblob::write_uvarint(out, SIG_VERSION);
}

/// Verifies a package signature against the compiled-in package trust table.
pub fn verify_pkg(data: &[u8], blob: &[u8]) -> Result<Signer, VerifyError> {
    verify_with_trust(data, blob, compiled_pkg_trust())
}

/// Verifies a database signature against the compiled-in database trust table.
pub fn verify_db(data: &[u8], blob: &[u8]) -> Result<Signer, VerifyError> {
    verify_with_trust(data, blob, compiled_db_trust())
}

/// Verifies a signature blob against an explicit trust table. Production
/// code should prefer [`verify_pkg`]/[`verify_db`]; this entry point exists
/// so other crates can exercise the verification logic against fixture
/// keypairs in tests without touching the compiled-in tables.
pub fn verify_with_trust(
    data: &[u8],
    blob: &[u8],
    trust: &TrustTable,
) -> Result<Signer, VerifyError> {
    verify(data, blob, |k| trust.name_for(k))
}

fn verify(
    data: &[u8],
    blob: &[u8],
    lookup: impl Fn(&str) -> Option<&'static str>,
) -> Result<Signer, VerifyError> {
    let mut r = blob;

    let version =
        varblob::read_uvarint(&mut r).ok_or(VerifyError::Malformed("truncated version"))?;
    if version != SIG_VERSION {
        return Err(VerifyError::UnsupportedVersion(version));
    }

    let pub_bytes = read_varblob(&mut r, 32).ok_or(VerifyError::Malformed("truncated pubkey"))?;
    let sig_bytes = read_varblob(&mut r, 64).ok_or(VerifyError::Malformed("truncated signature"))?;

    let pub_arr: [u8; 32] = pub_bytes
        .as_slice()
        .try_into()
        .map_err(|_| VerifyError::Malformed("pubkey is not 32 bytes"))?;
    let sig_arr: [u8; 64] = sig_bytes
        .as_slice()
        .try_into()
        .map_err(|_| VerifyError::Malformed("signature is not 64 bytes"))?;

    let verifying_key =
        VerifyingKey::from_bytes(&pub_arr).map_err(|_| VerifyError::Malformed("invalid pubkey"))?;
    let signature = Signature::from_bytes(&sig_arr);

    verifying_key
        .verify_strict(data, &signature)
        .map_err(|_| VerifyError::InvalidSignature)?;

    let key_b64 = URL_SAFE_NO_PAD.encode(pub_arr);
    let name = lookup(&key_b64).ok_or(VerifyError::UntrustedKey)?;

    Ok(Signer {
        version,
        key_b64,
        name,
    })
}
