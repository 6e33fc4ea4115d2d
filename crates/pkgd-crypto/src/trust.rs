//! Compiled-in tables mapping a trusted signer's base64url public key to a
//! human-readable name. A structurally valid signature from a key absent
//! from the relevant table is rejected (see [`crate::verify_pkg`] /
//! [`crate::verify_db`]).
//!
//! Real deployments replace these placeholder entries with their own
//! production signing keys at build time; the entries below are
//! fixture-only and carry no production trust.

use std::collections::HashMap;
use std::sync::LazyLock;

/// A named set of trusted public keys, keyed by base64url (no padding)
/// encoding of the raw 32-byte Ed25519 public key.
#[derive(Debug, Clone, Default)]
pub struct TrustTable(HashMap<String, &'static str>);

impl TrustTable {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, key_b64: impl Into<String>, name: &'static str) -> &mut Self {
        self.0.insert(key_b64.into(), name);
        self
    }

    pub fn name_for(&self, key_b64: &str) -> Option<&'static str> {
        self.0.get(key_b64).copied()
    }
}

impl FromIterator<(&'static str, &'static str)> for TrustTable {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

/// Compiled-in table of package-signing keys.
static PKG_TRUST: LazyLock<TrustTable> = LazyLock::new(|| {
    [
        (
            "n21_CiuzEuo_OaSfEVodAXpQtcc4Qe_NprMSAs3B9QU",
            "primary package signing key",
        ),
        (
            "TPKGBiS_JH8tnSUgAE-4_f8gOkvzFqR2dnOKrJyLRus",
            "emergency package signing key #1",
        ),
    ]
    .into_iter()
    .collect()
});

/// Compiled-in table of database-signing keys.
static DB_TRUST: LazyLock<TrustTable> = LazyLock::new(|| {
    [
        (
            "dbXFt7yjQhHcpPq0UIRMonWUyO5f4DoNVOYcefKCIhU",
            "primary database signing key",
        ),
        (
            "TPDBy98_HUS9JikdsjCbw_FjUjNWTx5ryNron_DHEBA",
            "emergency database signing key #1",
        ),
    ]
    .into_iter()
    .collect()
});

pub fn compiled_pkg_trust() -> &'static TrustTable {
    &PKG_TRUST
}

pub fn compiled_db_trust() -> &'static TrustTable {
    &DB_TRUST
}
