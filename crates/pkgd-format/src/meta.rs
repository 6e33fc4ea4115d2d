//! The JSON metadata document embedded in every package file (§4.B) and
//! referenced, hash-verified, from the catalog database (§4.C).
//!
//! The original implementation lets callers walk `provides`/`virtual` as
//! loosely-typed maps of `interface{}`. Here both are concrete typed
//! records so a malformed entry is caught at deserialization instead of
//! at first use.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::osarch::{Arch, Os};

/// A single entry under `provides`: either a regular file (mode + size) or
/// a symlink to another path inside the package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProvidesEntry {
    Symlink { symlink: String },
    File { mode: u32, size: i64 },
}

/// A virtual module's entries: logical entry name → relative target path.
pub type VirtualModule = HashMap<String, String>;

/// The `created: [secs, nanos]` pair from the metadata JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Created(pub i64, pub i64);

/// The decoded `PackageMeta` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMeta {
    pub full_name: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    pub version: String,
    pub os: String,
    pub arch: String,
    pub size: i64,
    /// Hex-encoded SHA-256 of the block-hash table.
    pub hash: String,
    pub blocks: u32,
    pub block_size: i64,
    pub inodes: u32,
    pub created: Created,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcat: Option<String>,
    /// Base64-encoded `ld.so.cache`, when the package carries one.
    #[serde(rename = "ld.so.cache", default, skip_serializing_if = "Option::is_none")]
    pub ld_so_cache: Option<String>,
    #[serde(default)]
    pub provides: HashMap<String, ProvidesEntry>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub r#virtual: HashMap<String, VirtualModule>,
}

impl PackageMeta {
    /// The metadata's `os` field parsed into the typed enum, if recognized.
    pub fn parsed_os(&self) -> Option<Os> {
        Os::parse(&self.os)
    }

    /// The metadata's `arch` field parsed into the typed enum, if recognized.
    pub fn parsed_arch(&self) -> Option<Arch> {
        Arch::parse(&self.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "full_name": "x11-libs.libdrm.libs.2.4.115.linux.amd64",
            "name": "x11-libs.libdrm.libs",
            "names": ["x11-libs.libdrm.libs", "libdrm"],
            "version": "2.4.115",
            "os": "linux",
            "arch": "amd64",
            "size": 409600,
            "hash": "deadbeef",
            "blocks": 100,
            "block_size": 4096,
            "inodes": 12,
            "created": [1700000000, 0],
            "category": "x11-libs",
            "subcat": "libs",
            "provides": {
                "usr/lib/libdrm.so.2": {"mode": 33188, "size": 65536},
                "usr/lib/libdrm.so": {"symlink": "libdrm.so.2"}
            },
            "virtual": {
                "libdrm": {"so": "usr/lib/libdrm.so.2"}
            }
        }"#
    }

    #[test]
    fn deserializes_the_full_shape() {
        let meta: PackageMeta = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(meta.full_name, "x11-libs.libdrm.libs.2.4.115.linux.amd64");
        assert_eq!(meta.parsed_os(), Some(Os::Linux));
        assert_eq!(meta.parsed_arch(), Some(Arch::Amd64));
        assert_eq!(meta.created, Created(1700000000, 0));
        assert_eq!(
            meta.provides.get("usr/lib/libdrm.so.2"),
            Some(&ProvidesEntry::File {
                mode: 33188,
                size: 65536
            })
        );
        assert_eq!(
            meta.provides.get("usr/lib/libdrm.so"),
            Some(&ProvidesEntry::Symlink {
                symlink: "libdrm.so.2".to_string()
            })
        );
        assert_eq!(
            meta.r#virtual.get("libdrm").and_then(|m| m.get("so")),
            Some(&"usr/lib/libdrm.so.2".to_string())
        );
    }

    #[test]
    fn round_trips_through_serialization() {
        let meta: PackageMeta = serde_json::from_str(sample_json()).unwrap();
        let encoded = serde_json::to_string(&meta).unwrap();
        let reparsed: PackageMeta = serde_json::from_str(&encoded).unwrap();
        assert_eq!(meta, reparsed);
    }

    #[test]
    fn tolerates_missing_optional_fields() {
        let json = r#"{
            "full_name": "a.b.c.1.0.0.linux.amd64",
            "name": "a.b.c",
            "version": "1.0.0",
            "os": "linux",
            "arch": "amd64",
            "size": 0,
            "hash": "",
            "blocks": 0,
            "block_size": 4096,
            "inodes": 0,
            "created": [0, 0],
            "provides": {}
        }"#;
        let meta: PackageMeta = serde_json::from_str(json).unwrap();
        assert!(meta.category.is_none());
        assert!(meta.r#virtual.is_empty());
    }
}
