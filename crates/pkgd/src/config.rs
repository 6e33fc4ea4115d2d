//! On-disk daemon configuration (TOML, `serde`) plus the `clap`-derived
//! CLI overrides layered on top of it. Grounded in the teacher's own
//! `Clap`-derived argument style (`examples/j-martina-viletech/server/
//! src/main.rs`'s `struct Clap`) generalized from a one-shot CLI tool's
//! flags into a long-running daemon's config file plus override flags.

use std::path::{Path, PathBuf};

use pkgd_format::{Arch, Os};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PkgdConfig {
    /// The catalog's base name, e.g. `"sys"` — the same `name` field
    /// carried by the database header (§4.C) and the `{store_dir}/
    /// {name}.{os}.{arch}.db` path (§6).
    pub name: String,
    /// This host's own (OS, arch), forming the root catalog. Cross-arch
    /// lookups spawn sub-catalogs (§4.H) on demand; this field never
    /// needs to name every (OS, arch) the daemon might serve.
    pub os: String,
    pub arch: String,
    /// Root directory holding every catalog's embedded-KV file, the
    /// `unsigned/` staging directory (§4.J), and downloaded package
    /// caches (§6 "Persisted on-disk state").
    pub storage_root: PathBuf,
    /// URL prefix prepended to both `db/...` and `dist/...` paths (§6
    /// "URL layout"), e.g. `"https://pkg.example.com/"`.
    pub repo_prefix: String,
    /// §4.J: opt-in local unsigned-package staging.
    pub unsigned_staging: bool,
    /// Upper bound on how many decoded packages (technically, loaders —
    /// see [`crate::daemon::Daemon`]) the in-memory cache holds before its
    /// own LRU eviction kicks in, ahead of the TTL/pressure sweep (§4.F).
    pub cache_capacity: usize,
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"info"` or
    /// `"pkgd=debug,warn"`.
    pub log: String,
}

fn default_cache_capacity() -> usize {
    65_536
}

impl Default for PkgdConfig {
    fn default() -> Self {
        Self {
            name: "sys".to_string(),
            os: default_os().to_string(),
            arch: default_arch().to_string(),
            storage_root: PathBuf::from("/var/lib/pkgd"),
            repo_prefix: "https://pkg.example.invalid/".to_string(),
            unsigned_staging: false,
            cache_capacity: default_cache_capacity(),
            log: "info".to_string(),
        }
    }
}

/// Host OS string in the package-metadata vocabulary (§4.B), not Rust's
/// own `std::env::consts::OS` spelling (`"macos"` vs this format's
/// `"darwin"`).
fn default_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "windows",
        _ => "linux",
    }
}

fn default_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "386",
        "aarch64" => "arm64",
        "arm" => "arm",
        _ => "amd64",
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("config names unrecognized os {0:?}")]
    UnknownOs(String),
    #[error("config names unrecognized arch {0:?}")]
    UnknownArch(String),
}

impl PkgdConfig {
    /// Loads `path` if it exists; otherwise returns [`PkgdConfig::default`]
    /// unchanged (a freshly `pkgd init`-ed host has no config file yet, and
    /// every field has a workable development default).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parsed_os(&self) -> Result<Os, ConfigError> {
        Os::parse(&self.os).ok_or_else(|| ConfigError::UnknownOs(self.os.clone()))
    }

    pub fn parsed_arch(&self) -> Result<Arch, ConfigError> {
        Arch::parse(&self.arch).ok_or_else(|| ConfigError::UnknownArch(self.arch.clone()))
    }
}
