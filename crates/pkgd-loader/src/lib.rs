//! The lazy package loader (§4.G): one-shot per-package initialisation,
//! a ranged-HTTP byte-range file with de-duplicated concurrent fetches,
//! and block-verified reads that memoize successful verification for the
//! package's lifetime.

mod error;
mod loader;
mod ranged_file;

pub use error::LoaderError;
pub use loader::{LoadedPackage, PackageLoader, REARM_DELAY};
pub use ranged_file::{dist_url, RangedHttpFile, MAX_CHUNK};
