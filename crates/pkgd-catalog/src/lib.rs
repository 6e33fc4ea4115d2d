//! The persistent catalog store (§4.D), its `Lookup(name)` resolution
//! rule table (§4.E, minus the generic inode-space machinery that lives
//! in `pkgd-fskit`), and the sub-catalog manager (§4.H).

mod catalog;
mod error;
mod store;

pub use catalog::{Catalog, UnsignedLookup};
pub use error::CatalogError;
pub use store::{CatalogEntry, CatalogStore};
