//! Background tasks that keep a live [`pkgd_catalog::Catalog`] tree
//! current: the per-catalog `LATEST` updater (§4.I) and the unsigned
//! package staging watcher (§4.J). Neither component is reachable from
//! `pkgd-catalog` or `pkgd-fskit` directly — both sit above them in the
//! dependency chain and are wired together by whatever owns the process
//! (the `pkgd` daemon binary).

mod error;
mod unsigned;
mod updater;

pub use error::RuntimeError;
pub use unsigned::UnsignedStaging;
pub use updater::{UpdateOutcome, Updater, TICK_INTERVAL};
