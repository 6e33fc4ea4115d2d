//! Library half of the `pkgd` daemon: configuration, the wired-together
//! [`daemon::Daemon`], and the default kernel-notifier stub. Split out of
//! `src/main.rs` so `tests/` can exercise `Daemon` end to end against
//! `pkgd-harness` fixtures without spawning the actual process.

pub mod config;
pub mod daemon;
pub mod notifier;
