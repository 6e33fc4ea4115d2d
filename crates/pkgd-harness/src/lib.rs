//! Fixture builders for the two signed wire formats (§4.B/§4.C), shared
//! by `pkgd-conformance`'s property/scenario tests and `pkgd-bench`'s
//! hot-path benchmarks so neither has to re-derive header-offset
//! arithmetic or signing boilerplate already worked out once here.
//!
//! Grounded in the fixture-building test helpers each format/store crate
//! already carries in its own `#[cfg(test)]` module (`pkgd-format`'s
//! `package.rs`/`database.rs` tests, `pkgd-catalog`'s `store.rs`/
//! `catalog.rs` tests) — this crate is that pattern promoted to a
//! standalone crate so a dedicated conformance suite can reuse it,
//! mirroring the role the teacher's `frankenlibc-harness::fixtures`
//! module plays for FrankenLibC's own conformance crate.

pub mod fixtures;

pub use fixtures::{
    build_catalog_package, build_database_fixture, build_latest_jwt, build_package_fixture,
    fixture_keypair, open_populated_catalog, trust_table_with, DatabaseFixtureEntry,
    PackageFixture,
};
