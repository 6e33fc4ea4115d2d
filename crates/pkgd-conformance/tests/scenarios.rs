//! End-to-end scenarios spanning the signed formats, the catalog, the
//! package cache, and the updater — each test drives the real crate APIs
//! together rather than any single module in isolation.

mod support;

use std::collections::HashMap;
use std::sync::Arc;

use pkgd_fskit::{InodeAllocator, NullNotifier};
use pkgd_format::{Arch, LatestClaims, Os};
use pkgd_harness::{
    build_catalog_package, build_database_fixture, build_latest_jwt, build_package_fixture,
    fixture_keypair, open_populated_catalog, trust_table_with,
};
use pkgd_runtime::{UpdateOutcome, Updater};
use support::{MockServer, Route};

#[test]
fn verifies_a_signed_package_and_exposes_its_signer_and_metadata() {
    let key = fixture_keypair();
    let payload = vec![1u8; 4096 * 2];
    let fixture = build_package_fixture(
        &key,
        "sys.widget.lib.1.0.0.linux.amd64",
        "sys.widget.lib",
        "1.0.0",
        Os::Linux,
        Arch::Amd64,
        3,
        4096,
        &payload,
    );

    let header_bytes = &fixture.bytes[..pkgd_format::PACKAGE_HEADER_LEN];
    let sig_start = fixture.header.signature_offset as usize;
    let sig_bytes = &fixture.bytes[sig_start..sig_start + pkgd_crypto::SIGNATURE_SIZE];

    let trust = trust_table_with(&key, "fixture package signer");
    let signer = pkgd_crypto::verify_with_trust(header_bytes, sig_bytes, &trust).unwrap();
    assert_eq!(signer.name, "fixture package signer");

    pkgd_format::verify_metadata_bytes(&fixture.header, &fixture.meta_bytes).unwrap();
    assert_eq!(fixture.meta.full_name, "sys.widget.lib.1.0.0.linux.amd64");
}

#[test]
fn tampered_block_fails_integrity_while_surrounding_blocks_still_read_and_the_cache_evicts_it() {
    let key = fixture_keypair();
    let block_size = 4096usize;
    // 9 blocks, each filled with its own index so a one-byte flip in block 7
    // can't accidentally match the hash of any other block's content.
    let payload: Vec<u8> = (0..9u8)
        .flat_map(|b| std::iter::repeat(b).take(block_size))
        .collect();

    let fixture = build_package_fixture(
        &key,
        "sys.widget.lib.1.0.0.linux.amd64",
        "sys.widget.lib",
        "1.0.0",
        Os::Linux,
        Arch::Amd64,
        0,
        block_size as u32,
        &payload,
    );

    let mut table = pkgd_format::BlockTable::parse(&fixture.hashtable_bytes);

    let mut tampered_block_7 = payload[7 * block_size..8 * block_size].to_vec();
    tampered_block_7[0] ^= 0xFF;

    for i in [0usize, 3, 6] {
        let block = &payload[i * block_size..(i + 1) * block_size];
        table.verify_block(i as u32, block).unwrap();
    }
    let err = table.verify_block(7, &tampered_block_7).unwrap_err();
    assert_eq!(err, pkgd_format::PackageError::BlockHashMismatch { index: 7 });

    // block 8 remains readable after block 7's failure
    table.verify_block(8, &payload[8 * block_size..9 * block_size]).unwrap();

    let pkg_hash: [u8; 32] = {
        use sha2::{Digest, Sha256};
        Sha256::digest(&fixture.bytes).into()
    };
    let cache: pkgd_cache::PackageCache<()> = pkgd_cache::PackageCache::unbounded();
    cache.insert(pkg_hash, Arc::new(()));
    assert!(cache.get(&pkg_hash).is_some());
    // a consumer evicts the cache entry on IntegrityFailure (§4.F); the
    // cache itself has no opinion on block validity, so eviction is the
    // caller's explicit reaction to the error above.
    cache.remove(&pkg_hash);
    assert!(cache.get(&pkg_hash).is_none());
}

#[test]
fn version_collation_and_natural_order_lookup_returns_the_highest_version() {
    let dir = tempfile::tempdir().unwrap();
    let pkg_key = fixture_keypair();
    let db_key = fixture_keypair();

    let (_older, older_entry) = build_catalog_package(
        &pkg_key,
        "media-video.ffmpeg.libs.5.0.1.linux.amd64",
        "media-video.ffmpeg.libs",
        "5.0.1",
        Os::Linux,
        Arch::Amd64,
        2,
        4096,
        &[1u8; 4096],
        "pkgs/media-video.ffmpeg.libs.5.0.1.linux.amd64.pkg",
    );
    let (_newer, newer_entry) = build_catalog_package(
        &pkg_key,
        "media-video.ffmpeg.libs.5.1.3.linux.amd64",
        "media-video.ffmpeg.libs",
        "5.1.3",
        Os::Linux,
        Arch::Amd64,
        2,
        4096,
        &[2u8; 4096],
        "pkgs/media-video.ffmpeg.libs.5.1.3.linux.amd64.pkg",
    );

    let catalog = open_populated_catalog(
        dir.path(),
        &db_key,
        "media-video",
        Os::Linux,
        Arch::Amd64,
        vec![older_entry, newer_entry],
    );

    let ino = catalog.lookup("media-video.ffmpeg.libs").unwrap();
    let resolved = catalog.allocator().resolve(ino).unwrap();
    assert_eq!(
        resolved,
        pkgd_fskit::ResolvedInode::Symlink {
            target: "media-video.ffmpeg.libs.5.1.3.linux.amd64".to_string()
        }
    );
}

#[test]
fn cross_arch_lookup_constructs_a_sub_catalog_and_resolves_within_it() {
    let dir = tempfile::tempdir().unwrap();
    let pkg_key = fixture_keypair();
    let db_key = fixture_keypair();

    let root = pkgd_catalog::Catalog::open_root(
        dir.path(),
        "azusa",
        Os::Linux,
        Arch::Amd64,
        Arc::new(InodeAllocator::new()),
        None,
    )
    .unwrap();

    let (_fixture, entry) = build_catalog_package(
        &pkg_key,
        "azusa.symlinks.core.0.0.3.linux.arm64",
        "azusa.symlinks.core",
        "0.0.3",
        Os::Linux,
        Arch::Arm64,
        1,
        4096,
        &[3u8; 4096],
        "pkgs/azusa.symlinks.core.0.0.3.linux.arm64.pkg",
    );
    let sub = root.sub_get(Os::Linux, Arch::Arm64).unwrap();
    let raw = build_database_fixture(&db_key, "azusa", Os::Linux, Arch::Arm64, vec![entry], 1_700_000_000);
    let trust = trust_table_with(&db_key, "fixture database signer");
    sub.index(&raw, &trust).unwrap();

    let ino = root.lookup("azusa.symlinks.core.0.0.3.linux.arm64").unwrap();
    assert!(ino >= pkgd_fskit::FIRST_ASSIGNABLE_INO);
    assert!(root.list_subs().contains(&(Os::Linux, Arch::Arm64)));
    assert!(Arc::ptr_eq(root.allocator(), sub.allocator()));
}

fn route_key(name: &str, os: Os, arch: Arch, file: &str) -> String {
    format!("/db/{name}/{os}/{arch}/{file}")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delta_upgrade_falls_back_to_full_snapshot_and_advances_current_version() {
    let dir = tempfile::tempdir().unwrap();
    let pkg_key = fixture_keypair();
    let db_key = fixture_keypair();
    let trust = trust_table_with(&db_key, "fixture database signer");

    let name = "sys";
    let os = Os::Linux;
    let arch = Arch::Amd64;

    let catalog = pkgd_catalog::Catalog::open_root(
        dir.path(),
        name,
        os,
        arch,
        Arc::new(InodeAllocator::new()),
        None,
    )
    .unwrap();

    let v1_secs = 1_700_000_000i64;
    let v2_secs = 1_700_003_600i64;
    let v1_stamp = pkgd_format::version_stamp(v1_secs);
    let v2_stamp = pkgd_format::version_stamp(v2_secs);

    let (_old_pkg, old_entry) = build_catalog_package(
        &pkg_key,
        "sys.widget.lib.1.0.0.linux.amd64",
        "sys.widget.lib",
        "1.0.0",
        os,
        arch,
        2,
        4096,
        &[1u8; 4096],
        "pkgs/sys.widget.lib.1.0.0.linux.amd64.pkg",
    );
    let v1_raw = build_database_fixture(&db_key, name, os, arch, vec![old_entry], v1_secs);
    catalog.index(&v1_raw, &trust).unwrap();
    assert_eq!(catalog.current_version(), Some(v1_stamp.clone()));

    let (_new_pkg, new_entry) = build_catalog_package(
        &pkg_key,
        "sys.widget.lib.2.0.0.linux.amd64",
        "sys.widget.lib",
        "2.0.0",
        os,
        arch,
        2,
        4096,
        &[2u8; 4096],
        "pkgs/sys.widget.lib.2.0.0.linux.amd64.pkg",
    );
    let v2_raw = build_database_fixture(&db_key, name, os, arch, vec![new_entry], v2_secs);

    let claims = LatestClaims {
        ver: v2_stamp.clone(),
        os: os.as_str().to_string(),
        arch: arch.as_str().to_string(),
        name: name.to_string(),
    };
    let jwt = build_latest_jwt(&db_key, &claims);

    let mut routes = HashMap::new();
    routes.insert(route_key(name, os, arch, "LATEST.jwt"), Route::ok(jwt));
    routes.insert(
        route_key(name, os, arch, &format!("{v1_stamp}-{v2_stamp}.bin")),
        Route::not_found(),
    );
    routes.insert(
        route_key(name, os, arch, &format!("{v2_stamp}.bin")),
        Route::ok(v2_raw),
    );
    let server = MockServer::start(routes);

    let updater = Updater::new(
        catalog.clone(),
        reqwest::Client::new(),
        server.base_url(),
        trust,
        Arc::new(NullNotifier),
        pkgd_fskit::CancellationToken::new(),
    );

    let outcome = updater.check_once().await.unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::Updated {
            from: Some(v1_stamp),
            to: v2_stamp.clone(),
        }
    );
    assert_eq!(catalog.current_version(), Some(v2_stamp));
    assert!(catalog.lookup("sys.widget.lib.2.0.0.linux.amd64").is_ok());
}

#[test]
fn cache_eviction_under_ttl_honors_the_24h_window_and_pressure_evicts_the_lru_quarter() {
    use pkgd_cache::NeverUnderPressure;
    use std::time::Duration;

    let cache: pkgd_cache::PackageCache<u32> = pkgd_cache::PackageCache::unbounded();
    for i in 0..4u8 {
        cache.insert([i; 32], Arc::new(i as u32));
    }

    // every entry younger than the TTL survives a sweep regardless of pressure
    let (ttl_evicted, _) = cache.sweep_once(&NeverUnderPressure, Duration::from_secs(24 * 60 * 60));
    assert_eq!(ttl_evicted, 0);
    assert_eq!(cache.len(), 4);

    // a zero TTL treats every entry as stale, mirroring "accessed 23h ago
    // vs. 1h ago" once the 24h line has been crossed for both
    let (ttl_evicted, _) = cache.sweep_once(&NeverUnderPressure, Duration::from_secs(0));
    assert_eq!(ttl_evicted, 4);
    assert!(cache.is_empty());

    struct AlwaysUnderPressure;
    impl pkgd_cache::MemoryPressureSignal for AlwaysUnderPressure {
        fn under_pressure(&self) -> bool {
            true
        }
    }

    for i in 0..8u8 {
        cache.insert([i; 32], Arc::new(i as u32));
    }
    let (ttl_evicted, pressure_evicted) =
        cache.sweep_once(&AlwaysUnderPressure, Duration::from_secs(24 * 60 * 60));
    assert_eq!(ttl_evicted, 0);
    assert_eq!(pressure_evicted, 2);
    assert_eq!(cache.len(), 6);
}
