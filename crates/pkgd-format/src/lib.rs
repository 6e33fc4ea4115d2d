//! Wire codecs for the two signed on-disk formats (§4.A-C): package files
//! wrapping a SquashFS image, and the aggregated catalog database they're
//! indexed into. Also home to the supporting pieces every format consumer
//! needs: OS/arch tags, package metadata JSON, natural-order name
//! comparison, and the catalog version stamp.

mod database;
mod meta;
mod natsort;
mod osarch;
mod package;
mod stamp;

pub use database::{
    DatabaseEntry, DatabaseError, DatabaseHeader, LatestClaims, LatestPointer, LegacyLatest,
    data_section_start, parse_entries, parse_legacy_latest, verify_latest_jwt,
    verify_latest_jwt_against, verify_section, HEADER_LEN as DATABASE_HEADER_LEN,
};
pub use meta::{Created, PackageMeta, ProvidesEntry, VirtualModule};
pub use natsort::{collated, natural_cmp, natural_sort};
pub use osarch::{Arch, Os};
pub use package::{
    BlockTable, OpenedPackage, PackageError, PackageHeader, open_package, verify_hashtable_bytes,
    verify_metadata_bytes, HEADER_LEN as PACKAGE_HEADER_LEN,
};
pub use stamp::version_stamp;
