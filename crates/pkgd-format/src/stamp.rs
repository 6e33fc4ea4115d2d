//! The catalog version stamp: a `YYYYMMDDhhmmss` string derived from a
//! database header's `created_secs` field, in UTC. Grounded in
//! `original_source/apkgdb/index.go`, which derives the same string via
//! `created.UTC().Format("20060102150405")`.

use time::OffsetDateTime;
use time::macros::format_description;

/// Formats `created_secs` (Unix seconds, UTC) as a 14-digit version stamp.
/// Falls back to all-zero digits if `created_secs` is out of the range
/// `OffsetDateTime` can represent; a header that fails to parse this way is
/// already malformed in ways `DatabaseHeader::parse` should have rejected.
pub fn version_stamp(created_secs: i64) -> String {
    let format = format_description!("[year][month][day][hour][minute][second]");
    OffsetDateTime::from_unix_timestamp(created_secs)
        .ok()
        .and_then(|dt| dt.format(&format).ok())
        .unwrap_or_else(|| "00000000000000".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_a_known_instant() {
        // 2023-11-14T22:13:20Z
        assert_eq!(version_stamp(1_700_000_000), "20231114221320");
    }

    #[test]
    fn formats_the_epoch() {
        assert_eq!(version_stamp(0), "19700101000000");
    }
}
