//! Natural-order string comparison and the `collated(name)` byte-string key
//! used to order catalog entries in the KV store (§4.D).
//!
//! Two distinct algorithms live here because they answer different
//! questions: [`natural_cmp`] decides how two strings order *in memory*
//! (used wherever a human-facing listing needs version-aware sorting);
//! [`collated`] produces a byte string whose plain lexicographic order
//! matches natural order, so it can be used directly as a sled key.

use std::cmp::Ordering;

/// Maximum digit run length honored by both [`natural_cmp`] and
/// [`collated`]; matches the catalog's version-string conventions.
const MAX_DIGIT_RUN: usize = 32;

/// Natural-order comparison: digit runs compare by numeric value (leading
/// zeros stripped, so `"007"` and `"7"` are numerically equal) rather than
/// byte-for-byte, and letters sort before digits so `"a" < "1"`.
///
/// When two strings are numerically equal but not identical — e.g. `"foo007"`
/// and `"foo7"` — natural order alone cannot tell them apart. Ties are
/// broken by plain lexicographic order on the original string, which keeps
/// the comparator a total order usable as a sort key.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ab, bb) = (a.as_bytes(), b.as_bytes());
    let (mut pa, mut pb) = (0usize, 0usize);

    loop {
        let (da, db) = (pa >= ab.len(), pb >= bb.len());
        match (da, db) {
            (true, true) => return a.cmp(b),
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }

        let (av, bv) = (ab[pa], bb[pb]);
        let (digit_a, digit_b) = (av.is_ascii_digit(), bv.is_ascii_digit());

        if digit_a && digit_b {
            let (start_a, len_a) = significant_digit_run(ab, pa);
            let (start_b, len_b) = significant_digit_run(bb, pb);

            match len_a.cmp(&len_b) {
                Ordering::Equal => {}
                other => return other,
            }

            match ab[start_a..start_a + len_a].cmp(&bb[start_b..start_b + len_b]) {
                Ordering::Equal => {}
                other => return other,
            }

            pa = digit_run_end(ab, pa);
            pb = digit_run_end(bb, pb);
            continue;
        }

        if av == bv {
            pa += 1;
            pb += 1;
            continue;
        }

        return match (digit_a, digit_b) {
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ => av.cmp(&bv),
        };
    }
}

/// Finds the end of the (possibly capped) digit run starting at `start`.
fn digit_run_end(s: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < s.len() && end - start < MAX_DIGIT_RUN && s[end].is_ascii_digit() {
        end += 1;
    }
    end
}

/// Returns `(offset, len)` of the significant (leading-zero-stripped)
/// portion of the digit run starting at `start`, so that a run of all
/// zeroes collapses to its final digit rather than an empty slice.
fn significant_digit_run(s: &[u8], start: usize) -> (usize, usize) {
    let end = digit_run_end(s, start);
    let mut sig_start = start;
    while sig_start + 1 < end && s[sig_start] == b'0' {
        sig_start += 1;
    }
    (sig_start, end - sig_start)
}

/// Sorts `items` in place by [`natural_cmp`].
pub fn natural_sort(items: &mut [String]) {
    items.sort_by(|a, b| natural_cmp(a, b));
}

/// Produces the collation key for `name`: literal bytes pass through
/// unchanged; each digit run (capped at [`MAX_DIGIT_RUN`] digits) is
/// prefixed with a single length byte `0x7F + digit_count` so that plain
/// byte-lexicographic order over the result matches natural order.
pub fn collated(name: &str) -> Vec<u8> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() + 4);
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let end = digit_run_end(bytes, i);
            let len = end - i;
            out.push(0x7F + len as u8);
            out.extend_from_slice(&bytes[i..end]);
            i = end;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    out
}
