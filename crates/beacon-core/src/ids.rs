//! Identifier minting.
//!
//! The hub mints short opaque ids for locally originated rows: the current
//! Unix-millisecond timestamp in base36 concatenated with a random base36
//! suffix. Sortable-ish, URL-safe, and unique within one hub process, which
//! is all a single-location deployment needs. Cloud-assigned reference rows
//! keep whatever ids the cloud sends.

use chrono::{DateTime, Utc};
use rand::Rng;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::with_capacity(13);
    while value > 0 {
        buf.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).expect("base36 output is ASCII")
}

/// Mints a new opaque identifier: timestamp-base36 + random-base36.
///
/// Example: `m5xk2a1b-q8w3zr`
pub fn new_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let suffix: u64 = rand::thread_rng().gen_range(0..36u64.pow(6));
    format!("{}-{:0>6}", to_base36(millis), to_base36(suffix))
}

/// Returns the `YYYYMMDD` date key for the given instant.
pub fn date_key(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d").to_string()
}

/// Formats a per-day receipt number as `YYYYMMDD-NNNN`.
pub fn format_receipt_number(date_key: &str, sequence: i64) -> String {
    format!("{}-{:04}", date_key, sequence)
}
