use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Derive the four-octal-digit contributor code from a client address.
///
/// Stable per IP and deliberately low-entropy, so unrelated users may
/// collide; it is the only author identifier ever surfaced.
#[must_use]
pub fn contributor_code(ip: &str) -> String {
    let digest = Sha256::digest(ip.as_bytes());
    let n = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    format!("{:04o}", n % 0o10000)
}

/// UTC day a change happened on, for grouping listings.
#[must_use]
pub fn day(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string()
}

/// Time of day a change happened at.
#[must_use]
pub fn time_of_day(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .format("%H:%M UTC")
        .to_string()
}
