// Shared helpers for the scout pipeline.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use sha2::{Digest, Sha256};

/// Longest slug handed to the publish endpoint.
pub const MAX_SLUG_LEN: usize = 80;

/// Trim, lowercase and collapse internal whitespace.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hex SHA-256 of the NUL-joined parts.
pub fn content_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("\0").as_bytes());
    hex::encode(hasher.finalize())
}

/// URL slug: lowercase ASCII alphanumerics joined by single dashes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Monday 00:00 UTC of the week containing `now`.
pub fn start_of_week(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_since_monday = i64::from(now.weekday().num_days_from_monday());
    let monday = now.date_naive() - Duration::days(days_since_monday);
    monday.and_time(NaiveTime::MIN).and_utc()
}
