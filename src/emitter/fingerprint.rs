//! Row fingerprints: the idempotency key for emitted rows.

use sha2::{Digest, Sha256};

/// Lowercase and collapse whitespace so re-OCR'd spacing does not change the key.
pub fn normalize_line(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// sha256 over `volume|page|row_index|owner|normalized line`, hex encoded.
pub fn row_fingerprint(
    volume_id: &str,
    page: u32,
    row_index: usize,
    owner: Option<&str>,
    raw_line: &str,
) -> String {
    let key = format!(
        "{}|{}|{}|{}|{}",
        volume_id,
        page,
        row_index,
        owner.unwrap_or(""),
        normalize_line(raw_line)
    );
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
