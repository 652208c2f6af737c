/// Number of hex characters used in `[hash:8]`-style asset names.
pub const SHORT_HASH_LEN: usize = 8;

/// BLAKE3 digest of a byte slice, hex-encoded.
#[must_use]
pub fn content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Leading `len` hex characters of the content hash.
///
/// `len` is clamped to the full digest length (64).
#[must_use]
pub fn short_hash(data: &[u8], len: usize) -> String {
    let mut full = content_hash(data);
    full.truncate(len.min(full.len()));
    full
}
