/// Compute the BLAKE3 hash of a string, returning the hex-encoded digest.
///
/// Used to derive stable on-disk keys from URLs.
#[must_use]
pub fn blake3_str(data: &str) -> String {
    blake3::hash(data.as_bytes()).to_hex().to_string()
}
