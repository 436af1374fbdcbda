/// Stable content hash used for rule pattern change-detection and markdown
/// block hashing (§3, §4.4). BLAKE3 is fast enough to run on every ingest
/// without being a bottleneck, and is already part of the corpus's hashing
/// toolkit.
pub fn stable_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_content_hashes_identically() {
        assert_eq!(stable_hash("abc"), stable_hash("abc"));
    }

    #[test]
    fn different_content_hashes_differently() {
        assert_ne!(stable_hash("abc"), stable_hash("abd"));
    }
}
