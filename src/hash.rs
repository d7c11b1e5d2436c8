//! SHA-256 digests used for content addressing.

use sha2::{Digest, Sha256};

/// Returns the lowercase hex SHA-256 digest of `data`.
pub fn digest(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::digest;

    #[test]
    fn digest_of_empty_string() {
        assert_eq!(
            digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(digest("block"), digest("block"));
        assert_ne!(digest("block"), digest("blocks"));
    }
}
