//! Payload digests.
//!
//! The remote side recomputes the digest with
//! `Get-FileHash -Algorithm SHA256` and lowercases it, so the rendering here
//! must stay SHA-256 in lowercase hex.

use sha2::{Digest, Sha256};

/// SHA-256 of `bytes` as lowercase hex.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Compare a payload against a digest produced elsewhere.
pub fn matches(bytes: &[u8], expected: &str) -> bool {
    digest(bytes).eq_ignore_ascii_case(expected.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(
            digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn deterministic_and_sensitive() {
        let payload = vec![7u8; 4096];
        assert_eq!(digest(&payload), digest(&payload));

        let mut altered = payload.clone();
        altered[4095] = 8;
        assert_ne!(digest(&payload), digest(&altered));
    }

    #[test]
    fn matches_ignores_case() {
        assert!(matches(
            b"abc",
            "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD"
        ));
        assert!(!matches(b"abd", &digest(b"abc")));
    }
}
