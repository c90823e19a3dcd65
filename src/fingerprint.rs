//! Hash & Fingerprint (C1, spec §4.1).
//!
//! Pure functions, no I/O — grounded in the teacher's small
//! stateless-utility modules (e.g. `agent/utils.rs`), but using `sha2`/`hex`
//! directly rather than the teacher's MD5/HMAC combo, which exists there
//! only for AWS SigV4 signing this domain has no use for.

use crate::error::CoreError;
use sha2::{Digest, Sha256};

/// SHA-256 of the UTF-8 bytes of `s`, as 64 lowercase hex chars.
pub fn hash_text(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// Parse and reserialize a URL (default scheme `https`, keep a leading
/// `www`), then hash the normalized form.
pub fn hash_url(u: &str) -> String {
    hash_text(&normalize_url(u))
}

fn normalize_url(u: &str) -> String {
    let trimmed = u.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    match reqwest::Url::parse(&with_scheme) {
        Ok(parsed) => parsed.to_string(),
        // Malformed input still needs a stable hash; fall back to the
        // trimmed original rather than failing fingerprinting outright.
        Err(_) => with_scheme,
    }
}

/// Hamming distance between two 64-hex-char PDQ hashes (0..=256).
pub fn hamming_distance(a: &str, b: &str) -> Result<u32, CoreError> {
    validate_pdq_hex(a)?;
    validate_pdq_hex(b)?;
    let ba = hex::decode(a).map_err(|_| CoreError::InvalidFingerprint(a.to_string()))?;
    let bb = hex::decode(b).map_err(|_| CoreError::InvalidFingerprint(b.to_string()))?;
    Ok(ba
        .iter()
        .zip(bb.iter())
        .map(|(x, y)| (x ^ y).count_ones())
        .sum())
}

/// Expand a 64-hex-char PDQ hash into a 256-length binary vector, each hex
/// digit unpacked MSB-first into 4 bits.
pub fn pdq_to_vector(h: &str) -> Result<Vec<u8>, CoreError> {
    validate_pdq_hex(h)?;
    let mut out = Vec::with_capacity(256);
    for c in h.chars() {
        let nibble = c.to_digit(16).ok_or_else(|| CoreError::InvalidFingerprint(h.to_string()))?;
        for shift in (0..4).rev() {
            out.push(((nibble >> shift) & 1) as u8);
        }
    }
    Ok(out)
}

fn validate_pdq_hex(h: &str) -> Result<(), CoreError> {
    if h.len() == 64 && h.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(CoreError::InvalidFingerprint(format!(
            "expected 64 hex chars, got {} chars",
            h.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_text_is_stable_sha256() {
        let h = hash_text("hello");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_text("hello"));
        assert_ne!(h, hash_text("hello "));
    }

    #[test]
    fn hash_url_normalizes_scheme() {
        assert_eq!(hash_url("example.com/a"), hash_url("https://example.com/a"));
    }

    #[test]
    fn hamming_distance_identical_is_zero() {
        let h = "a".repeat(64);
        assert_eq!(hamming_distance(&h, &h).unwrap(), 0);
    }

    #[test]
    fn hamming_distance_rejects_bad_length() {
        assert!(hamming_distance("abc", &"a".repeat(64)).is_err());
    }

    #[test]
    fn pdq_to_vector_has_256_bits() {
        let h = "0123456789abcdef".repeat(4);
        let v = pdq_to_vector(&h).unwrap();
        assert_eq!(v.len(), 256);
        // First hex digit '0' -> 0000
        assert_eq!(&v[0..4], &[0, 0, 0, 0]);
        // Second hex digit '1' -> 0001
        assert_eq!(&v[4..8], &[0, 0, 0, 1]);
    }

    #[test]
    fn pdq_to_vector_rejects_bad_length() {
        assert!(pdq_to_vector("abcd").is_err());
    }
}
