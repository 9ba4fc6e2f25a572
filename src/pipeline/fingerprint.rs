//! Content fingerprints for the extraction cache.

use base64::Engine;
use sha2::{Digest, Sha256};

/// Deterministic cache key over (instruction identity, chunk content).
///
/// The instruction identity is length-prefixed so that shifting characters
/// between the two parts can never produce the same key.
pub fn fingerprint(instructions_id: &str, chunk_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update((instructions_id.len() as u64).to_le_bytes());
    hasher.update(instructions_id.as_bytes());
    hasher.update(chunk_text.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_deterministic() {
        let a = fingerprint("takeoff-v1", "PANEL LP-1 225A");
        let b = fingerprint("takeoff-v1", "PANEL LP-1 225A");
        assert_eq!(a, b);
    }

    #[test]
    fn different_content_different_key() {
        let a = fingerprint("takeoff-v1", "PANEL LP-1");
        let b = fingerprint("takeoff-v1", "PANEL LP-2");
        assert_ne!(a, b);
    }

    #[test]
    fn different_instructions_different_key() {
        let a = fingerprint("takeoff-v1", "PANEL LP-1");
        let b = fingerprint("takeoff-v2", "PANEL LP-1");
        assert_ne!(a, b);
    }

    #[test]
    fn part_boundary_cannot_shift() {
        let a = fingerprint("ab", "c");
        let b = fingerprint("a", "bc");
        assert_ne!(a, b);
    }
}
