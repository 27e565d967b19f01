//! Payment token generation
//!
//! Tokens are the public handle for an order's payment page. They carry
//! 256 bits of OS entropy, URL-safe base64 encoded, and encode nothing
//! about the order, product or sequence.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;

/// Raw entropy per token (bytes)
const TOKEN_BYTES: usize = 32;

/// Generate a fresh payment token
///
/// Uniqueness is enforced by the token index at insert time; the caller
/// regenerates on collision.
pub fn generate() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_shape() {
        let token = generate();
        // 32 bytes -> 43 base64url chars, no padding
        assert_eq!(token.len(), 43);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_tokens_unique() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generate()));
        }
    }
}
