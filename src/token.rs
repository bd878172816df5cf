//! Token generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

/// Random bytes per token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Length of an encoded token.
pub const TOKEN_LENGTH: usize = 43;

/// Generate a fresh URL-safe token from the OS-seeded thread RNG.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
        assert!(!token.contains('/'));
        assert!(!token.contains('+'));
        assert!(!token.contains('='));
    }

    #[test]
    fn test_tokens_unique() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }
}
