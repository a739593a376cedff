//! Profile token generation.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Length of a generated token, in hex characters.
pub const TOKEN_LENGTH: usize = 6;

/// Short random token: the first six hex chars of SHA-256 over a v4 UUID.
///
/// Collisions are not checked. With 16^6 possible tokens the risk is
/// accepted for the retention windows profiles are kept for; a colliding
/// write overwrites the older profile.
pub fn generate_token() -> String {
    let digest = Sha256::digest(Uuid::new_v4().as_bytes());
    let mut token = hex::encode(digest);
    token.truncate(TOKEN_LENGTH);
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tokens_vary() {
        let tokens: HashSet<String> = (0..50).map(|_| generate_token()).collect();
        assert!(tokens.len() > 45);
    }
}
