use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// 256 bits of entropy for both the state nonce and the PKCE verifier.
const RANDOM_BYTES: usize = 32;

fn random_token() -> String {
    let mut bytes = [0u8; RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

// Generate PKCE verifier
pub fn generate_code_verifier() -> String {
    random_token()
}

// Generate PKCE challenge from verifier
pub fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let result = hasher.finalize();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(result)
}

// Generate random state parameter
pub fn generate_state() -> String {
    random_token()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn is_base64url(value: &str) -> bool {
        value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn test_verifier_encoding() {
        let verifier = generate_code_verifier();
        // 32 bytes -> 43 unpadded base64url characters
        assert_eq!(verifier.len(), 43);
        assert!(is_base64url(&verifier));
    }

    #[test]
    fn test_state_encoding() {
        let state = generate_state();
        assert_eq!(state.len(), 43);
        assert!(is_base64url(&state));
    }

    #[test]
    fn test_rfc7636_challenge_vector() {
        // Appendix B of RFC 7636
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            generate_code_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_values_never_repeat() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generate_state()));
            assert!(seen.insert(generate_code_verifier()));
        }
    }
}
