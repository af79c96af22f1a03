//! PKCE verifier and challenge helpers (RFC 7636, S256 method).

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use restohub_core::RestError;

const VERIFIER_BYTES: usize = 32;
const TOKEN_BYTES: usize = 32;

/// High-entropy secret kept server-side between login and callback.
#[derive(Clone, PartialEq, Eq)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    pub fn generate() -> Result<Self, RestError> {
        let bytes = random_bytes::<VERIFIER_BYTES>()?;
        Ok(Self(URL_SAFE_NO_PAD.encode(bytes)))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `base64url(sha256(verifier))` without padding.
    pub fn challenge(&self) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl core::fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PkceVerifier(..)")
    }
}

/// Opaque random value correlating a login redirect with its callback.
pub fn new_login_state() -> String {
    Uuid::new_v4().to_string()
}

/// URL-safe random token, used for invitation tokens.
pub fn random_token() -> Result<String, RestError> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes::<TOKEN_BYTES>()?))
}

fn random_bytes<const N: usize>() -> Result<[u8; N], RestError> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf)
        .map_err(|e| RestError::internal("failed to gather randomness").with_cause(e))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_matches_rfc7636_vector() {
        let verifier = PkceVerifier::from_string("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(verifier.challenge(), "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn generated_verifier_is_43_url_safe_chars() {
        let verifier = PkceVerifier::generate().unwrap();
        assert_eq!(verifier.as_str().len(), 43);
        assert!(
            verifier
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn verifiers_and_states_are_unique() {
        let a = PkceVerifier::generate().unwrap();
        let b = PkceVerifier::generate().unwrap();
        assert_ne!(a, b);
        assert_ne!(new_login_state(), new_login_state());
    }

    #[test]
    fn debug_hides_secret() {
        let verifier = PkceVerifier::from_string("secret");
        assert!(!format!("{verifier:?}").contains("secret"));
    }
}
