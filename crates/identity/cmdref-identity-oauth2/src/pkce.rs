//! PKCE (RFC 7636) verifier, challenge and state generation.

use crate::error::OAuth2Result;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Raw entropy behind the verifier; encodes to 86 characters.
pub const VERIFIER_BYTES: usize = 64;
/// Raw entropy behind the CSRF state token.
pub const STATE_BYTES: usize = 32;
pub const CHALLENGE_METHOD: &str = "S256";

/// Per-attempt PKCE material. Never persisted, never reused.
#[derive(Clone)]
pub struct PkceParams {
    pub code_verifier: String,
    pub code_challenge: String,
    pub state: String,
}

impl std::fmt::Debug for PkceParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceParams")
            .field("code_verifier", &"<redacted>")
            .field("code_challenge", &self.code_challenge)
            .field("state", &"<redacted>")
            .finish()
    }
}

impl PkceParams {
    /// Draw a fresh verifier and an independent state token from the OS CSPRNG.
    pub fn generate() -> OAuth2Result<Self> {
        let code_verifier = random_token(VERIFIER_BYTES)?;
        let code_challenge = code_challenge(&code_verifier);
        let state = random_token(STATE_BYTES)?;

        Ok(Self {
            code_verifier,
            code_challenge,
            state,
        })
    }
}

/// `base64url(SHA-256(verifier))` without padding.
pub fn code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

fn random_token(len: usize) -> OAuth2Result<String> {
    let mut bytes = vec![0u8; len];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
