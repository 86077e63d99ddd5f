//! PKCE (Proof Key for Code Exchange) support for OAuth 2.0.
//!
//! Implements RFC 7636 for securing authorization code flows in public clients.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Default code verifier length.
pub const DEFAULT_VERIFIER_LENGTH: usize = 128;

/// Unreserved URI characters (RFC 3986 section 2.3).
const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// PKCE code verifier (random string).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Generate a new random PKCE verifier of exactly `length` characters.
    ///
    /// Characters are drawn from the unreserved URI set with a CSPRNG.
    /// RFC 7636 asks for 43 to 128 characters; other lengths are not rejected.
    pub fn generate(length: usize) -> Self {
        let mut rng = rand::thread_rng();
        let verifier = (0..length)
            .map(|_| UNRESERVED[rng.gen_range(0..UNRESERVED.len())] as char)
            .collect();
        Self(verifier)
    }

    /// Create a PKCE verifier from an existing string.
    pub fn from_string(verifier: String) -> Self {
        Self(verifier)
    }

    /// Get the verifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Generate the corresponding code challenge.
    pub fn challenge(&self) -> PkceChallenge {
        PkceChallenge::from_verifier(self)
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::generate(DEFAULT_VERIFIER_LENGTH)
    }
}

/// PKCE code challenge (SHA256 hash of verifier).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    /// Challenge method sent alongside the challenge.
    pub const METHOD: &'static str = "S256";

    /// Create a code challenge from a verifier.
    ///
    /// Uses SHA256 hashing and unpadded base64url encoding as per RFC 7636.
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_str().as_bytes());
        let hash = hasher.finalize();
        let challenge = URL_SAFE_NO_PAD.encode(hash);
        Self(challenge)
    }

    /// Get the challenge string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
