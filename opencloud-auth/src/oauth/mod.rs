//! OAuth 2.0 authorization code flow with PKCE and ID token verification.

mod app;
pub mod codec;
mod keys;
mod pkce;
mod resources;
mod token;

pub use app::{OAuthApp, AUTHORIZE_ENDPOINT};
pub use codec::TokenClaims;
pub use keys::{KeyCache, DEFAULT_KEY_CACHE_TTL_SECONDS};
pub use pkce::{PkceChallenge, PkceVerifier, DEFAULT_VERIFIER_LENGTH};
pub use resources::{Account, ExperienceRef, Resources};
pub use token::{AccessToken, TokenIntrospection, UserInfo};
