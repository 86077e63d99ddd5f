//! # opencloud-auth
//!
//! OAuth 2.0 and webhook plumbing for the Roblox Open Cloud API:
//! - Authorization code flow with PKCE, refresh and revocation
//! - ID token (ES256) verification against cached OpenID certs
//! - Token introspection, granted resources and user info
//! - Webhook signature validation and notification dispatch
//!
//! ## Usage
//!
//! ```rust,ignore
//! use opencloud_auth::oauth::OAuthApp;
//! use opencloud_auth::webhook::{EventKind, Webhook};
//!
//! let app = OAuthApp::new(client_id, client_secret, "https://example.com/callback")?;
//! let verifier = app.generate_code_verifier(128);
//! let uri = app.generate_authorization_uri(["openid", "profile"], Some("state"), true, Some(&verifier));
//! let token = app.exchange_code(&code, Some(&verifier)).await?;
//!
//! let webhook = Webhook::new()
//!     .with_secret(secret)
//!     .on(EventKind::Test, |notification| Ok(()));
//! let response = webhook.process_notification(&body, signature_header)?;
//! ```

pub mod error;
pub mod http;
pub mod oauth;
pub mod webhook;

mod json;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use error::{Error, ErrorKind};
