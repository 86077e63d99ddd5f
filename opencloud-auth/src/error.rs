//! Error types for the `opencloud-auth` crate.
//!
//! Follows the same pattern as the rest of the workspace with a root Error struct and error kind enums.

use std::error::Error as StdError;
use std::fmt;

/// Boxed error returned by webhook event handlers.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Top-level error type for opencloud-auth crate.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<BoxError>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in opencloud-auth.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    OAuth(OAuthErrorKind),
    Token(TokenErrorKind),
    Webhook(WebhookErrorKind),
    Http(HttpErrorKind),
}

/// Errors from the OAuth endpoints, translated from HTTP status and body.
#[derive(Debug, PartialEq)]
pub enum OAuthErrorKind {
    /// Bad, expired or revoked credential or token (HTTP 400, or 401 on token use).
    InvalidKey,
    /// The authorization code or refresh grant was rejected (HTTP 401 on the token endpoint).
    InvalidAuthorizationCode,
    /// The token lacks the named scope.
    InsufficientScope(String),
    /// 5xx, transport failure or certs fetch failure.
    ServiceUnavailable,
    /// Any other non-success status.
    UnexpectedStatus(u16),
    /// A success response whose body could not be mapped.
    InvalidResponse,
}

/// Errors from signed token (ES256 JWT) verification.
#[derive(Debug, PartialEq)]
pub enum TokenErrorKind {
    Malformed,
    UnsupportedAlgorithm,
    InvalidSignature,
    Expired,
    AudienceMismatch,
    InvalidKeyMaterial,
}

/// Errors from webhook validation and dispatch.
#[derive(Debug, PartialEq)]
pub enum WebhookErrorKind {
    MissingSignature,
    InvalidSignature,
    TimestampExpired,
    InvalidPayload,
    /// The payload's `EventType` is not one this crate knows about.
    UnknownEventType,
    /// The event type is known but no handler was registered for it.
    UndefinedEventType,
    /// A handler was registered under a name outside the known set.
    InvalidEventName,
    /// A registered handler returned an error.
    Handler,
}

/// Errors from HTTP client operations.
#[derive(Debug, PartialEq)]
pub enum HttpErrorKind {
    BuilderFailed,
    RequestFailed,
    Network,
}

impl Error {
    /// Returns the OAuth error kind, if this is an OAuth error.
    pub fn oauth_kind(&self) -> Option<&OAuthErrorKind> {
        match &self.error_kind {
            ErrorKind::OAuth(kind) => Some(kind),
            _ => None,
        }
    }

    /// Returns the token error kind, if this is a token verification error.
    pub fn token_kind(&self) -> Option<&TokenErrorKind> {
        match &self.error_kind {
            ErrorKind::Token(kind) => Some(kind),
            _ => None,
        }
    }

    /// Returns the webhook error kind, if this is a webhook error.
    pub fn webhook_kind(&self) -> Option<&WebhookErrorKind> {
        match &self.error_kind {
            ErrorKind::Webhook(kind) => Some(kind),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::OAuth(kind) => write!(f, "OAuth error: {:?}", kind)?,
            ErrorKind::Token(kind) => write!(f, "Token error: {:?}", kind)?,
            ErrorKind::Webhook(kind) => write!(f, "Webhook error: {:?}", kind)?,
            ErrorKind::Http(kind) => write!(f, "HTTP error: {:?}", kind)?,
        }
        if let Some(source) = &self.source {
            write!(f, " ({})", source)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = if err.is_builder() {
            ErrorKind::Http(HttpErrorKind::BuilderFailed)
        } else if err.is_request() {
            ErrorKind::Http(HttpErrorKind::RequestFailed)
        } else {
            ErrorKind::Http(HttpErrorKind::Network)
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

/// Helper function to create OAuth errors.
pub fn oauth_error(kind: OAuthErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::OAuth(kind),
    }
}

/// Wraps a transport failure as `ServiceUnavailable`, keeping the cause as source.
pub fn service_unavailable(cause: Error) -> Error {
    Error {
        source: Some(Box::new(cause)),
        error_kind: ErrorKind::OAuth(OAuthErrorKind::ServiceUnavailable),
    }
}

/// Helper function to create token errors.
pub fn token_error(kind: TokenErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Token(kind),
    }
}

/// Helper function to create webhook errors.
pub fn webhook_error(kind: WebhookErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Webhook(kind),
    }
}
