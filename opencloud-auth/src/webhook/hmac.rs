//! HMAC-SHA256 webhook signature validation.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretVec};
use sha2::Sha256;

use crate::error::{webhook_error, Error, WebhookErrorKind};

type HmacSha256 = Hmac<Sha256>;

/// Maximum distance in seconds between a signature's timestamp and now.
pub const REPLAY_WINDOW_SECONDS: i64 = 600;

/// Parsed `t=<unix>,v1=<base64>` signature header.
#[derive(Debug, PartialEq)]
struct SignatureHeader<'a> {
    /// The timestamp exactly as sent; it is part of the signed message.
    raw_timestamp: &'a str,
    timestamp: i64,
    signatures: Vec<&'a str>,
}

impl<'a> SignatureHeader<'a> {
    fn parse(header: &'a str) -> Option<Self> {
        let mut raw_timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) if raw_timestamp.is_none() => raw_timestamp = Some(value),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let raw_timestamp = raw_timestamp?;
        let timestamp = raw_timestamp.parse().ok()?;
        if signatures.is_empty() {
            return None;
        }
        Some(Self {
            raw_timestamp,
            timestamp,
            signatures,
        })
    }
}

/// Validates webhook signatures with a shared secret.
///
/// The signed message is `"{t}.{body}"` and the signature is the standard
/// base64 encoding of its HMAC-SHA256.
pub struct HmacWebhookValidator {
    secret: SecretVec<u8>,
}

impl HmacWebhookValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret: SecretVec::new(secret),
        }
    }

    /// Check `header` against `body`.
    pub fn validate(&self, header: Option<&str>, body: &[u8]) -> Result<(), Error> {
        let header = header.ok_or_else(|| {
            webhook_error(WebhookErrorKind::MissingSignature, "Missing signature header")
        })?;
        let parsed = SignatureHeader::parse(header).ok_or_else(|| {
            webhook_error(WebhookErrorKind::InvalidSignature, "Invalid signature format")
        })?;

        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret())
            .map_err(|_| webhook_error(WebhookErrorKind::InvalidSignature, "Invalid HMAC key"))?;
        mac.update(parsed.raw_timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);

        let matches = parsed.signatures.iter().any(|signature| {
            STANDARD
                .decode(signature)
                .map(|expected| mac.clone().verify_slice(&expected).is_ok())
                .unwrap_or(false)
        });

        if matches {
            Ok(())
        } else {
            Err(webhook_error(
                WebhookErrorKind::InvalidSignature,
                "Signature does not match",
            ))
        }
    }
}

/// Reject a header whose timestamp is outside the replay window around `now`.
///
/// Headers without a readable timestamp pass; when a secret is configured
/// they have already been rejected by [`HmacWebhookValidator::validate`].
pub fn check_timestamp(header: Option<&str>, now: DateTime<Utc>) -> Result<(), Error> {
    let Some(parsed) = header.and_then(SignatureHeader::parse) else {
        return Ok(());
    };
    let age = now.timestamp().saturating_sub(parsed.timestamp);
    if age.saturating_abs() > REPLAY_WINDOW_SECONDS {
        return Err(webhook_error(
            WebhookErrorKind::TimestampExpired,
            &format!("Signature timestamp is {} seconds away from now", age),
        ));
    }
    Ok(())
}

/// Compute the header value for `body` signed at `timestamp`.
pub fn sign(secret: &[u8], timestamp: i64, body: &[u8]) -> Result<String, Error> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| webhook_error(WebhookErrorKind::InvalidSignature, "Invalid HMAC key"))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(format!(
        "t={},v1={}",
        timestamp,
        STANDARD.encode(mac.finalize().into_bytes())
    ))
}
