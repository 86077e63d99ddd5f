//! ES256 JWT verification.
//!
//! Only what ID tokens need: compact serialization, the ES256 algorithm,
//! and the `exp`/`aud` claims. The algorithm is pinned, so a token header
//! naming anything else is rejected before any key is tried.

use std::collections::BTreeSet;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Utc};
use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::token::split_scope;
use crate::error::{token_error, Error, TokenErrorKind};

/// The only accepted signing algorithm.
pub const ALGORITHM: &str = "ES256";

/// base64url that accepts input with or without trailing padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub(crate) fn decode_base64url(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_LENIENT.decode(input)
}

/// Verified claims of an ID token.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenClaims {
    #[serde(rename = "sub")]
    pub subject_id: String,
    #[serde(rename = "aud", deserialize_with = "one_or_many")]
    pub audience: Vec<String>,
    #[serde(rename = "iat", default, with = "chrono::serde::ts_seconds_option")]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "scope_set")]
    pub scope: BTreeSet<String>,
    /// Every other claim, e.g. `preferred_username` or `picture`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    /// Read a string claim that was not mapped to a field.
    pub fn extra_str(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(Value::as_str)
    }
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

fn scope_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(split_scope).unwrap_or_default())
}

fn decode_segment<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T, Error> {
    let bytes = decode_base64url(segment).map_err(|e| {
        token_error(TokenErrorKind::Malformed, &format!("invalid {} encoding: {}", what, e))
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        token_error(TokenErrorKind::Malformed, &format!("invalid {} JSON: {}", what, e))
    })
}

/// Verify `token` against `keys` in order and check its expiry and audience.
///
/// The signature must be valid for at least one key. `exp` must be strictly
/// after `now` and `aud` must contain `audience`.
pub fn verify(
    token: &str,
    keys: &[VerifyingKey],
    audience: &str,
    now: DateTime<Utc>,
) -> Result<TokenClaims, Error> {
    let mut segments = token.split('.');
    let (header_b64, payload_b64, signature_b64) =
        match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(header), Some(payload), Some(signature), None) => (header, payload, signature),
            _ => {
                return Err(token_error(
                    TokenErrorKind::Malformed,
                    "token must have exactly three segments",
                ))
            }
        };

    let header: Header = decode_segment(header_b64, "header")?;
    if header.alg != ALGORITHM {
        return Err(token_error(
            TokenErrorKind::UnsupportedAlgorithm,
            &format!("unsupported algorithm: {}", header.alg),
        ));
    }

    let signature_bytes = decode_base64url(signature_b64).map_err(|e| {
        token_error(TokenErrorKind::Malformed, &format!("invalid signature encoding: {}", e))
    })?;
    // ES256 signatures are the raw 64-byte r || s
    let signature = Signature::from_slice(&signature_bytes).map_err(|e| {
        token_error(TokenErrorKind::InvalidSignature, &format!("invalid signature: {}", e))
    })?;

    let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];
    if !keys
        .iter()
        .any(|key| key.verify(signing_input.as_bytes(), &signature).is_ok())
    {
        return Err(token_error(
            TokenErrorKind::InvalidSignature,
            "signature does not match any known key",
        ));
    }

    let claims: TokenClaims = decode_segment(payload_b64, "payload")?;

    if claims.expires_at <= now {
        return Err(token_error(TokenErrorKind::Expired, "token has expired"));
    }
    if !claims.audience.iter().any(|aud| aud == audience) {
        return Err(token_error(
            TokenErrorKind::AudienceMismatch,
            "token was issued for another audience",
        ));
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sign_token, signing_key};
    use chrono::Duration;
    use serde_json::json;

    fn claims(now: DateTime<Utc>) -> Value {
        json!({
            "sub": "1234",
            "aud": "42",
            "iat": now.timestamp(),
            "exp": (now + Duration::minutes(5)).timestamp(),
            "scope": "openid profile",
            "preferred_username": "builderman",
        })
    }

    #[test]
    fn test_verify_valid_token() {
        let key = signing_key();
        let now = Utc::now();
        let token = sign_token(&key, &json!({"alg": "ES256", "typ": "JWT"}), &claims(now));

        let verified = verify(&token, &[VerifyingKey::from(&key)], "42", now).unwrap();
        assert_eq!(verified.subject_id, "1234");
        assert_eq!(verified.audience, vec!["42".to_string()]);
        assert_eq!(verified.issued_at.map(|t| t.timestamp()), Some(now.timestamp()));
        assert!(verified.scope.contains("openid"));
        assert!(verified.scope.contains("profile"));
        assert_eq!(verified.extra_str("preferred_username"), Some("builderman"));
    }

    #[test]
    fn test_verify_tries_keys_in_order() {
        let other = signing_key();
        let key = signing_key();
        let now = Utc::now();
        let token = sign_token(&key, &json!({"alg": "ES256"}), &claims(now));

        let keys = [VerifyingKey::from(&other), VerifyingKey::from(&key)];
        assert!(verify(&token, &keys, "42", now).is_ok());
    }

    #[test]
    fn test_verify_rejects_unknown_key() {
        let key = signing_key();
        let now = Utc::now();
        let token = sign_token(&key, &json!({"alg": "ES256"}), &claims(now));

        let err = verify(&token, &[VerifyingKey::from(&signing_key())], "42", now).unwrap_err();
        assert_eq!(err.token_kind(), Some(&TokenErrorKind::InvalidSignature));

        let err = verify(&token, &[], "42", now).unwrap_err();
        assert_eq!(err.token_kind(), Some(&TokenErrorKind::InvalidSignature));
    }

    #[test]
    fn test_verify_rejects_other_algorithms() {
        let key = signing_key();
        let now = Utc::now();
        for alg in ["none", "HS256", "RS256", "ES384"] {
            let token = sign_token(&key, &json!({"alg": alg}), &claims(now));
            let err = verify(&token, &[VerifyingKey::from(&key)], "42", now).unwrap_err();
            assert_eq!(err.token_kind(), Some(&TokenErrorKind::UnsupportedAlgorithm));
        }
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        let key = signing_key();
        let now = Utc::now();
        let token = sign_token(&key, &json!({"alg": "ES256"}), &claims(now));

        let mut tampered = claims(now);
        tampered["sub"] = json!("9999");
        let forged_payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(&tampered).unwrap());
        let parts: Vec<&str> = token.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        let err = verify(&forged, &[VerifyingKey::from(&key)], "42", now).unwrap_err();
        assert_eq!(err.token_kind(), Some(&TokenErrorKind::InvalidSignature));
    }

    #[test]
    fn test_verify_checks_expiry_strictly() {
        let key = signing_key();
        let now = Utc::now();
        let mut expired = claims(now);
        expired["exp"] = json!(now.timestamp());
        let token = sign_token(&key, &json!({"alg": "ES256"}), &expired);

        let err = verify(&token, &[VerifyingKey::from(&key)], "42", now).unwrap_err();
        assert_eq!(err.token_kind(), Some(&TokenErrorKind::Expired));
    }

    #[test]
    fn test_verify_checks_audience() {
        let key = signing_key();
        let now = Utc::now();
        let token = sign_token(&key, &json!({"alg": "ES256"}), &claims(now));

        let err = verify(&token, &[VerifyingKey::from(&key)], "43", now).unwrap_err();
        assert_eq!(err.token_kind(), Some(&TokenErrorKind::AudienceMismatch));

        let mut many = claims(now);
        many["aud"] = json!(["7", "42"]);
        let token = sign_token(&key, &json!({"alg": "ES256"}), &many);
        assert!(verify(&token, &[VerifyingKey::from(&key)], "42", now).is_ok());
    }

    #[test]
    fn test_verify_rejects_malformed_tokens() {
        let key = signing_key();
        let now = Utc::now();
        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.e30.AAAA"] {
            let err = verify(token, &[VerifyingKey::from(&key)], "42", now).unwrap_err();
            assert_eq!(err.token_kind(), Some(&TokenErrorKind::Malformed), "{}", token);
        }
    }

    #[test]
    fn test_decode_accepts_padding() {
        assert_eq!(decode_base64url("YQ").unwrap(), b"a");
        assert_eq!(decode_base64url("YQ==").unwrap(), b"a");
        assert_eq!(decode_base64url("-_8").unwrap(), vec![0xfb, 0xff]);
    }
}
