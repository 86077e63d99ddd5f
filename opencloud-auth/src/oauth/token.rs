//! Access token, introspection and user info models.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::codec::TokenClaims;
use crate::error::{oauth_error, Error, OAuthErrorKind};
use crate::json::parse_id;

/// Split a space-delimited scope string into a set, ignoring empty entries.
pub(crate) fn split_scope(scope: &str) -> BTreeSet<String> {
    scope
        .split(' ')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Token endpoint response body.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// The user an access token was granted by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: u64,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub headshot_uri: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl UserInfo {
    /// Map a userinfo body or ID token claim set.
    ///
    /// The id is read from `id`, falling back to `sub`. Both strings and
    /// numbers are accepted.
    pub(crate) fn from_fields(fields: &Map<String, Value>) -> Option<Self> {
        let id = ["id", "sub"]
            .iter()
            .filter_map(|name| fields.get(*name))
            .find_map(parse_id)?;
        let text = |name: &str| fields.get(name).and_then(Value::as_str).map(str::to_string);

        Some(Self {
            id,
            username: text("preferred_username"),
            display_name: text("nickname"),
            headshot_uri: text("picture"),
            created_at: fields
                .get("created_at")
                .and_then(Value::as_i64)
                .filter(|ts| *ts != 0)
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        })
    }

    /// Map verified ID token claims.
    pub(crate) fn from_claims(claims: &TokenClaims) -> Option<Self> {
        let mut fields = claims.extra.clone();
        fields
            .entry("sub")
            .or_insert_with(|| Value::String(claims.subject_id.clone()));
        Self::from_fields(&fields)
    }
}

/// A token granted through the authorization code or refresh flows.
///
/// The token strings are held as secrets and are not printed by `Debug`.
#[derive(Clone)]
pub struct AccessToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
    scope: BTreeSet<String>,
    refresh_token: Option<SecretString>,
    user: Option<UserInfo>,
}

impl AccessToken {
    pub(crate) fn from_response(
        response: TokenResponse,
        user: Option<UserInfo>,
        now: DateTime<Utc>,
    ) -> Self {
        // Lifetimes past what chrono can represent saturate.
        let expires_at = Duration::try_seconds(response.expires_in.unwrap_or(0).max(0))
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            token: SecretString::new(response.access_token),
            expires_at,
            scope: response.scope.as_deref().map(split_scope).unwrap_or_default(),
            refresh_token: response.refresh_token.map(SecretString::new),
            user,
        }
    }

    /// The bearer token string.
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn scope(&self) -> &BTreeSet<String> {
        &self.scope
    }

    pub fn refresh_token(&self) -> Option<&SecretString> {
        self.refresh_token.as_ref()
    }

    /// Identity from a verified ID token. Absent after a refresh or when the
    /// ID token could not be verified.
    pub fn user(&self) -> Option<&UserInfo> {
        self.user.as_ref()
    }

    /// `Authorization` header value for API calls made with this token.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("user", &self.user)
            .finish()
    }
}

/// Token introspection result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIntrospection {
    pub active: bool,
    /// Token id (`jti`).
    pub id: Option<String>,
    pub client_id: Option<u64>,
    pub user_id: Option<u64>,
    pub scope: BTreeSet<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub issued_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct IntrospectionBody {
    #[serde(default)]
    active: bool,
    #[serde(default)]
    jti: Option<String>,
    #[serde(default)]
    client_id: Option<Value>,
    #[serde(default)]
    sub: Option<Value>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    iat: Option<i64>,
}

impl TokenIntrospection {
    pub(crate) fn from_body(body: Value) -> Result<Self, Error> {
        let body: IntrospectionBody = serde_json::from_value(body).map_err(|e| {
            oauth_error(
                OAuthErrorKind::InvalidResponse,
                &format!("unexpected introspection response: {}", e),
            )
        })?;
        let timestamp = |ts: Option<i64>| ts.and_then(|ts| Utc.timestamp_opt(ts, 0).single());

        Ok(Self {
            active: body.active,
            id: body.jti,
            client_id: body.client_id.as_ref().and_then(parse_id),
            user_id: body.sub.as_ref().and_then(parse_id),
            scope: body.scope.as_deref().map(split_scope).unwrap_or_default(),
            expires_at: timestamp(body.exp),
            issued_at: timestamp(body.iat),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_scope() {
        let scope = split_scope("openid profile  universe-messaging-service:publish");
        assert_eq!(scope.len(), 3);
        assert!(scope.contains("openid"));
        assert!(split_scope("").is_empty());
    }

    #[test]
    fn test_access_token_from_response() {
        let now = Utc::now();
        let response: TokenResponse = serde_json::from_value(json!({
            "access_token": "at",
            "refresh_token": "rt",
            "token_type": "Bearer",
            "expires_in": 899,
            "scope": "openid profile",
        }))
        .unwrap();

        let token = AccessToken::from_response(response, None, now);
        assert_eq!(token.token().expose_secret(), "at");
        assert_eq!(token.refresh_token().map(|t| t.expose_secret().as_str()), Some("rt"));
        assert_eq!(token.expires_at(), now + Duration::seconds(899));
        assert!(!token.is_expired(now));
        assert!(token.is_expired(now + Duration::seconds(899)));
        assert_eq!(token.scope().len(), 2);
        assert_eq!(token.authorization_header(), "Bearer at");
        assert!(token.user().is_none());
    }

    #[test]
    fn test_huge_expires_in_saturates() {
        let now = Utc::now();
        for expires_in in [9_000_000_000_000, i64::MAX] {
            let response: TokenResponse = serde_json::from_value(json!({
                "access_token": "at",
                "expires_in": expires_in,
            }))
            .unwrap();

            let token = AccessToken::from_response(response, None, now);
            assert_eq!(token.expires_at(), DateTime::<Utc>::MAX_UTC);
            assert!(!token.is_expired(now));
        }
    }

    #[test]
    fn test_negative_expires_in_is_already_expired() {
        let now = Utc::now();
        let response: TokenResponse =
            serde_json::from_value(json!({ "access_token": "at", "expires_in": -5 })).unwrap();

        let token = AccessToken::from_response(response, None, now);
        assert_eq!(token.expires_at(), now);
        assert!(token.is_expired(now));
    }

    #[test]
    fn test_access_token_debug_hides_secrets() {
        let response: TokenResponse = serde_json::from_value(json!({
            "access_token": "super-secret-access",
            "refresh_token": "super-secret-refresh",
            "expires_in": 60,
        }))
        .unwrap();

        let printed = format!("{:?}", AccessToken::from_response(response, None, Utc::now()));
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("has_refresh_token: true"));
    }

    #[test]
    fn test_user_info_from_fields() {
        let fields = json!({
            "sub": "1234",
            "preferred_username": "builderman",
            "nickname": "Builderman",
            "picture": "https://example.com/headshot.png",
            "created_at": 1_136_073_600,
        });

        let user = UserInfo::from_fields(fields.as_object().unwrap()).unwrap();
        assert_eq!(user.id, 1234);
        assert_eq!(user.username.as_deref(), Some("builderman"));
        assert_eq!(user.display_name.as_deref(), Some("Builderman"));
        assert_eq!(user.headshot_uri.as_deref(), Some("https://example.com/headshot.png"));
        assert_eq!(user.created_at.map(|t| t.timestamp()), Some(1_136_073_600));
    }

    #[test]
    fn test_user_info_prefers_id_over_sub() {
        let fields = json!({ "id": 5, "sub": "1234" });
        assert_eq!(UserInfo::from_fields(fields.as_object().unwrap()).unwrap().id, 5);

        let fields = json!({ "preferred_username": "nobody" });
        assert!(UserInfo::from_fields(fields.as_object().unwrap()).is_none());
    }

    #[test]
    fn test_introspection_from_body() {
        let info = TokenIntrospection::from_body(json!({
            "active": true,
            "jti": "RT.abc",
            "iss": "https://apis.roblox.com/oauth/",
            "token_type": "Bearer",
            "client_id": "42",
            "aud": "42",
            "sub": "1234",
            "scope": "openid universe-messaging-service:publish",
            "exp": 1_700_000_900,
            "iat": 1_700_000_000,
        }))
        .unwrap();

        assert!(info.active);
        assert_eq!(info.id.as_deref(), Some("RT.abc"));
        assert_eq!(info.client_id, Some(42));
        assert_eq!(info.user_id, Some(1234));
        assert!(info.scope.contains("universe-messaging-service:publish"));
        assert_eq!(info.expires_at.map(|t| t.timestamp()), Some(1_700_000_900));
        assert_eq!(info.issued_at.map(|t| t.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn test_inactive_introspection() {
        let info = TokenIntrospection::from_body(json!({ "active": false })).unwrap();
        assert!(!info.active);
        assert!(info.scope.is_empty());
        assert_eq!(info.user_id, None);

        let err = TokenIntrospection::from_body(json!("nope")).unwrap_err();
        assert_eq!(err.oauth_kind(), Some(&OAuthErrorKind::InvalidResponse));
    }
}
