//! The OAuth 2.0 authorization code flow against Open Cloud.

use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use super::codec;
use super::keys::{KeyCache, DEFAULT_KEY_CACHE_TTL_SECONDS};
use super::pkce::{PkceChallenge, PkceVerifier};
use super::resources::Resources;
use super::token::{AccessToken, TokenIntrospection, TokenResponse, UserInfo};
use crate::error::{oauth_error, service_unavailable, Error, OAuthErrorKind};
use crate::http::{ApiRequest, ApiResponse, ReqwestTransport, Transport};

/// Default authorization endpoint users are sent to.
pub const AUTHORIZE_ENDPOINT: &str = "https://apis.roblox.com/oauth/v1/authorize";

const TOKEN_PATH: &str = "oauth/v1/token";
const REVOKE_PATH: &str = "oauth/v1/token/revoke";
const RESOURCES_PATH: &str = "oauth/v1/token/resources";
const INTROSPECT_PATH: &str = "oauth/v1/token/introspect";
const USERINFO_PATH: &str = "oauth/v1/userinfo";

/// How an endpoint reports HTTP 401.
#[derive(Debug, Clone, Copy)]
enum Unauthorized {
    /// The grant (code or refresh token) was rejected.
    InvalidGrant,
    /// The access token was rejected.
    InvalidToken,
    /// 401 has no special meaning for this endpoint.
    Unexpected,
}

/// Translate a non-success response into an error.
fn status_error(response: &ApiResponse, unauthorized: Unauthorized) -> Error {
    if response.body_str("error") == Some("insufficient_scope") {
        let scope = response.body_str("scope").unwrap_or_default();
        return oauth_error(
            OAuthErrorKind::InsufficientScope(scope.to_string()),
            &format!("Access token missing required scope: '{}'", scope),
        );
    }

    let description = response.body_str("error_description");
    match (response.status, unauthorized) {
        (400, _) => oauth_error(
            OAuthErrorKind::InvalidKey,
            description.unwrap_or("The client id, client secret, or redirect uri is invalid."),
        ),
        (401, Unauthorized::InvalidGrant) => oauth_error(
            OAuthErrorKind::InvalidAuthorizationCode,
            description.unwrap_or("The code is invalid, or has been used."),
        ),
        (401, Unauthorized::InvalidToken) => oauth_error(
            OAuthErrorKind::InvalidKey,
            description.unwrap_or("The key has expired, been revoked or is invalid."),
        ),
        (status, _) if status >= 500 => oauth_error(
            OAuthErrorKind::ServiceUnavailable,
            "The service is unavailable or has encountered an error.",
        ),
        (status, _) => oauth_error(
            OAuthErrorKind::UnexpectedStatus(status),
            &format!("Unexpected HTTP {}", status),
        ),
    }
}

/// A registered OAuth 2.0 application.
///
/// Holds the client credentials and the OpenID key cache. The client secret
/// is only ever sent to the token endpoints and is not exposed publicly.
pub struct OAuthApp<T: Transport = ReqwestTransport> {
    client_id: u64,
    client_secret: SecretString,
    redirect_uri: String,
    authorization_endpoint: String,
    key_cache: KeyCache,
    transport: T,
}

impl OAuthApp<ReqwestTransport> {
    /// Create an app that talks to the default Open Cloud base URL.
    pub fn new(
        client_id: u64,
        client_secret: SecretString,
        redirect_uri: &str,
    ) -> Result<Self, Error> {
        Ok(Self::with_transport(
            client_id,
            client_secret,
            redirect_uri,
            ReqwestTransport::new()?,
        ))
    }
}

impl<T: Transport> OAuthApp<T> {
    pub fn with_transport(
        client_id: u64,
        client_secret: SecretString,
        redirect_uri: &str,
        transport: T,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri: redirect_uri.to_string(),
            authorization_endpoint: AUTHORIZE_ENDPOINT.to_string(),
            key_cache: KeyCache::new(DEFAULT_KEY_CACHE_TTL_SECONDS),
            transport,
        }
    }

    /// Set how long fetched OpenID certs are reused.
    pub fn with_key_cache_ttl(mut self, ttl_seconds: u64) -> Self {
        self.key_cache = KeyCache::new(ttl_seconds);
        self
    }

    pub fn with_authorization_endpoint(mut self, endpoint: &str) -> Self {
        self.authorization_endpoint = endpoint.to_string();
        self
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn key_cache(&self) -> &KeyCache {
        &self.key_cache
    }

    pub(crate) fn client_secret(&self) -> &str {
        self.client_secret.expose_secret()
    }

    /// Generate a PKCE code verifier of `length` unreserved characters.
    ///
    /// The same verifier must be passed to [`Self::generate_authorization_uri`]
    /// and [`Self::exchange_code`].
    pub fn generate_code_verifier(&self, length: usize) -> String {
        PkceVerifier::generate(length).into_string()
    }

    /// Build the URL to send the user to for consent.
    ///
    /// Parameters without a value are left out. With a `code_verifier` the
    /// S256 challenge is included.
    pub fn generate_authorization_uri<I>(
        &self,
        scopes: I,
        state: Option<&str>,
        issue_code: bool,
        code_verifier: Option<&str>,
    ) -> String
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let scope = scopes
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let challenge = code_verifier
            .map(|verifier| PkceVerifier::from_string(verifier.to_string()).challenge());

        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("client_id", &self.client_id.to_string());
        query.append_pair("scope", &scope);
        if let Some(state) = state {
            query.append_pair("state", state);
        }
        query.append_pair("redirect_uri", &self.redirect_uri);
        query.append_pair("response_type", if issue_code { "code" } else { "none" });
        if let Some(challenge) = &challenge {
            query.append_pair("code_challenge", challenge.as_str());
            query.append_pair("code_challenge_method", PkceChallenge::METHOD);
        }

        format!("{}?{}", self.authorization_endpoint, query.finish())
    }

    /// Exchange an authorization code for an access token.
    ///
    /// An ID token in the response is verified against the provider's keys
    /// and mapped into [`AccessToken::user`]. A token that fails verification
    /// only leaves the user unset. Failing to fetch the keys is an error.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<AccessToken, Error> {
        let mut request = self
            .client_request(TOKEN_PATH)
            .with_form_field("redirect_uri", &self.redirect_uri)
            .with_form_field("grant_type", "authorization_code")
            .with_form_field("code", code);
        if let Some(verifier) = code_verifier {
            request = request.with_form_field("code_verifier", verifier);
        }

        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(status_error(&response, Unauthorized::InvalidGrant));
        }

        let now = Utc::now();
        let body = token_response(response.body)?;
        let user = match &body.id_token {
            Some(id_token) => self.verify_id_token(id_token, now).await?,
            None => None,
        };

        info!("Exchanged authorization code for client {}", self.client_id);
        Ok(AccessToken::from_response(body, user, now))
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The returned token carries a new refresh token; the old one is spent.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<AccessToken, Error> {
        let request = self
            .client_request(TOKEN_PATH)
            .with_form_field("grant_type", "refresh_token")
            .with_form_field("refresh_token", refresh_token);

        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(status_error(&response, Unauthorized::InvalidGrant));
        }

        let body = token_response(response.body)?;
        debug!("Refreshed access token for client {}", self.client_id);
        Ok(AccessToken::from_response(body, None, Utc::now()))
    }

    /// Revoke an access or refresh token.
    pub async fn revoke_token(&self, token: &str) -> Result<(), Error> {
        let request = self
            .client_request(REVOKE_PATH)
            .with_form_field("token", token);

        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(status_error(&response, Unauthorized::Unexpected));
        }
        Ok(())
    }

    /// Revoke the refresh token of `token`, if it has one.
    pub async fn revoke_refresh_token(&self, token: &AccessToken) -> Result<(), Error> {
        match token.refresh_token() {
            Some(refresh_token) => self.revoke_token(refresh_token.expose_secret()).await,
            None => Ok(()),
        }
    }

    /// Fetch the experiences and accounts the user granted.
    pub async fn fetch_resources(&self, access_token: &str) -> Result<Resources, Error> {
        let request = self
            .client_request(RESOURCES_PATH)
            .with_form_field("token", access_token);

        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(status_error(&response, Unauthorized::InvalidToken));
        }
        Resources::from_body(response.body)
    }

    /// Introspect an access token.
    pub async fn fetch_token_info(&self, access_token: &str) -> Result<TokenIntrospection, Error> {
        let request = self
            .client_request(INTROSPECT_PATH)
            .with_form_field("token", access_token);

        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(status_error(&response, Unauthorized::InvalidToken));
        }
        TokenIntrospection::from_body(response.body)
    }

    /// Fetch the profile of the user who granted `access_token`.
    pub async fn fetch_userinfo(&self, access_token: &str) -> Result<UserInfo, Error> {
        let request = ApiRequest::get(USERINFO_PATH)
            .with_header("authorization", &format!("Bearer {}", access_token));

        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(status_error(&response, Unauthorized::InvalidToken));
        }

        response
            .body
            .as_object()
            .and_then(UserInfo::from_fields)
            .ok_or_else(|| {
                oauth_error(
                    OAuthErrorKind::InvalidResponse,
                    "userinfo response has no user id",
                )
            })
    }

    fn client_request(&self, path: &str) -> ApiRequest {
        ApiRequest::post(path)
            .with_form_field("client_id", &self.client_id.to_string())
            .with_form_field("client_secret", self.client_secret())
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        let path = request.path.clone();
        let response = self.transport.send_request(request).await.map_err(|e| {
            warn!("Request to {} failed: {}", path, e);
            service_unavailable(e)
        })?;
        if !response.is_success() {
            warn!("{} returned HTTP {}", path, response.status);
        }
        Ok(response)
    }

    async fn verify_id_token(
        &self,
        id_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserInfo>, Error> {
        let keys = self.key_cache.get_keys(&self.transport, now).await?;
        match codec::verify(id_token, &keys, &self.client_id.to_string(), now) {
            Ok(claims) => Ok(UserInfo::from_claims(&claims)),
            Err(e) => {
                warn!("Ignoring ID token that failed verification: {}", e);
                Ok(None)
            }
        }
    }
}

fn token_response(body: Value) -> Result<TokenResponse, Error> {
    serde_json::from_value(body).map_err(|e| {
        oauth_error(
            OAuthErrorKind::InvalidResponse,
            &format!("unexpected token response: {}", e),
        )
    })
}

impl<T: Transport> fmt::Debug for OAuthApp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthApp")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("key_cache_ttl_seconds", &self.key_cache.ttl_seconds())
            .finish()
    }
}
