//! Time-bounded cache of the provider's OpenID signing keys.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use p256::ecdsa::VerifyingKey;
use p256::EncodedPoint;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::codec::decode_base64url;
use crate::error::{
    oauth_error, service_unavailable, token_error, Error, OAuthErrorKind, TokenErrorKind,
};
use crate::http::{ApiRequest, Transport};

/// Default number of seconds fetched keys are reused for.
pub const DEFAULT_KEY_CACHE_TTL_SECONDS: u64 = 3600;

pub(crate) const CERTS_PATH: &str = "oauth/v1/certs";

const COORDINATE_LEN: usize = 32;

#[derive(Debug, Deserialize)]
struct JwkSet {
    #[serde(default)]
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
}

impl Jwk {
    fn to_verifying_key(&self) -> Result<VerifyingKey, Error> {
        let (x, y) = match (&self.x, &self.y) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(invalid_key_material("missing x or y coordinate")),
        };
        let x = coordinate(x)?;
        let y = coordinate(y)?;

        // Uncompressed SEC1 point: 0x04 || x || y
        let mut point_bytes = Vec::with_capacity(1 + 2 * COORDINATE_LEN);
        point_bytes.push(0x04);
        point_bytes.extend_from_slice(&x);
        point_bytes.extend_from_slice(&y);

        let point = EncodedPoint::from_bytes(&point_bytes)
            .map_err(|e| invalid_key_material(&format!("invalid encoded point: {}", e)))?;
        VerifyingKey::from_encoded_point(&point)
            .map_err(|e| invalid_key_material(&format!("invalid public key: {}", e)))
    }
}

fn invalid_key_material(message: &str) -> Error {
    token_error(TokenErrorKind::InvalidKeyMaterial, message)
}

/// Decode a base64url coordinate, left-padding it with zeros to 32 bytes.
fn coordinate(encoded: &str) -> Result<[u8; COORDINATE_LEN], Error> {
    let bytes = decode_base64url(encoded)
        .map_err(|e| invalid_key_material(&format!("invalid coordinate: {}", e)))?;
    if bytes.len() > COORDINATE_LEN {
        return Err(invalid_key_material(&format!(
            "coordinate is {} bytes long",
            bytes.len()
        )));
    }
    let mut padded = [0u8; COORDINATE_LEN];
    padded[COORDINATE_LEN - bytes.len()..].copy_from_slice(&bytes);
    Ok(padded)
}

struct CachedKeys {
    keys: Arc<[VerifyingKey]>,
    fetched_at: DateTime<Utc>,
}

/// Caches the certs endpoint's keys for a fixed TTL.
///
/// Concurrent callers that all observe an expired entry each fetch, and the
/// last writer wins. Keys and fetch time are always replaced together.
pub struct KeyCache {
    ttl: Duration,
    state: RwLock<Option<CachedKeys>>,
}

impl KeyCache {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl: Duration::seconds(
                i64::try_from(ttl_seconds)
                    .unwrap_or(i64::MAX)
                    .min(i64::MAX / 1000),
            ),
            state: RwLock::new(None),
        }
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Return the cached keys, fetching them when absent or older than the TTL.
    pub async fn get_keys<T>(
        &self,
        transport: &T,
        now: DateTime<Utc>,
    ) -> Result<Arc<[VerifyingKey]>, Error>
    where
        T: Transport + ?Sized,
    {
        if let Some(cached) = self.state.read().await.as_ref() {
            if now - cached.fetched_at <= self.ttl {
                return Ok(Arc::clone(&cached.keys));
            }
            debug!("OpenID certs cached at {} have expired", cached.fetched_at);
        }

        let keys = fetch_keys(transport).await?;
        *self.state.write().await = Some(CachedKeys {
            keys: Arc::clone(&keys),
            fetched_at: now,
        });
        Ok(keys)
    }

    /// Drop cached keys so the next call fetches.
    pub async fn clear(&self) {
        *self.state.write().await = None;
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_CACHE_TTL_SECONDS)
    }
}

async fn fetch_keys<T>(transport: &T) -> Result<Arc<[VerifyingKey]>, Error>
where
    T: Transport + ?Sized,
{
    let response = transport
        .send_request(ApiRequest::get(CERTS_PATH))
        .await
        .map_err(service_unavailable)?;

    if !response.is_success() {
        warn!("Fetching OpenID certs failed with HTTP {}", response.status);
        return Err(oauth_error(
            OAuthErrorKind::ServiceUnavailable,
            "Failed to retrieve OpenID certs.",
        ));
    }

    let set: JwkSet = serde_json::from_value(response.body).map_err(|e| {
        warn!("OpenID certs response is not a key set: {}", e);
        oauth_error(
            OAuthErrorKind::ServiceUnavailable,
            "Failed to retrieve OpenID certs.",
        )
    })?;

    let keys: Vec<VerifyingKey> = set
        .keys
        .iter()
        .filter_map(|jwk| match jwk.to_verifying_key() {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Skipping OpenID cert {:?}: {}", jwk.kid, e);
                None
            }
        })
        .collect();

    info!("Fetched {} OpenID signing key(s)", keys.len());
    Ok(keys.into())
}
