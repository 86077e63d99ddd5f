//! Shared helpers for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use rand::rngs::OsRng;
use serde_json::{json, Value};

use crate::error::{Error, ErrorKind, HttpErrorKind};
use crate::http::{ApiRequest, ApiResponse, Transport};

/// In-memory transport that replays queued responses and records requests.
///
/// Responses are consumed in order; the last one is repeated.
pub(crate) struct MockTransport {
    responses: Mutex<VecDeque<ApiResponse>>,
    fail: bool,
    calls: AtomicUsize,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub(crate) fn new(status: u16, body: Value) -> Self {
        let transport = Self {
            responses: Mutex::new(VecDeque::new()),
            fail: false,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        };
        transport.push(status, body);
        transport
    }

    /// A transport whose every request fails as if the network were down.
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(200, Value::Null)
        }
    }

    pub(crate) fn push(&self, status: u16, body: Value) {
        self.responses.lock().unwrap().push_back(ApiResponse {
            status,
            body,
            headers: HashMap::new(),
        });
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_request(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        if self.fail {
            return Err(Error {
                source: Some("connection refused".into()),
                error_kind: ErrorKind::Http(HttpErrorKind::Network),
            });
        }

        let mut responses = self.responses.lock().unwrap();
        let response = if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            responses.front().cloned().unwrap()
        };
        Ok(response)
    }
}

pub(crate) fn signing_key() -> SigningKey {
    SigningKey::random(&mut OsRng)
}

/// The public half of `key` as an entry of the certs endpoint.
pub(crate) fn jwk(key: &SigningKey) -> Value {
    let point = key.verifying_key().to_encoded_point(false);
    json!({
        "kty": "EC",
        "crv": "P-256",
        "alg": "ES256",
        "use": "sig",
        "kid": "test-key",
        "x": URL_SAFE_NO_PAD.encode(point.x().unwrap()),
        "y": URL_SAFE_NO_PAD.encode(point.y().unwrap()),
    })
}

/// Sign a compact JWT with `key`, whatever `alg` the header names.
pub(crate) fn sign_token(key: &SigningKey, header: &Value, claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).unwrap());
    let claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
    let signing_input = format!("{}.{}", header, claims);
    let signature: Signature = key.sign(signing_input.as_bytes());
    format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature.to_bytes()))
}
