//! HTTP transport for the Open Cloud API.

mod client;
mod transport;

pub use client::{HttpClientConfig, ReqwestTransport, ReqwestTransportBuilder, DEFAULT_BASE_URL};
pub use transport::{ApiRequest, ApiResponse, Transport};
