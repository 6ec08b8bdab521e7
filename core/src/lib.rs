//! Networking core for the cooking app's backend.
//!
//! # Overview
//! Every backend call is a single form-encoded POST to
//! `base_url + endpoint`, answered with a JSON envelope
//! `{"message", "code", "data"}`. This crate wraps that round trip:
//! an [`ApiRequest`] sends the call through an injected [`Transport`],
//! normalizes the reply into an [`ApiResponse`], and an [`ApiService`]
//! decodes it into a typed result or an [`ApiError`].
//!
//! # Design
//! - [`ApiClient`] carries the shared state (config, transport, cookie jar,
//!   decoder). It is built once and cloned into every request.
//! - Completion is a closure passed at start time; there is no delegate.
//! - Cookies returned by the server are written back to the client's jar and
//!   sent with every request built afterwards.
//! - No retries, no queuing: one call, one callback.

pub mod client;
pub mod config;
pub mod cookies;
pub mod decode;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod params;
pub mod request;
pub mod response;
pub mod service;
#[cfg(any(feature = "test-utils", test))]
pub mod testing;
pub mod transport;

pub use client::ApiClient;
pub use config::{ClientConfig, DEFAULT_BASE_URL};
pub use cookies::{CookieAcceptPolicy, CookieJar, SESSION_COOKIE_NAME};
pub use decode::{ApiDecoder, KeyDecodingStrategy};
pub use endpoint::EndpointRepresentable;
pub use error::{ApiError, DecodeError, TransportError, DEFAULT_ERROR_MESSAGE};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use params::{IntoParam, ParamValue, Parameters};
pub use request::{ApiRequest, RequestOutcome};
pub use response::{ApiResponse, Envelope};
pub use service::{ApiService, CompletionBlock, DecodingHandler, FailureBlock, ResponseHandler};
pub use transport::{CancellationToken, Transport, TransportCallback, TransportResult, UreqTransport};

pub use cookie::Cookie;
