//! The HTTP transport boundary.
//!
//! # Design
//! The core never opens sockets itself. A [`Transport`] takes an
//! [`HttpRequest`], performs it off the caller's thread (or inline, for
//! canned transports) and reports exactly once through the supplied
//! callback. Every HTTP status is an `Ok` response; only network failures
//! and cancellation are errors.
//!
//! Cancellation is cooperative. A [`CancellationToken`] is handed to the
//! transport with each call; transports check it when they can and report
//! [`TransportError::Cancelled`] through the same callback. Nothing is
//! suppressed: a cancelled call still completes once.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};

pub type TransportResult = Result<HttpResponse, TransportError>;

/// Invoked once per call, on whatever thread the transport completes on.
pub type TransportCallback = Box<dyn FnOnce(TransportResult) + Send + 'static>;

pub trait Transport: Send + Sync {
    fn post(&self, request: HttpRequest, cancel: CancellationToken, on_complete: TransportCallback);
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn post(&self, request: HttpRequest, cancel: CancellationToken, on_complete: TransportCallback) {
        (**self).post(request, cancel, on_complete)
    }
}

/// Shared flag signalling that the caller no longer wants a result.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Blocking `ureq` agent driven from one thread per call.
///
/// 4xx/5xx statuses are returned as responses so the request layer can read
/// their bodies.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }

    fn execute(agent: &ureq::Agent, request: &HttpRequest) -> TransportResult {
        let mut builder = agent.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let sent = match &request.body {
            Some(body) => builder.send(body.as_bytes()),
            None => builder.send_empty(),
        };
        let mut response = sent.map_err(|err| TransportError::Network(err.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|err| TransportError::Network(err.to_string()))?;

        Ok(HttpResponse {
            status,
            url: request.url.clone(),
            headers,
            body,
        })
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl Transport for UreqTransport {
    fn post(&self, request: HttpRequest, cancel: CancellationToken, on_complete: TransportCallback) {
        let agent = self.agent.clone();
        std::thread::spawn(move || {
            if cancel.is_cancelled() {
                on_complete(Err(TransportError::Cancelled));
                return;
            }
            let result = Self::execute(&agent, &request);
            if cancel.is_cancelled() {
                tracing::debug!(url = %request.url, "discarding result of cancelled call");
                on_complete(Err(TransportError::Cancelled));
                return;
            }
            on_complete(result);
        });
    }
}
