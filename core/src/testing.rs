//! Test doubles for the transport boundary.
//!
//! Compiled for this crate's own tests and behind the `test-utils` feature,
//! so scripted transports never ship in the default build.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::{CancellationToken, Transport, TransportCallback, TransportResult};

/// A scripted reply for [`CannedTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum CannedReply {
    Response {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
    Error(TransportError),
}

impl CannedReply {
    pub fn status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        CannedReply::Response {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(self, name: &str, value: &str) -> Self {
        match self {
            CannedReply::Response {
                status,
                mut headers,
                body,
            } => {
                headers.push((name.to_string(), value.to_string()));
                CannedReply::Response {
                    status,
                    headers,
                    body,
                }
            }
            error => error,
        }
    }

    fn into_result(self, url: &str) -> TransportResult {
        match self {
            CannedReply::Response {
                status,
                headers,
                body,
            } => Ok(HttpResponse {
                status,
                url: url.to_string(),
                headers,
                body,
            }),
            CannedReply::Error(err) => Err(err),
        }
    }
}

struct Held {
    url: String,
    cancel: CancellationToken,
    reply: CannedReply,
    on_complete: TransportCallback,
}

/// In-memory transport answering from a script.
///
/// Replies are consumed in order; the last one repeats. Every request is
/// recorded. A deferred transport holds calls until [`release`](Self::release)
/// so in-flight behaviour can be observed.
pub struct CannedTransport {
    replies: Mutex<VecDeque<CannedReply>>,
    requests: Mutex<Vec<HttpRequest>>,
    held: Mutex<Vec<Held>>,
    deferred: bool,
}

impl CannedTransport {
    pub fn new(replies: impl IntoIterator<Item = CannedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            deferred: false,
        }
    }

    pub fn replying(reply: CannedReply) -> Self {
        Self::new([reply])
    }

    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// Every request posted so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    /// Number of calls waiting for [`release`](Self::release).
    pub fn pending(&self) -> usize {
        lock(&self.held).len()
    }

    /// Complete every held call. Calls whose token was cancelled complete
    /// with [`TransportError::Cancelled`].
    pub fn release(&self) {
        let held: Vec<Held> = lock(&self.held).drain(..).collect();
        for call in held {
            complete(call.url, call.cancel, call.reply, call.on_complete);
        }
    }

    fn next_reply(&self) -> CannedReply {
        let mut replies = lock(&self.replies);
        if replies.len() > 1 {
            if let Some(reply) = replies.pop_front() {
                return reply;
            }
        }
        replies
            .front()
            .cloned()
            .unwrap_or_else(|| CannedReply::Error(TransportError::Network("no canned reply".to_string())))
    }
}

impl fmt::Debug for CannedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CannedTransport")
            .field("deferred", &self.deferred)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Transport for CannedTransport {
    fn post(&self, request: HttpRequest, cancel: CancellationToken, on_complete: TransportCallback) {
        let url = request.url.clone();
        lock(&self.requests).push(request);
        let reply = self.next_reply();
        if self.deferred {
            lock(&self.held).push(Held {
                url,
                cancel,
                reply,
                on_complete,
            });
            return;
        }
        complete(url, cancel, reply, on_complete);
    }
}

fn complete(url: String, cancel: CancellationToken, reply: CannedReply, on_complete: TransportCallback) {
    if cancel.is_cancelled() {
        on_complete(Err(TransportError::Cancelled));
    } else {
        on_complete(reply.into_result(&url));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
