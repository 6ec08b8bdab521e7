//! Typed request services.
//!
//! # Design
//! `ApiService<R>` starts an [`ApiRequest`] and turns its outcome into either
//! a decoded `R` for the completion block or an [`ApiError`] for the failure
//! block. What "decoded" and "error" mean is up to the
//! [`ResponseHandler`]; [`DecodingHandler`] decodes the response bytes with
//! the client's decoder and maps failures with [`ApiError::from_response`].
//!
//! A service drives one request at a time. Calling
//! [`request_service`](ApiService::request_service) again replaces the held
//! request and blocks without cancelling the previous call; completions of
//! replaced calls are dropped.
//!
//! A body that does not decode into `R` reaches the failure block as
//! [`ApiError::empty`], with the decode error only visible in the logs.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;

use crate::decode::ApiDecoder;
use crate::error::ApiError;
use crate::request::{ApiRequest, RequestOutcome};
use crate::response::ApiResponse;

pub type CompletionBlock<R> = Box<dyn FnOnce(R) + Send + 'static>;
pub type FailureBlock = Box<dyn FnOnce(ApiError) + Send + 'static>;

/// Maps a finished request to the service's result type.
pub trait ResponseHandler<R>: Send + Sync + 'static {
    fn handle_success(&self, response: &ApiResponse, decoder: &ApiDecoder) -> Result<R, ApiError>;

    fn handle_failure(&self, response: &ApiResponse) -> ApiError {
        ApiError::from_response(response)
    }
}

/// Decodes `R` from the whole response body.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodingHandler;

impl<R: DeserializeOwned> ResponseHandler<R> for DecodingHandler {
    fn handle_success(&self, response: &ApiResponse, decoder: &ApiDecoder) -> Result<R, ApiError> {
        decode_response(response, decoder)
    }
}

/// Decode `R` from `response`'s bytes; any mismatch is an empty error.
pub fn decode_response<R: DeserializeOwned>(
    response: &ApiResponse,
    decoder: &ApiDecoder,
) -> Result<R, ApiError> {
    let Some(data) = response.data() else {
        tracing::warn!("response carried no body to decode");
        return Err(ApiError::empty());
    };
    decoder.decode(data).map_err(|err| {
        tracing::warn!(%err, target_type = std::any::type_name::<R>(), "response did not decode");
        ApiError::empty()
    })
}

struct ServiceState<R> {
    generation: u64,
    pending: Option<u64>,
    request: Option<ApiRequest>,
    completion: Option<CompletionBlock<R>>,
    failure: Option<FailureBlock>,
}

impl<R> Default for ServiceState<R> {
    fn default() -> Self {
        Self {
            generation: 0,
            pending: None,
            request: None,
            completion: None,
            failure: None,
        }
    }
}

struct ServiceInner<R, H> {
    handler: H,
    state: Mutex<ServiceState<R>>,
}

impl<R, H> ServiceInner<R, H>
where
    R: Send + 'static,
    H: ResponseHandler<R>,
{
    fn lock(&self) -> MutexGuard<'_, ServiceState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, generation: u64, outcome: RequestOutcome, decoder: &ApiDecoder) {
        let (completion, failure) = {
            let mut state = self.lock();
            if state.pending != Some(generation) {
                tracing::debug!(generation, "dropping completion of a replaced request");
                return;
            }
            state.pending = None;
            state.request = None;
            (state.completion.take(), state.failure.take())
        };

        match outcome {
            RequestOutcome::Success(response) => match self.handler.handle_success(&response, decoder) {
                Ok(result) => {
                    if let Some(completion) = completion {
                        completion(result);
                    }
                }
                Err(err) => {
                    if let Some(failure) = failure {
                        failure(err);
                    }
                }
            },
            RequestOutcome::Failure(response) => {
                let err = self.handler.handle_failure(&response);
                if let Some(failure) = failure {
                    failure(err);
                }
            }
        }
    }
}

pub struct ApiService<R, H = DecodingHandler> {
    inner: Arc<ServiceInner<R, H>>,
}

impl<R> ApiService<R, DecodingHandler>
where
    R: DeserializeOwned + Send + 'static,
{
    pub fn new() -> Self {
        Self::with_handler(DecodingHandler)
    }
}

impl<R> Default for ApiService<R, DecodingHandler>
where
    R: DeserializeOwned + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R, H> ApiService<R, H>
where
    R: Send + 'static,
    H: ResponseHandler<R>,
{
    pub fn with_handler(handler: H) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                handler,
                state: Mutex::new(ServiceState::default()),
            }),
        }
    }

    pub fn handler(&self) -> &H {
        &self.inner.handler
    }

    /// Start `request`, replacing whatever this service held before.
    pub fn request_service(
        &self,
        request: ApiRequest,
        completion: Option<CompletionBlock<R>>,
        failure: Option<FailureBlock>,
    ) {
        let generation = {
            let mut state = self.inner.lock();
            state.generation += 1;
            state.pending = Some(state.generation);
            state.request = None;
            state.completion = completion;
            state.failure = failure;
            state.generation
        };

        let decoder = *request.client().decoder();
        let inner = Arc::clone(&self.inner);
        request.start(move |outcome| inner.resolve(generation, outcome, &decoder));

        let mut state = self.inner.lock();
        if state.pending == Some(generation) {
            state.request = Some(request);
        }
    }

    /// Whether a started request has not resolved yet.
    pub fn is_active(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    /// Cancel the held request. Its failure still reaches the failure block.
    pub fn cancel(&self) {
        if let Some(request) = &self.inner.lock().request {
            request.cancel();
        }
    }
}

impl<R, H> Clone for ApiService<R, H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, H> fmt::Debug for ApiService<R, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiService")
            .field("result", &std::any::type_name::<R>())
            .finish_non_exhaustive()
    }
}
