//! One outgoing call: its configuration, its in-flight handle, and the
//! classification of its result.
//!
//! # Design
//! An `ApiRequest` is configured by the caller (parameters, extra headers),
//! then [`start`](ApiRequest::start)ed with a completion closure. The closure
//! is the only completion signal: it receives either
//! [`RequestOutcome::Success`] or [`RequestOutcome::Failure`], each carrying
//! an [`ApiResponse`].
//!
//! The in-flight handle is a [`CancellationToken`] tagged with the start
//! generation. A completion only clears the handle it was started with, so
//! restarting a request never lets the older call clear the newer handle.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use crate::client::ApiClient;
use crate::cookies::CookieJar;
use crate::endpoint::EndpointRepresentable;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, FORM_CONTENT_TYPE};
use crate::params::{IntoParam, ParamValue, Parameters};
use crate::response::ApiResponse;
use crate::transport::{CancellationToken, TransportResult};

/// How a started request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Success(ApiResponse),
    Failure(ApiResponse),
}

#[derive(Debug, Default)]
struct InFlight {
    generation: u64,
    handle: Option<(u64, CancellationToken)>,
}

impl InFlight {
    fn begin(&mut self, token: CancellationToken) -> u64 {
        self.generation += 1;
        self.handle = Some((self.generation, token));
        self.generation
    }

    fn finish(&mut self, generation: u64) {
        if matches!(self.handle, Some((current, _)) if current == generation) {
            self.handle = None;
        }
    }
}

#[derive(Debug)]
pub struct ApiRequest {
    client: ApiClient,
    endpoint: String,
    url: String,
    parameters: Parameters,
    headers: BTreeMap<String, String>,
    in_flight: Arc<Mutex<InFlight>>,
}

impl ApiRequest {
    /// A request for `endpoint`, with headers seeded from the client's
    /// cookie jar as it is right now.
    pub fn new<E: EndpointRepresentable + ?Sized>(client: &ApiClient, endpoint: &E) -> Self {
        let endpoint = endpoint.endpoint_string();
        Self {
            url: client.config().url_for(&endpoint),
            endpoint,
            client: client.clone(),
            parameters: Parameters::new(),
            headers: client.cookies().cookie_headers(),
            in_flight: Arc::default(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Set a parameter with the usual coercions; `None` is a no-op.
    pub fn set(&mut self, key: impl Into<String>, value: impl IntoParam) {
        self.parameters.set(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.parameters.get(key)
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.headers
    }

    pub fn is_in_flight(&self) -> bool {
        self.lock_in_flight().handle.is_some()
    }

    /// The call `start` would send right now.
    pub fn http_request(&self) -> HttpRequest {
        let body = self.parameters.to_form_body();
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if body.is_some() {
            headers.push(("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()));
        }
        HttpRequest {
            method: HttpMethod::Post,
            url: self.url.clone(),
            headers,
            body,
        }
    }

    /// POST the current parameters and headers.
    ///
    /// `on_complete` runs once on the transport's thread, after response
    /// cookies have been stored. A 2xx reply whose JSON body is not an object,
    /// or an empty 204/205, runs nothing. Starting again replaces the
    /// in-flight handle.
    pub fn start<F>(&self, on_complete: F)
    where
        F: FnOnce(RequestOutcome) + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = self.lock_in_flight().begin(token.clone());
        let request = self.http_request();
        tracing::debug!(url = %request.url, generation, "starting request");

        let cookies = Arc::clone(self.client.cookies());
        let in_flight = Arc::clone(&self.in_flight);
        let url = request.url.clone();
        self.client.transport().post(
            request,
            token,
            Box::new(move |result| {
                match classify(result, &cookies) {
                    Some(outcome) => on_complete(outcome),
                    None => {
                        tracing::warn!(%url, "successful response was not a JSON object, dropping it")
                    }
                }
                lock(&in_flight).finish(generation);
            }),
        );
    }

    /// Ask the transport to abandon the in-flight call, if any. The
    /// completion closure still runs, with a failure.
    pub fn cancel(&self) {
        if let Some((generation, token)) = &self.lock_in_flight().handle {
            tracing::debug!(url = %self.url, generation, "cancelling request");
            token.cancel();
        }
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, InFlight> {
        lock(&self.in_flight)
    }
}

/// Statuses whose empty body counts as JSON `null`: a success that carries no
/// envelope.
const EMPTY_BODY_STATUSES: [u16; 2] = [204, 205];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn classify(result: TransportResult, cookies: &CookieJar) -> Option<RequestOutcome> {
    let response = match result {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(%err, "transport failed");
            return Some(RequestOutcome::Failure(ApiResponse::new(
                Some(Map::new()),
                None,
                None,
                None,
            )));
        }
    };
    cookies.store_response_cookies(&response);

    if response.is_success() {
        if response.body.is_empty() && EMPTY_BODY_STATUSES.contains(&response.status) {
            return None;
        }
        match serde_json::from_slice::<Value>(&response.body) {
            Ok(Value::Object(dict)) => {
                return Some(RequestOutcome::Success(ApiResponse::new(
                    Some(dict),
                    Some(response.body),
                    None,
                    Some(response.status),
                )));
            }
            Ok(_) => return None,
            Err(err) => tracing::debug!(%err, status = response.status, "2xx body is not JSON"),
        }
    }
    Some(RequestOutcome::Failure(failure_response(response)))
}

/// Recover what we can from a failed reply: an envelope, or a bare JSON
/// string used as the message. Anything else is the empty envelope.
fn failure_response(response: HttpResponse) -> ApiResponse {
    let status = Some(response.status);
    let (dict, message) = match serde_json::from_slice::<Value>(&response.body) {
        Ok(Value::Object(dict)) => (dict, None),
        Ok(Value::String(message)) => (Map::new(), Some(message)),
        _ => (Map::new(), None),
    };
    ApiResponse::new(Some(dict), None, message, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::error::TransportError;
    use crate::testing::{CannedReply, CannedTransport};
    use cookie::Cookie;
    use std::sync::mpsc;

    fn client_with(transport: Arc<CannedTransport>) -> ApiClient {
        ApiClient::new(ClientConfig::new("http://api.cooking.test/api/"), transport)
    }

    fn run(transport: Arc<CannedTransport>) -> (ApiClient, Option<RequestOutcome>) {
        let client = client_with(transport);
        let (tx, rx) = mpsc::channel();
        client.request("recipes/get").start(move |outcome| {
            let _ = tx.send(outcome);
        });
        (client, rx.try_recv().ok())
    }

    #[test]
    fn url_is_base_plus_endpoint() {
        let client = client_with(Arc::new(CannedTransport::new([])));
        let request = ApiRequest::new(&client, "users/login");
        assert_eq!(request.endpoint(), "users/login");
        assert_eq!(request.url(), "http://api.cooking.test/api/users/login");
    }

    #[test]
    fn headers_are_seeded_from_cookie_jar_at_construction() {
        let client = client_with(Arc::new(CannedTransport::new([])));
        let before = client.request("a");
        client.cookies().set_cookie(Cookie::new("session_id", "abc"));
        let after = client.request("a");

        assert!(before.headers().is_empty());
        assert_eq!(after.headers().get("Cookie").map(String::as_str), Some("session_id=abc"));
    }

    #[test]
    fn http_request_carries_form_body_and_headers() {
        let client = client_with(Arc::new(CannedTransport::new([])));
        let mut request = client.request("recipes/search");
        request.set("query", "soup");
        request.set("page", 2);
        request.headers_mut().insert("X-Client".to_string(), "ios".to_string());

        let http = request.http_request();
        assert_eq!(http.method, HttpMethod::Post);
        assert_eq!(http.url, "http://api.cooking.test/api/recipes/search");
        assert_eq!(http.body.as_deref(), Some("page=2&query=soup"));
        assert!(http.headers.contains(&("X-Client".to_string(), "ios".to_string())));
        assert!(http
            .headers
            .contains(&("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string())));
    }

    #[test]
    fn empty_parameters_send_no_body() {
        let client = client_with(Arc::new(CannedTransport::new([])));
        let http = client.request("ping").http_request();
        assert!(http.body.is_none());
        assert!(http.headers.is_empty());
    }

    #[test]
    fn request_indexing_follows_coercion_rules() {
        let client = client_with(Arc::new(CannedTransport::new([])));
        let mut request = client.request("a");
        request.set("n", 5);
        request.set("flag", true);
        request.set("n", None::<i32>);
        assert_eq!(request.get("n").and_then(ParamValue::as_text), Some("5"));
        assert_eq!(request.get("flag").and_then(ParamValue::as_text), Some("true"));
        assert!(request.get("other").is_none());
    }

    #[test]
    fn json_object_on_2xx_is_success() {
        let transport = Arc::new(CannedTransport::replying(CannedReply::status(
            200,
            r#"{"message":"ok","code":0,"data":{"id":42}}"#,
        )));
        let (_, outcome) = run(transport);
        match outcome {
            Some(RequestOutcome::Success(response)) => {
                assert_eq!(response.message(), Some("ok"));
                assert_eq!(response.code(), 0);
                assert_eq!(response.status_code(), Some(200));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn non_object_json_on_2xx_runs_nothing() {
        let transport = Arc::new(CannedTransport::replying(CannedReply::status(200, "[1,2]")));
        let (_, outcome) = run(transport);
        assert!(outcome.is_none());
    }

    #[test]
    fn empty_no_content_runs_nothing() {
        for status in [204, 205] {
            let transport = Arc::new(CannedTransport::replying(
                CannedReply::status(status, "").with_header("Set-Cookie", "session_id=s9"),
            ));
            let client = client_with(transport);
            let request = client.request("recipes/get");
            let (tx, rx) = mpsc::channel();
            request.start(move |outcome| {
                let _ = tx.send(outcome);
            });
            assert!(rx.try_recv().is_err(), "{status} fired a callback");
            assert!(!request.is_in_flight());
            assert_eq!(client.cookies().session_cookie().unwrap().value(), "s9");
        }
    }

    #[test]
    fn empty_ok_is_still_failure() {
        let transport = Arc::new(CannedTransport::replying(CannedReply::status(200, "")));
        let (_, outcome) = run(transport);
        assert!(matches!(outcome, Some(RequestOutcome::Failure(_))));
    }

    #[test]
    fn html_error_page_becomes_empty_envelope() {
        let transport = Arc::new(CannedTransport::replying(CannedReply::status(
            500,
            "<html>oops</html>",
        )));
        let (_, outcome) = run(transport);
        match outcome {
            Some(RequestOutcome::Failure(response)) => {
                assert_eq!(response.data(), Some(&b"{}"[..]));
                assert_eq!(response.message(), None);
                assert_eq!(response.code(), -1);
                assert_eq!(response.status_code(), Some(500));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn non_json_on_2xx_is_failure() {
        let transport = Arc::new(CannedTransport::replying(CannedReply::status(200, "OK")));
        let (_, outcome) = run(transport);
        match outcome {
            Some(RequestOutcome::Failure(response)) => {
                assert_eq!(response.status_code(), Some(200));
                assert_eq!(response.data(), Some(&b"{}"[..]));
                assert!(response.dict().is_empty());
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn error_status_recovers_envelope() {
        let transport = Arc::new(CannedTransport::replying(CannedReply::status(
            401,
            r#"{"message":"login required","code":3}"#,
        )));
        let (_, outcome) = run(transport);
        match outcome {
            Some(RequestOutcome::Failure(response)) => {
                assert_eq!(response.message(), Some("login required"));
                assert_eq!(response.code(), 3);
                assert_eq!(response.status_code(), Some(401));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn error_status_with_bare_string_uses_it_as_message() {
        let transport = Arc::new(CannedTransport::replying(CannedReply::status(
            500,
            r#""database unavailable""#,
        )));
        let (_, outcome) = run(transport);
        match outcome {
            Some(RequestOutcome::Failure(response)) => {
                assert_eq!(response.message(), Some("database unavailable"));
                assert_eq!(response.code(), -1);
                assert_eq!(response.data(), Some(&b"{}"[..]));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn transport_error_is_failure_without_status() {
        let transport = Arc::new(CannedTransport::replying(CannedReply::Error(
            TransportError::Network("connection reset".to_string()),
        )));
        let (_, outcome) = run(transport);
        match outcome {
            Some(RequestOutcome::Failure(response)) => {
                assert_eq!(response.status_code(), None);
                assert_eq!(response.message(), None);
                assert_eq!(response.data(), Some(&b"{}"[..]));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn cookies_are_stored_on_success_and_failure() {
        let transport = Arc::new(CannedTransport::new([
            CannedReply::status(200, "{}").with_header("Set-Cookie", "session_id=s1"),
            CannedReply::status(403, "nope").with_header("Set-Cookie", "csrf=c1"),
        ]));
        let client = client_with(Arc::clone(&transport));
        client.request("login").start(|_| {});
        client.request("admin").start(|_| {});

        assert_eq!(client.cookies().session_cookie().map(|c| c.value().to_string()), Some("s1".into()));
        assert_eq!(client.cookies().cookie("csrf").map(|c| c.value().to_string()), Some("c1".into()));
    }

    #[test]
    fn handle_is_held_only_while_in_flight() {
        let transport = Arc::new(CannedTransport::replying(CannedReply::status(200, "{}")).deferred());
        let client = client_with(Arc::clone(&transport));
        let request = client.request("slow");
        assert!(!request.is_in_flight());

        request.start(|_| {});
        assert!(request.is_in_flight());

        transport.release();
        assert!(!request.is_in_flight());
    }

    #[test]
    fn cancel_reports_through_failure_path() {
        let transport = Arc::new(CannedTransport::replying(CannedReply::status(200, "{}")).deferred());
        let client = client_with(Arc::clone(&transport));
        let request = client.request("slow");
        let (tx, rx) = mpsc::channel();
        request.start(move |outcome| {
            let _ = tx.send(outcome);
        });

        request.cancel();
        assert!(request.is_in_flight());
        assert!(rx.try_recv().is_err());

        transport.release();
        assert!(matches!(rx.try_recv(), Ok(RequestOutcome::Failure(_))));
        assert!(!request.is_in_flight());
    }

    #[test]
    fn cancel_without_call_is_noop() {
        let client = client_with(Arc::new(CannedTransport::new([])));
        let request = client.request("idle");
        request.cancel();
        assert!(!request.is_in_flight());
    }

    #[test]
    fn stale_completion_keeps_newer_handle() {
        let transport = Arc::new(CannedTransport::replying(CannedReply::status(200, "{}")).deferred());
        let client = client_with(Arc::clone(&transport));
        let request = client.request("slow");
        request.start(|_| {});
        request.start(|_| {});
        assert_eq!(transport.pending(), 2);

        transport.release();
        assert!(!request.is_in_flight());

        let mut state = InFlight::default();
        let first = state.begin(CancellationToken::new());
        let second = state.begin(CancellationToken::new());
        state.finish(first);
        assert!(state.handle.is_some());
        state.finish(second);
        assert!(state.handle.is_none());
    }
}
