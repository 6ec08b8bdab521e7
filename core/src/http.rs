//! HTTP transport types exchanged with a [`Transport`](crate::transport::Transport).
//!
//! # Design
//! Requests and responses are plain data. `ApiRequest` builds an `HttpRequest`
//! and hands it to the injected transport; the transport hands back an
//! `HttpResponse` for whatever status the server produced. Classifying the
//! result (success vs failure) is the request's job, not the transport's.
//!
//! All fields use owned types so values can move onto a transport thread
//! without lifetime concerns.

/// Content type of every request body sent to the backend.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// HTTP method for a request. The backend only ever receives `Post`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
        }
    }
}

/// An outgoing call described as plain data.
///
/// `url` is the fully concatenated base URL plus endpoint. `body` holds the
/// form-encoded parameters, or `None` when there are none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// A completed HTTP exchange described as plain data.
///
/// Produced by a transport for any status code. `url` is the URL the
/// response came from; cookie defaults (domain) are derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// All values of the header `name`, compared case-insensitively.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
