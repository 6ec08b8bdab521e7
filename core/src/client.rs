//! The shared context every request is built from.
//!
//! # Design
//! `ApiClient` bundles what used to be process-wide state: configuration,
//! the transport, the cookie jar and the decoder. Build one at startup and
//! clone it wherever requests are made; clones share the same transport and
//! jar.

use std::fmt;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::cookies::CookieJar;
use crate::decode::ApiDecoder;
use crate::endpoint::EndpointRepresentable;
use crate::request::ApiRequest;
use crate::transport::Transport;

#[derive(Clone)]
pub struct ApiClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    cookies: Arc<CookieJar>,
    decoder: ApiDecoder,
}

impl ApiClient {
    /// A client with an empty cookie jar and the default decoder.
    pub fn new<T: Transport + 'static>(config: ClientConfig, transport: T) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            cookies: Arc::new(CookieJar::new()),
            decoder: ApiDecoder::default(),
        }
    }

    /// Share an existing jar, e.g. one restored from a previous session.
    pub fn with_cookie_jar(mut self, cookies: Arc<CookieJar>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_decoder(mut self, decoder: ApiDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn cookies(&self) -> &Arc<CookieJar> {
        &self.cookies
    }

    pub fn decoder(&self) -> &ApiDecoder {
        &self.decoder
    }

    /// Shorthand for [`ApiRequest::new`].
    pub fn request<E: EndpointRepresentable + ?Sized>(&self, endpoint: &E) -> ApiRequest {
        ApiRequest::new(self, endpoint)
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("cookies", &self.cookies.cookies().len())
            .field("decoder", &self.decoder)
            .finish_non_exhaustive()
    }
}
