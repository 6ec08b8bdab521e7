//! Cookie storage shared by every request of one client.
//!
//! # Design
//! One `CookieJar` is created with the [`ApiClient`](crate::client::ApiClient)
//! and lives as long as it does. Requests read it once, at construction, to
//! seed their `Cookie` header; every completed call writes the response's
//! `Set-Cookie` values back into it.
//!
//! The jar is deliberately simple: no path matching on read, no per-domain
//! partitioning. Every live cookie goes out with every request; a cookie
//! past its `Expires` (or `Max-Age`, pinned at store time) is never returned.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use cookie::time::OffsetDateTime;
use cookie::Cookie;
use url::Url;

use crate::http::HttpResponse;

/// Name of the cookie the backend uses for its session.
pub const SESSION_COOKIE_NAME: &str = "session_id";

pub const COOKIE_HEADER: &str = "Cookie";

const SET_COOKIE_HEADER: &str = "set-cookie";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CookieAcceptPolicy {
    Always,
    Never,
    /// Accept only cookies whose domain matches the host that sent them.
    #[default]
    OnlyFromMainDocumentDomain,
}

#[derive(Debug, Default)]
struct JarState {
    policy: CookieAcceptPolicy,
    cookies: Vec<Cookie<'static>>,
}

#[derive(Debug, Default)]
pub struct CookieJar {
    state: RwLock<JarState>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept_policy(&self) -> CookieAcceptPolicy {
        self.read().policy
    }

    pub fn set_accept_policy(&self, policy: CookieAcceptPolicy) {
        self.write().policy = policy;
    }

    /// Snapshot of every live cookie, in insertion order.
    pub fn cookies(&self) -> Vec<Cookie<'static>> {
        let now = OffsetDateTime::now_utc();
        self.read()
            .cookies
            .iter()
            .filter(|cookie| !is_expired_at(cookie, now))
            .cloned()
            .collect()
    }

    /// First live cookie called `name`.
    pub fn cookie(&self, name: &str) -> Option<Cookie<'static>> {
        let now = OffsetDateTime::now_utc();
        self.read()
            .cookies
            .iter()
            .find(|cookie| cookie.name() == name && !is_expired_at(cookie, now))
            .cloned()
    }

    pub fn session_cookie(&self) -> Option<Cookie<'static>> {
        self.cookie(SESSION_COOKIE_NAME)
    }

    /// Request headers carrying every live cookie. Empty when there is none.
    pub fn cookie_headers(&self) -> BTreeMap<String, String> {
        let pairs: Vec<String> = self
            .cookies()
            .iter()
            .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
            .collect();
        let mut headers = BTreeMap::new();
        if !pairs.is_empty() {
            headers.insert(COOKIE_HEADER.to_string(), pairs.join("; "));
        }
        headers
    }

    /// Store `cookie`, replacing any cookie with the same name, domain and
    /// path. An already expired cookie removes its match instead.
    pub fn set_cookie(&self, cookie: Cookie<'static>) {
        self.store(cookie, None);
    }

    pub fn remove_cookie(&self, name: &str) -> bool {
        let mut state = self.write();
        let before = state.cookies.len();
        state.cookies.retain(|cookie| cookie.name() != name);
        state.cookies.len() != before
    }

    pub fn clear(&self) {
        self.write().cookies.clear();
    }

    /// Persist every `Set-Cookie` of `response`, switching the policy to
    /// [`CookieAcceptPolicy::Always`] first. Unparseable values are skipped.
    pub fn store_response_cookies(&self, response: &HttpResponse) {
        let host = Url::parse(&response.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string));

        for raw in response.header_values(SET_COOKIE_HEADER) {
            let mut cookie = match Cookie::parse(raw.to_string()) {
                Ok(cookie) => cookie,
                Err(err) => {
                    tracing::debug!(%err, "skipping malformed Set-Cookie value");
                    continue;
                }
            };
            if cookie.domain().is_none() {
                if let Some(host) = &host {
                    cookie.set_domain(host.clone());
                }
            }
            self.set_accept_policy(CookieAcceptPolicy::Always);
            self.store(cookie, host.as_deref());
        }
    }

    fn store(&self, mut cookie: Cookie<'static>, origin_host: Option<&str>) {
        let mut state = self.write();
        if !accepts(state.policy, &cookie, origin_host) {
            tracing::debug!(name = cookie.name(), "cookie rejected by accept policy");
            return;
        }

        let now = OffsetDateTime::now_utc();
        if let Some(max_age) = cookie.max_age() {
            // Max-Age is relative; pin it to an absolute deadline.
            if let Some(deadline) = now.checked_add(max_age) {
                cookie.set_expires(deadline);
            }
            cookie.set_max_age(None);
        }
        state.cookies.retain(|stored| !is_expired_at(stored, now));

        let existing = state.cookies.iter().position(|stored| same_identity(stored, &cookie));
        if is_expired_at(&cookie, now) {
            if let Some(index) = existing {
                state.cookies.remove(index);
            }
            return;
        }
        match existing {
            Some(index) => state.cookies[index] = cookie,
            None => state.cookies.push(cookie),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, JarState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, JarState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn accepts(policy: CookieAcceptPolicy, cookie: &Cookie<'_>, origin_host: Option<&str>) -> bool {
    match policy {
        CookieAcceptPolicy::Always => true,
        CookieAcceptPolicy::Never => false,
        CookieAcceptPolicy::OnlyFromMainDocumentDomain => match (cookie.domain(), origin_host) {
            (Some(domain), Some(host)) => domain_matches(domain, host),
            _ => true,
        },
    }
}

fn domain_matches(domain: &str, host: &str) -> bool {
    let domain = domain.trim_start_matches('.');
    host.eq_ignore_ascii_case(domain)
        || host
            .to_ascii_lowercase()
            .ends_with(&format!(".{}", domain.to_ascii_lowercase()))
}

fn same_identity(a: &Cookie<'_>, b: &Cookie<'_>) -> bool {
    a.name() == b.name() && a.domain() == b.domain() && a.path() == b.path()
}

fn is_expired_at(cookie: &Cookie<'_>, now: OffsetDateTime) -> bool {
    cookie
        .expires_datetime()
        .is_some_and(|expires| expires <= now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(cookies: &[&str]) -> HttpResponse {
        HttpResponse {
            status: 200,
            url: "http://api.cooking.test/api/login".to_string(),
            headers: cookies
                .iter()
                .map(|value| ("Set-Cookie".to_string(), value.to_string()))
                .collect(),
            body: Vec::new(),
        }
    }

    #[test]
    fn lookup_by_name() {
        let jar = CookieJar::new();
        jar.set_cookie(Cookie::new("session_id", "abc"));
        jar.set_cookie(Cookie::new("csrf", "token"));

        assert_eq!(jar.cookie("session_id").map(|c| c.value().to_string()), Some("abc".into()));
        assert_eq!(jar.session_cookie().map(|c| c.value().to_string()), Some("abc".into()));
        assert!(jar.cookie("missing").is_none());
    }

    #[test]
    fn headers_join_every_cookie() {
        let jar = CookieJar::new();
        assert!(jar.cookie_headers().is_empty());

        jar.set_cookie(Cookie::new("session_id", "abc"));
        jar.set_cookie(Cookie::new("csrf", "token"));
        let headers = jar.cookie_headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Cookie").map(String::as_str), Some("session_id=abc; csrf=token"));
    }

    #[test]
    fn same_identity_replaces() {
        let jar = CookieJar::new();
        jar.set_cookie(Cookie::new("session_id", "old"));
        jar.set_cookie(Cookie::new("session_id", "new"));
        assert_eq!(jar.cookies().len(), 1);
        assert_eq!(jar.session_cookie().map(|c| c.value().to_string()), Some("new".into()));
    }

    #[test]
    fn response_cookies_are_stored_with_host_domain() {
        let jar = CookieJar::new();
        jar.store_response_cookies(&response_with(&["session_id=s1; Path=/; HttpOnly", "theme=dark"]));

        let session = jar.session_cookie().unwrap();
        assert_eq!(session.value(), "s1");
        assert_eq!(session.domain(), Some("api.cooking.test"));
        assert_eq!(jar.cookie("theme").map(|c| c.value().to_string()), Some("dark".into()));
        assert_eq!(jar.accept_policy(), CookieAcceptPolicy::Always);
    }

    #[test]
    fn storing_response_cookies_overrides_never_policy() {
        let jar = CookieJar::new();
        jar.set_accept_policy(CookieAcceptPolicy::Never);
        jar.set_cookie(Cookie::new("ignored", "1"));
        assert!(jar.cookies().is_empty());

        jar.store_response_cookies(&response_with(&["session_id=s1"]));
        assert!(jar.session_cookie().is_some());
    }

    #[test]
    fn max_age_zero_deletes() {
        let jar = CookieJar::new();
        jar.store_response_cookies(&response_with(&["session_id=s1"]));
        jar.store_response_cookies(&response_with(&["session_id=; Max-Age=0"]));
        assert!(jar.session_cookie().is_none());
    }

    #[test]
    fn past_expiry_deletes() {
        let jar = CookieJar::new();
        jar.store_response_cookies(&response_with(&["session_id=s1"]));
        jar.store_response_cookies(&response_with(&[
            "session_id=; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        ]));
        assert!(jar.session_cookie().is_none());
    }

    #[test]
    fn max_age_becomes_absolute_deadline() {
        let before = OffsetDateTime::now_utc();
        let jar = CookieJar::new();
        jar.store_response_cookies(&response_with(&["session_id=s1; Max-Age=60"]));

        let stored = jar.session_cookie().unwrap();
        assert_eq!(stored.max_age(), None);
        let expires = stored.expires_datetime().unwrap();
        assert!(expires >= before + cookie::time::Duration::seconds(60));
        assert!(!is_expired_at(&stored, before + cookie::time::Duration::seconds(59)));
        assert!(is_expired_at(&stored, before + cookie::time::Duration::seconds(61)));
    }

    #[test]
    fn expired_cookies_are_not_returned_or_sent() {
        let jar = CookieJar::new();
        let soon = OffsetDateTime::now_utc() + cookie::time::Duration::milliseconds(200);
        jar.set_cookie(Cookie::build(("session_id", "s1")).expires(soon).build());
        jar.set_cookie(Cookie::new("theme", "dark"));
        assert!(jar.session_cookie().is_some());

        std::thread::sleep(std::time::Duration::from_millis(300));
        assert!(jar.session_cookie().is_none());
        assert_eq!(jar.cookies().len(), 1);
        assert_eq!(jar.cookie_headers().get("Cookie").map(String::as_str), Some("theme=dark"));
    }

    #[test]
    fn session_cookie_without_expiry_never_expires() {
        let far = OffsetDateTime::now_utc() + cookie::time::Duration::days(3650);
        assert!(!is_expired_at(&Cookie::new("session_id", "s1"), far));
    }

    #[test]
    fn malformed_values_are_skipped() {
        let jar = CookieJar::new();
        jar.store_response_cookies(&response_with(&["=novalue", "ok=1"]));
        assert_eq!(jar.cookies().len(), 1);
        assert!(jar.cookie("ok").is_some());
    }

    #[test]
    fn main_document_policy_checks_domain() {
        assert!(accepts(
            CookieAcceptPolicy::OnlyFromMainDocumentDomain,
            &Cookie::build(("a", "1")).domain(".cooking.test").build(),
            Some("api.cooking.test"),
        ));
        assert!(!accepts(
            CookieAcceptPolicy::OnlyFromMainDocumentDomain,
            &Cookie::build(("a", "1")).domain("tracker.test").build(),
            Some("api.cooking.test"),
        ));
    }

    #[test]
    fn remove_and_clear() {
        let jar = CookieJar::new();
        jar.set_cookie(Cookie::new("a", "1"));
        jar.set_cookie(Cookie::new("b", "2"));
        assert!(jar.remove_cookie("a"));
        assert!(!jar.remove_cookie("a"));
        assert_eq!(jar.cookies().len(), 1);
        jar.clear();
        assert!(jar.cookies().is_empty());
    }
}
