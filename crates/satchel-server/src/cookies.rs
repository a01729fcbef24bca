//! HTTP bindings for the session cookie contract.
//!
//! [`RequestCookies`] parses the `Cookie` request header and is an axum
//! extractor. [`ResponseCookies`] collects cookies written by the session
//! manager and emits them as `Set-Cookie` headers. Both directions go
//! through the `cookie` crate with percent-encoding.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponseParts, ResponseParts};
use cookie::Cookie;
use satchel_session::{CookieSink, CookieSource, SessionCookie};
use time::OffsetDateTime;

use crate::error::ServerError;

/// Cookies sent by the client.
#[derive(Debug, Clone, Default)]
pub struct RequestCookies {
    cookies: HashMap<String, String>,
}

impl RequestCookies {
    /// Parse every `Cookie` header. The first occurrence of a name wins.
    ///
    /// Pairs the parser rejects (no `=`, empty name, bad encoding) are skipped.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cookies = HashMap::new();

        for header in headers.get_all(COOKIE) {
            let Ok(header) = header.to_str() else {
                continue;
            };
            for cookie in Cookie::split_parse_encoded(header).flatten() {
                cookies
                    .entry(cookie.name().to_string())
                    .or_insert_with(|| cookie.value_trimmed().to_string());
            }
        }

        Self { cookies }
    }

    /// Number of cookies parsed.
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Whether no cookies were sent.
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

impl CookieSource for RequestCookies {
    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.get(name).cloned()
    }
}

impl<S> FromRequestParts<S> for RequestCookies
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

/// Cookies to send back with the response.
#[derive(Debug, Clone, Default)]
pub struct ResponseCookies {
    cookies: Vec<SessionCookie>,
}

impl ResponseCookies {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cookies written so far.
    pub fn cookies(&self) -> &[SessionCookie] {
        &self.cookies
    }
}

impl CookieSink for ResponseCookies {
    fn set_cookie(&mut self, cookie: SessionCookie) {
        self.cookies.push(cookie);
    }
}

impl IntoResponseParts for ResponseCookies {
    type Error = ServerError;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        for cookie in &self.cookies {
            let value = HeaderValue::from_str(&format_set_cookie(cookie)).map_err(|e| {
                ServerError::Internal(format!("invalid cookie {:?}: {}", cookie.name, e))
            })?;
            res.headers_mut().append(SET_COOKIE, value);
        }
        Ok(res)
    }
}

/// Convert a session cookie into its `cookie` crate form.
///
/// Removals also carry `Max-Age=0`. An expiry outside the range `time`
/// can represent is left off, making it a browser-session cookie.
pub fn to_http_cookie(cookie: &SessionCookie) -> Cookie<'static> {
    let mut builder = Cookie::build((cookie.name.clone(), cookie.value.clone()))
        .path(cookie.path.clone())
        .http_only(cookie.http_only)
        .secure(cookie.secure);

    if let Ok(expires) = OffsetDateTime::from_unix_timestamp(cookie.expires.timestamp()) {
        builder = builder.expires(expires);
    }
    if cookie.is_removal() {
        builder = builder.max_age(time::Duration::ZERO);
    }

    builder.build()
}

/// Render a `Set-Cookie` header value.
pub fn format_set_cookie(cookie: &SessionCookie) -> String {
    to_http_cookie(cookie).encoded().to_string()
}
