//! Cookie contract between the session manager and its transport.
//!
//! The manager never touches HTTP directly. It reads the session ID from a
//! [`CookieSource`] and writes exactly one [`SessionCookie`] per create,
//! save or delete into a [`CookieSink`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::SessionOptions;
use crate::session::Session;

/// Path every session cookie is scoped to.
pub const COOKIE_PATH: &str = "/";

/// A cookie the manager wants sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    /// Cookie name (the session space).
    pub name: String,
    /// Cookie value: the session ID, or empty for a removal.
    pub value: String,
    /// Cookie path. Always [`COOKIE_PATH`].
    pub path: String,
    /// `HttpOnly` attribute.
    pub http_only: bool,
    /// `Secure` attribute.
    pub secure: bool,
    /// Absolute expiry.
    pub expires: DateTime<Utc>,
}

impl SessionCookie {
    /// Cookie carrying `session`'s ID until it expires.
    pub fn for_session(session: &Session, options: &SessionOptions) -> Self {
        Self {
            name: session.name().to_string(),
            value: session.id().to_string(),
            path: COOKIE_PATH.to_string(),
            http_only: options.http_only,
            secure: options.secure,
            expires: session.expires(),
        }
    }

    /// Cookie telling the client to drop `name`, expiring at the Unix epoch.
    pub fn removal(name: &str, options: &SessionOptions) -> Self {
        Self {
            name: name.to_string(),
            value: String::new(),
            path: COOKIE_PATH.to_string(),
            http_only: options.http_only,
            secure: options.secure,
            expires: unix_epoch(),
        }
    }

    /// Whether this cookie deletes the client's copy.
    pub fn is_removal(&self) -> bool {
        self.expires <= unix_epoch()
    }
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Request side: where session IDs are read from.
pub trait CookieSource {
    /// Value of the cookie called `name`, if the client sent one.
    fn cookie(&self, name: &str) -> Option<String>;
}

/// Response side: where refreshed cookies are written to.
pub trait CookieSink {
    /// Queue `cookie` for the response.
    fn set_cookie(&mut self, cookie: SessionCookie);
}

/// Plain in-memory cookie carrier.
///
/// Useful for non-HTTP callers and tests: seed incoming cookies, then
/// inspect what the manager wrote.
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    incoming: HashMap<String, String>,
    written: Vec<SessionCookie>,
}

impl CookieJar {
    /// Create an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an incoming cookie.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.incoming.insert(name.into(), value.into());
        self
    }

    /// Cookies written so far, oldest first.
    pub fn written(&self) -> &[SessionCookie] {
        &self.written
    }

    /// Most recent cookie written under `name`.
    pub fn last(&self, name: &str) -> Option<&SessionCookie> {
        self.written.iter().rev().find(|c| c.name == name)
    }

    /// Feed written cookies back as incoming ones, like a browser would.
    ///
    /// Removal cookies delete the incoming entry.
    pub fn apply_written(&mut self) {
        for cookie in self.written.drain(..) {
            if cookie.is_removal() {
                self.incoming.remove(&cookie.name);
            } else {
                self.incoming.insert(cookie.name, cookie.value);
            }
        }
    }
}

impl CookieSource for CookieJar {
    fn cookie(&self, name: &str) -> Option<String> {
        self.incoming.get(name).cloned()
    }
}

impl CookieSink for CookieJar {
    fn set_cookie(&mut self, cookie: SessionCookie) {
        self.written.push(cookie);
    }
}
