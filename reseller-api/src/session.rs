//! Session token handling for the `coreSID` cookie.
//!
//! The API issues its session token through `Set-Cookie: coreSID=...` and
//! expects it back as `Cookie: coreSID=...` on every later call. The store
//! holds one token, last write wins. It never expires or persists the token;
//! both are left to the server and the caller respectively.

use regex::Regex;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, SET_COOKIE};
use std::sync::{LazyLock, Mutex, MutexGuard};

use crate::error::FetchError;

/// Name of the session cookie issued by the API.
pub const SESSION_COOKIE: &str = "coreSID";

static SESSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[;,]\s*)coreSID=([^;,\s]*)").expect("static regex is valid")
});

/// Extract the `coreSID` value from one `Set-Cookie` header value.
///
/// Returns `None` when the header carries no such cookie.
pub fn extract_from_set_cookie(header: &str) -> Option<String> {
    SESSION_RE
        .captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
}

/// Thread-safe holder for the current session token.
///
/// Concurrent requests sharing one store race on rotation: whichever
/// response is observed last determines the token used afterwards.
#[derive(Debug, Default)]
pub struct SessionStore {
    sid: Mutex<Option<String>>,
}

impl SessionStore {
    /// Empty store; no cookie is sent until a token is observed or set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token, if any.
    pub fn get(&self) -> Option<String> {
        self.lock().clone()
    }

    /// Replace the current token; `None` or an empty token drops it.
    pub fn set(&self, session: Option<String>) {
        *self.lock() = session.filter(|s| !s.is_empty());
    }

    /// Update the token from every `Set-Cookie` header in a response.
    ///
    /// Returns `true` if a session cookie was found. Headers without one
    /// leave the current token unchanged; an empty `coreSID=` clears it.
    pub fn observe(&self, headers: &HeaderMap) -> bool {
        let found = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(extract_from_set_cookie)
            .last();
        match found {
            Some(sid) => {
                let mut guard = self.lock();
                if sid.is_empty() {
                    tracing::debug!("session cookie cleared by server");
                    *guard = None;
                } else {
                    if guard.as_deref() != Some(sid.as_str()) {
                        tracing::debug!("session cookie rotated");
                    }
                    *guard = Some(sid);
                }
                true
            }
            None => false,
        }
    }

    /// Add `Cookie: coreSID=<token>` to `headers` when a token is held.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<(), FetchError> {
        if let Some(sid) = self.lock().as_deref() {
            let value = HeaderValue::from_str(&format!("{SESSION_COOKIE}={sid}"))?;
            headers.insert(COOKIE, value);
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        // A poisoned lock still holds a valid Option<String>.
        self.sid
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
