//! Session state and cookie context

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use url::Url;
use uuid::Uuid;

use crate::error::Error;
use crate::transport::{ConnectionState, StateHandle};

/// Cookies presented during the WebSocket handshake
///
/// Supplied by an external login flow before `connect` and reused verbatim
/// by every reconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookies(BTreeMap<String, String>);

impl Cookies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a cookie
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value for a `Cookie` request header, `None` when empty
    pub fn header_value(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .0
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        Some(pairs.join("; "))
    }
}

impl FromIterator<(String, String)> for Cookies {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Parameters of the last connect call, reused by reconnect
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConnectParams {
    pub uri: String,
    pub heartbeat: Option<String>,
    pub timeout: Duration,
}

/// One logical connection
///
/// Created on every successful connect and dropped on disconnect or when the
/// next connect replaces it.
#[derive(Debug)]
pub(crate) struct Session {
    pub id: Uuid,
    pub uri: Url,
    pub heartbeat: Option<String>,
    pub cookies: Cookies,
    pub connected_at: DateTime<Utc>,
    pub state: StateHandle,
    pub last_error: Option<Arc<Error>>,
}

impl Session {
    pub fn new(uri: Url, heartbeat: Option<String>, cookies: Cookies, state: StateHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            uri,
            heartbeat,
            cookies,
            connected_at: Utc::now(),
            state,
            last_error: None,
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            uri: self.uri.to_string(),
            heartbeat: self.heartbeat.clone(),
            cookies: self.cookies.clone(),
            connected_at: self.connected_at,
            state: self.state.get(),
            last_error: self.last_error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Read-only snapshot of the current session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: Uuid,
    pub uri: String,
    pub heartbeat: Option<String>,
    /// Cookies presented by this session's handshake
    pub cookies: Cookies,
    pub connected_at: DateTime<Utc>,
    pub state: ConnectionState,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header() {
        let mut cookies = Cookies::new();
        assert_eq!(cookies.header_value(), None);

        cookies.insert("session", "abc");
        cookies.insert("lang", "en");
        assert_eq!(cookies.header_value().as_deref(), Some("lang=en; session=abc"));

        cookies.insert("session", "xyz");
        assert_eq!(cookies.get("session"), Some("xyz"));
        assert_eq!(cookies.len(), 2);
    }

    #[test]
    fn test_sessions_get_distinct_ids() {
        let uri = Url::parse("ws://localhost:8080/events").unwrap();
        let a = Session::new(uri.clone(), None, Cookies::new(), StateHandle::default());
        let b = Session::new(uri, None, Cookies::new(), StateHandle::default());
        assert_ne!(a.id, b.id);
        assert_eq!(a.info().uri, "ws://localhost:8080/events");
    }
}
