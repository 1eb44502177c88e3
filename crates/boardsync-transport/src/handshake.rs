//! What a client presented when it opened a connection.

use std::collections::HashMap;
use std::net::SocketAddr;

/// Cookies and query parameters captured from the opening request.
///
/// Session credentials travel as cookies; the board to auto-join travels
/// as a query parameter. Both are captured once, at upgrade time, and stay
/// immutable for the life of the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    cookies: HashMap<String, String>,
    query: HashMap<String, String>,
    peer_addr: Option<SocketAddr>,
}

impl Handshake {
    /// Builds a handshake from raw `Cookie` header values and a raw query
    /// string (without the leading `?`).
    pub fn from_parts<'a>(
        cookie_headers: impl IntoIterator<Item = &'a str>,
        query: Option<&str>,
    ) -> Self {
        let mut cookies = HashMap::new();
        for header in cookie_headers {
            for pair in header.split(';') {
                let Some((name, value)) = pair.split_once('=') else {
                    continue;
                };
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                let value = value.trim().trim_matches('"');
                cookies.insert(name.to_string(), value.to_string());
            }
        }

        let query = query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();

        Self {
            cookies,
            query,
            peer_addr: None,
        }
    }

    /// Records the remote address.
    pub fn with_peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    /// Adds a cookie. Mostly useful for in-process connections.
    pub fn with_cookie(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Adds a query parameter. Mostly useful for in-process connections.
    pub fn with_query(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Returns the named cookie, if present and non-empty.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Returns the named query parameter, if present and non-empty.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }
}
