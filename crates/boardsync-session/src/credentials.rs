//! Session credentials as carried by clients.
//!
//! Browsers hold a session in three cookies: `access_token`,
//! `refresh_token` and `user_id`. API responses carry the same triple as
//! JSON `{accessToken, refreshToken, userId}`.

use boardsync_protocol::IdentityId;
use serde::{Deserialize, Serialize};

use crate::TokenPair;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";
pub const USER_COOKIE: &str = "user_id";

/// The token pair a client presents (or is handed) for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredentials {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(rename = "userId")]
    pub identity_id: IdentityId,
}

impl From<TokenPair> for SessionCredentials {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            identity_id: pair.identity_id,
        }
    }
}

impl SessionCredentials {
    /// Reads credentials from cookies via `cookie`, a lookup by cookie
    /// name.
    ///
    /// Returns `None` when `user_id` is absent or not an id: that means
    /// "no session". Missing token cookies become empty strings, which
    /// then simply fail verification.
    pub fn from_cookies<'a, F>(cookie: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let identity_id = cookie(USER_COOKIE)?.parse().ok()?;
        Some(Self {
            access_token: cookie(ACCESS_COOKIE).unwrap_or_default().to_owned(),
            refresh_token: cookie(REFRESH_COOKIE)
                .unwrap_or_default()
                .to_owned(),
            identity_id,
        })
    }

    /// `Set-Cookie` header values storing this session.
    pub fn set_cookie_headers(&self) -> [String; 3] {
        [
            format!("{ACCESS_COOKIE}={}; Path=/; HttpOnly", self.access_token),
            format!("{REFRESH_COOKIE}={}; Path=/; HttpOnly", self.refresh_token),
            format!("{USER_COOKIE}={}; Path=/", self.identity_id),
        ]
    }

    /// `Set-Cookie` header values erasing a session.
    pub fn clear_cookies() -> [String; 3] {
        [ACCESS_COOKIE, REFRESH_COOKIE, USER_COOKIE]
            .map(|name| format!("{name}=; Path=/; Max-Age=0"))
    }
}
