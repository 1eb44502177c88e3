//! Error types for the session layer.

/// Errors raised by a [`SessionStore`](crate::SessionStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[cfg(feature = "redis")]
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    /// A counter key holds something that is not an integer.
    #[error("value at {key} is not an integer")]
    NotAnInteger { key: String },
}

/// Errors that can occur while issuing, checking, or rotating sessions.
///
/// The first group are authentication outcomes a client can cause; the last
/// three are internal failures. [`status_code`](Self::status_code) maps them
/// to HTTP-style codes so an outer surface never reports an auth failure
/// as a 500.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Bad, expired, or missing token, or an unknown identity.
    #[error("authentication failed")]
    Unauthenticated,

    /// Credentials were understood but rejected: wrong password, replayed
    /// or foreign refresh token, stale refresh token.
    #[error("forbidden")]
    Forbidden,

    /// The access token's `jti` was revoked by a logout.
    #[error("token revoked")]
    Revoked,

    /// The token was minted before the identity's last logout-all.
    #[error("session version is no longer valid")]
    InvalidSessionVersion,

    /// Signup was attempted from an already authorized session.
    #[error("identity is already authorized")]
    AlreadyAuthorized,

    /// Another identity already owns the requested login.
    #[error("login is already taken")]
    LoginTaken,

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("identity provider: {0}")]
    Identity(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("token signing: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("password hashing: {0}")]
    Password(String),
}

impl AuthError {
    /// Wraps a failure reported by an identity provider.
    pub fn identity(
        err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Identity(err.into())
    }

    /// HTTP-style status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::Unauthenticated
            | AuthError::Revoked
            | AuthError::InvalidSessionVersion
            | AuthError::AlreadyAuthorized => 401,
            AuthError::Forbidden => 403,
            AuthError::LoginTaken => 400,
            AuthError::Store(_)
            | AuthError::Identity(_)
            | AuthError::Signing(_)
            | AuthError::Password(_) => 500,
        }
    }

    /// Whether this is an internal failure rather than an auth outcome.
    pub fn is_internal(&self) -> bool {
        self.status_code() == 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_auth_failures_are_never_500() {
        for err in [
            AuthError::Unauthenticated,
            AuthError::Revoked,
            AuthError::InvalidSessionVersion,
            AuthError::AlreadyAuthorized,
        ] {
            assert_eq!(err.status_code(), 401, "{err}");
            assert!(!err.is_internal());
        }
        assert_eq!(AuthError::Forbidden.status_code(), 403);
        assert_eq!(AuthError::LoginTaken.status_code(), 400);
    }

    #[test]
    fn test_status_code_internal_failures_are_500() {
        let store = AuthError::from(StoreError::NotAnInteger { key: "k".into() });
        assert_eq!(store.status_code(), 500);
        assert_eq!(AuthError::identity("db down").status_code(), 500);
        assert_eq!(AuthError::Password("bad".into()).status_code(), 500);
    }
}
