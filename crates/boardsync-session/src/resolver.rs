//! Turning presented credentials into an identity.
//!
//! [`SessionResolver::resolve`] never rejects a client: a missing, expired
//! or revoked session is replaced by a brand-new anonymous identity, and the
//! credentials for it are returned so the caller can hand them back.
//! [`SessionResolver::verify_session`] is the strict form used where a real
//! session is required.

use std::sync::Arc;

use crate::{
    AccessStatus, AuthError, Identity, IdentityProvider, SessionCredentials,
    SessionStore, TokenAuthority, TokenKind, password,
};

/// Result of [`SessionResolver::resolve`].
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub identity: Identity,
    /// Set when a new anonymous session was created and the client does
    /// not know its credentials yet.
    pub issued: Option<SessionCredentials>,
}

pub struct SessionResolver<S, P> {
    authority: Arc<TokenAuthority<S>>,
    identities: P,
}

impl<S: SessionStore, P: IdentityProvider> SessionResolver<S, P> {
    pub fn new(authority: Arc<TokenAuthority<S>>, identities: P) -> Self {
        Self {
            authority,
            identities,
        }
    }

    pub fn authority(&self) -> &TokenAuthority<S> {
        &self.authority
    }

    pub fn identities(&self) -> &P {
        &self.identities
    }

    /// Resolves the identity behind `credentials` with no fallback.
    ///
    /// # Errors
    /// - `Unauthenticated` if the access token is bad or expired, belongs
    ///   to another identity, or its identity no longer exists
    /// - `Revoked` / `InvalidSessionVersion` per the revocation check
    pub async fn verify_session(
        &self,
        credentials: &SessionCredentials,
    ) -> Result<Identity, AuthError> {
        let claims = self
            .authority
            .verify(&credentials.access_token, TokenKind::Access)?;
        if claims.sub != credentials.identity_id {
            return Err(AuthError::Unauthenticated);
        }

        match self
            .authority
            .validate_access(claims.sub, &claims.jti, claims.session_version)
            .await?
        {
            AccessStatus::Ok => {}
            AccessStatus::Revoked => return Err(AuthError::Revoked),
            AccessStatus::InvalidVersion => {
                return Err(AuthError::InvalidSessionVersion);
            }
        }

        self.identities
            .resolve(claims.sub)
            .await?
            .ok_or(AuthError::Unauthenticated)
    }

    /// Resolves `credentials`, falling back to a new anonymous identity.
    ///
    /// # Errors
    /// Only if the anonymous identity itself cannot be created.
    pub async fn resolve(
        &self,
        credentials: Option<&SessionCredentials>,
    ) -> Result<ResolvedSession, AuthError> {
        if let Some(credentials) = credentials {
            match self.verify_session(credentials).await {
                Ok(identity) => {
                    return Ok(ResolvedSession {
                        identity,
                        issued: None,
                    });
                }
                Err(e) => tracing::debug!(
                    identity = %credentials.identity_id,
                    error = %e,
                    "session not usable, issuing anonymous identity"
                ),
            }
        }

        let (identity, issued) = self.create_anonymous().await?;
        Ok(ResolvedSession {
            identity,
            issued: Some(issued),
        })
    }

    /// Creates an anonymous identity with a random password and issues it a
    /// session.
    pub async fn create_anonymous(
        &self,
    ) -> Result<(Identity, SessionCredentials), AuthError> {
        let secret = password::random_secret();
        let hash = self.authority.passwords().hash(&secret).await?;
        let identity = self.identities.upsert_anonymous(hash).await?;
        let pair = self.authority.issue(identity.id).await?;
        tracing::info!(identity = %identity.id, "anonymous identity created");
        Ok((identity, pair.into()))
    }
}
