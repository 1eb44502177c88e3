//! Account operations: signup, login, refresh, signout, logout-all.
//!
//! These are the operations an HTTP auth controller exposes. Each one
//! takes the caller's current session (if any) and returns the credentials
//! to store back in cookies.

use std::sync::Arc;

use boardsync_protocol::IdentityId;

use crate::{
    AuthError, IdentityProvider, IdentityStatus, NewAccount, Registration,
    SessionCredentials, SessionResolver, SessionStore,
};

/// Login form.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LoginForm {
    pub login: String,
    pub password: String,
}

pub struct Accounts<S, P> {
    resolver: Arc<SessionResolver<S, P>>,
}

impl<S, P> Clone for Accounts<S, P> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
        }
    }
}

impl<S: SessionStore, P: IdentityProvider> Accounts<S, P> {
    pub fn new(resolver: Arc<SessionResolver<S, P>>) -> Self {
        Self { resolver }
    }

    /// Registers credentials. An anonymous session is promoted in place and
    /// keeps its id; without a usable session a new identity is created.
    ///
    /// # Errors
    /// - `AlreadyAuthorized` if the current session is already registered
    /// - `LoginTaken` if another identity owns `login`
    pub async fn signup(
        &self,
        session: Option<&SessionCredentials>,
        registration: Registration,
    ) -> Result<SessionCredentials, AuthError> {
        let current = match session {
            Some(credentials) => {
                match self.resolver.verify_session(credentials).await {
                    Ok(identity) => Some(identity),
                    Err(e) => {
                        tracing::debug!(error = %e, "session is invalid");
                        None
                    }
                }
            }
            None => None,
        };
        if current
            .as_ref()
            .is_some_and(|i| i.status == IdentityStatus::Authorized)
        {
            return Err(AuthError::AlreadyAuthorized);
        }
        let current_id = current.map(|identity| identity.id);

        let identities = self.resolver.identities();
        let owner = identities.find_by_login(&registration.login).await?;
        if owner.is_some_and(|owner| Some(owner.id) != current_id) {
            return Err(AuthError::LoginTaken);
        }

        let authority = self.resolver.authority();
        let password_hash =
            authority.passwords().hash(&registration.password).await?;
        let identity = identities
            .register(
                current_id,
                NewAccount {
                    name: registration.name,
                    login: registration.login,
                    password_hash,
                },
            )
            .await?;

        let pair = authority
            .login(identity.id, &registration.password, &identity.password_hash)
            .await?;
        tracing::info!(identity = %identity.id, login = %identity.login, "signed up");
        Ok(pair.into())
    }

    /// Logs in by login and password.
    ///
    /// # Errors
    /// - `Unauthenticated` if no authorized identity has this login
    /// - `Forbidden` if the password is wrong
    pub async fn login(
        &self,
        form: LoginForm,
    ) -> Result<SessionCredentials, AuthError> {
        let identity = self
            .resolver
            .identities()
            .find_by_login(&form.login)
            .await?
            .filter(|i| i.status == IdentityStatus::Authorized)
            .ok_or(AuthError::Unauthenticated)?;

        let pair = self
            .resolver
            .authority()
            .login(identity.id, &form.password, &identity.password_hash)
            .await
            .inspect_err(|e| {
                tracing::warn!(login = %form.login, error = %e, "login failed");
            })?;
        tracing::info!(identity = %identity.id, login = %identity.login, "logged in");
        Ok(pair.into())
    }

    /// Rotates the session's refresh token.
    ///
    /// # Errors
    /// `Unauthenticated` without a session, otherwise whatever
    /// [`TokenAuthority::refresh`](crate::TokenAuthority::refresh) reports.
    pub async fn refresh(
        &self,
        session: Option<&SessionCredentials>,
    ) -> Result<SessionCredentials, AuthError> {
        let session = session.ok_or(AuthError::Unauthenticated)?;
        let pair = self
            .resolver
            .authority()
            .refresh(session.identity_id, &session.refresh_token)
            .await
            .inspect_err(|e| {
                tracing::warn!(identity = %session.identity_id, error = %e, "token refresh failed");
            })?;
        Ok(pair.into())
    }

    /// Logs out the current session if it verifies. Always succeeds; the
    /// caller clears the cookies with
    /// [`SessionCredentials::clear_cookies`].
    pub async fn signout(&self, session: Option<&SessionCredentials>) {
        let Some(session) = session else {
            return;
        };
        match self.resolver.verify_session(session).await {
            Ok(identity) => {
                self.resolver
                    .authority()
                    .logout(identity.id, &session.refresh_token)
                    .await;
            }
            Err(e) => tracing::debug!(error = %e, "session is invalid"),
        }
    }

    /// Ends every session of the caller's identity.
    ///
    /// # Errors
    /// The strict session check's failure, or a store failure.
    pub async fn logout_all(
        &self,
        session: Option<&SessionCredentials>,
    ) -> Result<(IdentityId, i64), AuthError> {
        let session = session.ok_or(AuthError::Unauthenticated)?;
        let identity = self.resolver.verify_session(session).await?;
        let version = self.resolver.authority().logout_all(identity.id).await?;
        Ok((identity.id, version))
    }
}
