//! Identity records and the provider that stores them.
//!
//! The session layer never owns user storage. It talks to an
//! [`IdentityProvider`] (a database-backed user repository in production)
//! and only keeps the identity id inside tokens.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use boardsync_protocol::IdentityId;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::AuthError;

/// Whether an identity has registered credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityStatus {
    Anonymous,
    Authorized,
}

/// A user as the session layer sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: IdentityId,
    pub status: IdentityStatus,
    pub name: String,
    pub login: String,
    pub password_hash: String,
}

/// Signup form.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub name: String,
    pub login: String,
    pub password: String,
}

/// Credentials to store when an identity becomes authorized. The password
/// is already hashed.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub login: String,
    pub password_hash: String,
}

/// Storage of identities.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Looks up an identity by id.
    fn resolve(
        &self,
        id: IdentityId,
    ) -> impl Future<Output = Result<Option<Identity>, AuthError>> + Send;

    /// Creates a new anonymous identity with the given password hash.
    fn upsert_anonymous(
        &self,
        password_hash: String,
    ) -> impl Future<Output = Result<Identity, AuthError>> + Send;

    /// Looks up an identity by login.
    fn find_by_login(
        &self,
        login: &str,
    ) -> impl Future<Output = Result<Option<Identity>, AuthError>> + Send;

    /// Stores `account` as an authorized identity. With `existing` set the
    /// identity is promoted in place and keeps its id; otherwise a new one
    /// is created.
    ///
    /// Returns `AuthError::LoginTaken` if another identity owns the login.
    fn register(
        &self,
        existing: Option<IdentityId>,
        account: NewAccount,
    ) -> impl Future<Output = Result<Identity, AuthError>> + Send;
}

/// In-process [`IdentityProvider`]. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentities {
    identities: Arc<Mutex<HashMap<IdentityId, Identity>>>,
}

impl MemoryIdentities {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.identities.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl IdentityProvider for MemoryIdentities {
    async fn resolve(
        &self,
        id: IdentityId,
    ) -> Result<Option<Identity>, AuthError> {
        Ok(self.identities.lock().await.get(&id).cloned())
    }

    async fn upsert_anonymous(
        &self,
        password_hash: String,
    ) -> Result<Identity, AuthError> {
        let identity = Identity {
            id: IdentityId::new_v4(),
            status: IdentityStatus::Anonymous,
            name: String::new(),
            login: String::new(),
            password_hash,
        };
        self.identities
            .lock()
            .await
            .insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn find_by_login(
        &self,
        login: &str,
    ) -> Result<Option<Identity>, AuthError> {
        if login.is_empty() {
            return Ok(None);
        }
        Ok(self
            .identities
            .lock()
            .await
            .values()
            .find(|identity| identity.login == login)
            .cloned())
    }

    async fn register(
        &self,
        existing: Option<IdentityId>,
        account: NewAccount,
    ) -> Result<Identity, AuthError> {
        let mut identities = self.identities.lock().await;
        // Anonymous identities all share the blank login.
        let taken = !account.login.is_empty()
            && identities.values().any(|identity| {
                identity.login == account.login && Some(identity.id) != existing
            });
        if taken {
            return Err(AuthError::LoginTaken);
        }

        let id = existing
            .filter(|id| identities.contains_key(id))
            .unwrap_or_else(IdentityId::new_v4);
        let identity = Identity {
            id,
            status: IdentityStatus::Authorized,
            name: account.name,
            login: account.login,
            password_hash: account.password_hash,
        };
        identities.insert(id, identity.clone());
        Ok(identity)
    }
}
