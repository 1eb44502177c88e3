//! Token issuing, verification, rotation and revocation.
//!
//! A login produces a [`TokenPair`]: a short-lived access token and a
//! longer-lived refresh token, both HS256 JWTs sharing one `jti` and one
//! session-version snapshot. Three kinds of records in the
//! [`SessionStore`] make the pair revocable:
//!
//! ```text
//! auth:user:refresh:{id}:{jti}         SHA-256 of the refresh token (single use)
//! auth:user:access-revoked:{id}:{jti}  "1" once the pair was logged out
//! auth:user:session-version:{id}       counter; absent means 1
//! ```
//!
//! An access token is valid iff no revocation marker exists for its `jti`
//! and its embedded version equals the identity's current version.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use boardsync_protocol::IdentityId;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{AuthError, Passwords, SessionStore};

/// Signing secret and lifetimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub secret: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 7 * 24 * 3600,
        }
    }
}

/// Which role a token was minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT payload shared by both token kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: IdentityId,
    pub jti: String,
    #[serde(rename = "sessionVersion")]
    pub session_version: i64,
    pub iat: u64,
    pub exp: u64,
    pub kind: TokenKind,
}

/// A freshly signed access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub identity_id: IdentityId,
    pub access_token: String,
    pub refresh_token: String,
    pub jti: String,
    pub session_version: i64,
    pub access_expires_at: u64,
    pub refresh_expires_at: u64,
}

/// Outcome of [`TokenAuthority::validate_access`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    Ok,
    Revoked,
    InvalidVersion,
}

fn refresh_key(id: IdentityId, jti: &str) -> String {
    format!("auth:user:refresh:{id}:{jti}")
}

fn revoked_key(id: IdentityId, jti: &str) -> String {
    format!("auth:user:access-revoked:{id}:{jti}")
}

fn version_key(id: IdentityId) -> String {
    format!("auth:user:session-version:{id}")
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Seconds until `exp`, never less than one.
fn ttl_until(exp: u64) -> Duration {
    Duration::from_secs(exp.saturating_sub(unix_now()).max(1))
}

fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Compares digests in time independent of where they first differ.
fn digests_match(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn parse_version(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.parse().ok()).unwrap_or(1)
}

/// Issues, verifies, rotates and revokes token pairs.
pub struct TokenAuthority<S> {
    store: S,
    config: TokenConfig,
    passwords: Passwords,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl<S: SessionStore> TokenAuthority<S> {
    pub fn new(store: S, config: TokenConfig, passwords: Passwords) -> Self {
        let encoding = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            store,
            config,
            passwords,
            encoding,
            decoding,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn passwords(&self) -> &Passwords {
        &self.passwords
    }

    /// Current session version of an identity (1 when never bumped).
    pub async fn session_version(
        &self,
        id: IdentityId,
    ) -> Result<i64, AuthError> {
        let raw = self.store.get(&version_key(id)).await?;
        Ok(parse_version(raw.as_deref()))
    }

    /// Signs a new pair embedding the current session version and a fresh
    /// `jti`. Nothing is persisted; see [`save_refresh_hash`](Self::save_refresh_hash).
    pub async fn sign_tokens(
        &self,
        id: IdentityId,
    ) -> Result<TokenPair, AuthError> {
        let session_version = self.session_version(id).await?;
        let jti = uuid::Uuid::new_v4().to_string();
        let iat = unix_now();
        let access_expires_at = iat + self.config.access_ttl_secs;
        let refresh_expires_at = iat + self.config.refresh_ttl_secs;

        let claims = |kind, exp| Claims {
            sub: id,
            jti: jti.clone(),
            session_version,
            iat,
            exp,
            kind,
        };
        let header = Header::new(Algorithm::HS256);
        let access_token = encode(
            &header,
            &claims(TokenKind::Access, access_expires_at),
            &self.encoding,
        )
        .map_err(AuthError::Signing)?;
        let refresh_token = encode(
            &header,
            &claims(TokenKind::Refresh, refresh_expires_at),
            &self.encoding,
        )
        .map_err(AuthError::Signing)?;

        Ok(TokenPair {
            identity_id: id,
            access_token,
            refresh_token,
            jti,
            session_version,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Stores the SHA-256 of a refresh token under its record key, expiring
    /// with the token. The raw token is never stored.
    pub async fn save_refresh_hash(
        &self,
        id: IdentityId,
        jti: &str,
        token: &str,
        exp: u64,
    ) -> Result<(), AuthError> {
        self.store
            .set_ex(&refresh_key(id, jti), &digest(token), ttl_until(exp))
            .await?;
        Ok(())
    }

    /// Signs a pair and persists its refresh record.
    pub async fn issue(&self, id: IdentityId) -> Result<TokenPair, AuthError> {
        let pair = self.sign_tokens(id).await?;
        self.save_refresh_hash(
            id,
            &pair.jti,
            &pair.refresh_token,
            pair.refresh_expires_at,
        )
        .await?;
        Ok(pair)
    }

    /// Checks signature, expiry and role of a token.
    ///
    /// # Errors
    /// `AuthError::Unauthenticated` for any bad, expired or wrong-kind
    /// token.
    pub fn verify(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "token verification failed");
                AuthError::Unauthenticated
            })?
            .claims;
        if claims.kind != kind {
            return Err(AuthError::Unauthenticated);
        }
        Ok(claims)
    }

    /// Revocation and version check from one atomic read of both keys.
    /// A revoked `jti` wins over a version mismatch.
    pub async fn validate_access(
        &self,
        id: IdentityId,
        jti: &str,
        session_version: i64,
    ) -> Result<AccessStatus, AuthError> {
        let keys = [revoked_key(id, jti), version_key(id)];
        let values = self.store.get_many(&keys).await?;
        let revoked = values.first().is_some_and(Option::is_some);
        let current =
            parse_version(values.get(1).and_then(|v| v.as_deref()));

        Ok(if revoked {
            AccessStatus::Revoked
        } else if session_version != current {
            AccessStatus::InvalidVersion
        } else {
            AccessStatus::Ok
        })
    }

    /// Exchanges a refresh token for a new pair.
    ///
    /// The old record is consumed before the hash is compared, so a token
    /// is single-use even when the comparison fails.
    ///
    /// # Errors
    /// - `Unauthenticated` if the token is not a valid refresh JWT
    /// - `Forbidden` if the subject differs, the record is missing, the
    ///   hash mismatches, or the token predates a logout-all
    pub async fn refresh(
        &self,
        id: IdentityId,
        refresh_token: &str,
    ) -> Result<TokenPair, AuthError> {
        let claims = self.verify(refresh_token, TokenKind::Refresh)?;
        if claims.sub != id {
            return Err(AuthError::Forbidden);
        }

        let stored = self
            .store
            .take(&refresh_key(id, &claims.jti))
            .await?
            .ok_or(AuthError::Forbidden)?;
        if !digests_match(&stored, &digest(refresh_token)) {
            return Err(AuthError::Forbidden);
        }
        if claims.session_version != self.session_version(id).await? {
            return Err(AuthError::Forbidden);
        }

        let pair = self.issue(id).await?;
        tracing::info!(identity = %id, "token refreshed");
        Ok(pair)
    }

    /// Verifies a password and issues a pair.
    ///
    /// # Errors
    /// `Forbidden` if the password does not match `stored_hash`.
    pub async fn login(
        &self,
        id: IdentityId,
        password: &str,
        stored_hash: &str,
    ) -> Result<TokenPair, AuthError> {
        if !self.passwords.verify(password, stored_hash).await? {
            return Err(AuthError::Forbidden);
        }
        self.issue(id).await
    }

    /// Best-effort logout of one pair: drops its refresh record and marks
    /// its access `jti` revoked until the access token would expire anyway.
    pub async fn logout(&self, id: IdentityId, refresh_token: &str) {
        let claims = match self.verify(refresh_token, TokenKind::Refresh) {
            Ok(claims) if claims.sub == id => claims,
            Ok(_) => {
                tracing::debug!(identity = %id, "logout with foreign token");
                return;
            }
            Err(e) => {
                tracing::debug!(identity = %id, error = %e, "logout failed");
                return;
            }
        };

        if let Err(e) =
            self.store.delete(&[refresh_key(id, &claims.jti)]).await
        {
            tracing::debug!(identity = %id, error = %e, "logout failed");
        }
        let access_exp = claims.iat + self.config.access_ttl_secs;
        if let Err(e) = self
            .store
            .set_ex(&revoked_key(id, &claims.jti), "1", ttl_until(access_exp))
            .await
        {
            tracing::debug!(identity = %id, error = %e, "logout failed");
        }
    }

    /// Ends every session of an identity: deletes all refresh records and
    /// bumps the session version. Returns the new version.
    pub async fn logout_all(&self, id: IdentityId) -> Result<i64, AuthError> {
        let records = self
            .store
            .keys(&format!("auth:user:refresh:{id}:*"))
            .await?;
        self.store.delete(&records).await?;
        let version = self.store.incr_persist(&version_key(id)).await?;
        tracing::info!(identity = %id, version, "all sessions ended");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{MemoryStore, password};

    fn authority() -> TokenAuthority<MemoryStore> {
        TokenAuthority::new(
            MemoryStore::new(),
            TokenConfig {
                secret: "test-secret".into(),
                ..TokenConfig::default()
            },
            password::cheap(),
        )
    }

    // =====================================================================
    // sign / verify
    // =====================================================================

    #[tokio::test]
    async fn test_sign_tokens_share_jti_and_version() {
        let auth = authority();
        let id = IdentityId::new_v4();
        let pair = auth.sign_tokens(id).await.unwrap();

        let access = auth.verify(&pair.access_token, TokenKind::Access).unwrap();
        let refresh =
            auth.verify(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert_eq!(access.sub, id);
        assert_eq!(access.jti, refresh.jti);
        assert_eq!(access.session_version, 1);
        assert!(refresh.exp > access.exp);
        // Signing alone persists nothing.
        assert!(auth.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_verify_rejects_wrong_kind() {
        let auth = authority();
        let pair = auth.sign_tokens(IdentityId::new_v4()).await.unwrap();
        assert!(matches!(
            auth.verify(&pair.access_token, TokenKind::Refresh),
            Err(AuthError::Unauthenticated)
        ));
        assert!(matches!(
            auth.verify(&pair.refresh_token, TokenKind::Access),
            Err(AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_verify_rejects_foreign_secret() {
        let auth = authority();
        let other = TokenAuthority::new(
            MemoryStore::new(),
            TokenConfig {
                secret: "another-secret".into(),
                ..TokenConfig::default()
            },
            password::cheap(),
        );
        let pair = other.sign_tokens(IdentityId::new_v4()).await.unwrap();
        assert!(auth.verify(&pair.access_token, TokenKind::Access).is_err());
        assert!(auth.verify("garbage", TokenKind::Access).is_err());
    }

    #[tokio::test]
    async fn test_save_refresh_hash_never_stores_raw_token() {
        let auth = authority();
        let id = IdentityId::new_v4();
        let pair = auth.issue(id).await.unwrap();

        let stored = auth
            .store()
            .get(&refresh_key(id, &pair.jti))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stored, pair.refresh_token);
        assert_eq!(stored.len(), 64);
    }

    // =====================================================================
    // refresh
    // =====================================================================

    #[tokio::test]
    async fn test_refresh_rotates_and_old_token_is_single_use() {
        let auth = authority();
        let id = IdentityId::new_v4();
        let hash = auth.passwords().hash("pw").await.unwrap();

        let first = auth.login(id, "pw", &hash).await.unwrap();
        let second = auth.refresh(id, &first.refresh_token).await.unwrap();
        assert_ne!(first.jti, second.jti);

        let replay = auth.refresh(id, &first.refresh_token).await;
        assert!(matches!(replay, Err(AuthError::Forbidden)));

        // The rotated token still works.
        assert!(auth.refresh(id, &second.refresh_token).await.is_ok());
    }

    #[test]
    fn test_digests_match_requires_same_bytes_and_length() {
        let d = digest("token");
        assert!(digests_match(&d, &digest("token")));
        assert!(!digests_match(&d, &digest("other")));
        assert!(!digests_match(&d, &d[..63]));
    }

    #[tokio::test]
    async fn test_refresh_with_tampered_record_is_forbidden_and_consumed() {
        let auth = authority();
        let id = IdentityId::new_v4();
        let pair = auth.issue(id).await.unwrap();
        let key = refresh_key(id, &pair.jti);
        auth.store()
            .set_ex(&key, &digest("someone else"), Duration::from_secs(60))
            .await
            .unwrap();

        let result = auth.refresh(id, &pair.refresh_token).await;
        assert!(matches!(result, Err(AuthError::Forbidden)));
        assert!(auth.store().get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_other_subject_is_forbidden() {
        let auth = authority();
        let id = IdentityId::new_v4();
        let pair = auth.issue(id).await.unwrap();
        let result = auth.refresh(IdentityId::new_v4(), &pair.refresh_token).await;
        assert!(matches!(result, Err(AuthError::Forbidden)));
    }

    #[tokio::test]
    async fn test_refresh_with_access_token_is_unauthenticated() {
        let auth = authority();
        let id = IdentityId::new_v4();
        let pair = auth.issue(id).await.unwrap();
        let result = auth.refresh(id, &pair.access_token).await;
        assert!(matches!(result, Err(AuthError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_refresh_concurrent_attempts_exactly_one_succeeds() {
        let auth = Arc::new(authority());
        let id = IdentityId::new_v4();
        let pair = auth.issue(id).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let auth = Arc::clone(&auth);
            let token = pair.refresh_token.clone();
            handles.push(tokio::spawn(async move {
                auth.refresh(id, &token).await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert!(matches!(e, AuthError::Forbidden)),
            }
        }
        assert_eq!(ok, 1);
    }

    // =====================================================================
    // login / logout / logout_all
    // =====================================================================

    #[tokio::test]
    async fn test_login_wrong_password_is_forbidden() {
        let auth = authority();
        let hash = auth.passwords().hash("right").await.unwrap();
        let result = auth.login(IdentityId::new_v4(), "wrong", &hash).await;
        assert!(matches!(result, Err(AuthError::Forbidden)));
    }

    #[tokio::test]
    async fn test_logout_revokes_only_that_pair() {
        let auth = authority();
        let id = IdentityId::new_v4();
        let a = auth.issue(id).await.unwrap();
        let b = auth.issue(id).await.unwrap();

        auth.logout(id, &a.refresh_token).await;

        assert_eq!(
            auth.validate_access(id, &a.jti, a.session_version).await.unwrap(),
            AccessStatus::Revoked
        );
        assert_eq!(
            auth.validate_access(id, &b.jti, b.session_version).await.unwrap(),
            AccessStatus::Ok
        );
        assert!(matches!(
            auth.refresh(id, &a.refresh_token).await,
            Err(AuthError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_logout_with_garbage_token_is_silent() {
        let auth = authority();
        auth.logout(IdentityId::new_v4(), "not-a-token").await;
        assert!(auth.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_logout_all_bumps_version_and_invalidates_old_tokens() {
        let auth = authority();
        let id = IdentityId::new_v4();
        let before = auth.issue(id).await.unwrap();

        let v2 = auth.logout_all(id).await.unwrap();
        assert_eq!(v2, 2);
        let v3 = auth.logout_all(id).await.unwrap();
        assert!(v3 > v2);

        assert_eq!(
            auth.validate_access(id, &before.jti, before.session_version)
                .await
                .unwrap(),
            AccessStatus::InvalidVersion
        );
        assert!(matches!(
            auth.refresh(id, &before.refresh_token).await,
            Err(AuthError::Forbidden)
        ));

        let after = auth.issue(id).await.unwrap();
        assert_eq!(after.session_version, v3);
        assert_eq!(
            auth.validate_access(id, &after.jti, after.session_version)
                .await
                .unwrap(),
            AccessStatus::Ok
        );
    }

    #[tokio::test]
    async fn test_validate_access_revoked_wins_over_version() {
        let auth = authority();
        let id = IdentityId::new_v4();
        let pair = auth.issue(id).await.unwrap();
        auth.logout(id, &pair.refresh_token).await;
        auth.logout_all(id).await.unwrap();

        assert_eq!(
            auth.validate_access(id, &pair.jti, pair.session_version)
                .await
                .unwrap(),
            AccessStatus::Revoked
        );
    }
}
