//! Redis-backed [`SessionStore`].
//!
//! Each operation is one round trip on a shared [`ConnectionManager`],
//! which reconnects on its own after a dropped connection. Atomicity comes
//! from Redis itself: `MGET` for snapshots, `GETDEL` for single-use records,
//! and a `MULTI` pipeline for the version bump.

use std::time::Duration;

use redis::aio::ConnectionManager;

use crate::{SessionStore, StoreError};

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects to the Redis server at `url` (e.g. `redis://127.0.0.1/`).
    ///
    /// # Errors
    /// Returns `StoreError::Redis` if the URL is invalid or the first
    /// connection attempt fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("connected to redis");
        Ok(Self { conn })
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

impl SessionStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await?;
        Ok(value)
    }

    async fn get_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<Option<String>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let values = redis::cmd("MGET")
            .arg(keys)
            .query_async::<_, Vec<Option<String>>>(&mut conn)
            .await?;
        Ok(values)
    }

    async fn set_ex(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value = redis::cmd("GETDEL")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await?;
        Ok(value)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed = redis::cmd("DEL")
            .arg(keys)
            .query_async::<_, u64>(&mut conn)
            .await?;
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let keys = redis::cmd("KEYS")
            .arg(pattern)
            .query_async::<_, Vec<String>>(&mut conn)
            .await?;
        Ok(keys)
    }

    async fn incr_persist(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        // SET NX seeds the implicit default of 1 so INCR yields 2 first.
        let (version,) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .ignore()
            .cmd("INCR")
            .arg(key)
            .cmd("PERSIST")
            .arg(key)
            .ignore()
            .query_async::<_, (i64,)>(&mut conn)
            .await?;
        Ok(version)
    }
}
