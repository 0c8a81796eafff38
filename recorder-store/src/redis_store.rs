//! Redis store implementation.
//!
//! Reads fetch the value and its `PTTL` inside one MULTI/EXEC so the TTL
//! belongs to the value that was read. The version token carries both. The
//! conditional write is a Lua script that commits only if the value is
//! unchanged and the expiry was not replaced in between: a key that gained
//! or lost its expiry, or whose `PTTL` grew since the read, is a conflict.
//! This keeps the CAS safe over a shared multiplexed connection, where
//! WATCH would be connection-scoped.
//!
//! A concurrent `EXPIRE` that only shortens the TTL is indistinguishable
//! from elapsed time and goes undetected; the write then restores the
//! residual TTL observed at read time.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;
use tracing::info;

use crate::error::StoreError;
use crate::repository::{CasToken, DocumentStore, Expiry, Snapshot};

const COMPARE_AND_SWAP: &str = r#"
local current = redis.call('GET', KEYS[1])
if current ~= ARGV[1] then
    return 0
end
local read_pttl = tonumber(ARGV[4])
local now_pttl = redis.call('PTTL', KEYS[1])
if (read_pttl < 0) ~= (now_pttl < 0) then
    return 0
end
if read_pttl >= 0 and now_pttl > read_pttl then
    return 0
end
local ttl = tonumber(ARGV[3])
if ttl > 0 then
    redis.call('SET', KEYS[1], ARGV[2], 'PX', ttl)
else
    redis.call('SET', KEYS[1], ARGV[2])
end
return 1
"#;

/// Token for a read: `<pttl>:<value>`.
fn encode_token(value: &str, pttl: i64) -> CasToken {
    CasToken::new(format!("{}:{}", pttl, value))
}

/// Split a token into the `PTTL` and value observed at read time.
fn decode_token(token: &CasToken) -> Result<(i64, &str), StoreError> {
    token
        .as_str()
        .split_once(':')
        .and_then(|(pttl, value)| pttl.parse::<i64>().ok().map(|pttl| (pttl, value)))
        .ok_or_else(|| StoreError::Database("malformed CAS token".to_string()))
}

/// Redis-backed document store.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    cas: Script,
}

impl RedisStore {
    /// Connect to Redis at `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client).await?;
        info!(url = %url, "Connected to Redis");
        Ok(Self { conn, cas: Script::new(COMPARE_AND_SWAP) })
    }

    /// Round-trip a PING.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Translate a `PTTL` reply. `-1` means no expiry.
fn expiry_from_pttl(pttl: i64) -> Expiry {
    if pttl > 0 {
        Expiry::After(Duration::from_millis(pttl as u64))
    } else if pttl == 0 {
        // About to expire; keep it expiring rather than promote to persistent
        Expiry::After(Duration::from_millis(1))
    } else {
        Expiry::Persistent
    }
}

/// Milliseconds to pass to `SET ... PX`; 0 means no expiry.
fn expiry_millis(expiry: Expiry) -> u64 {
    match expiry {
        Expiry::Persistent => 0,
        Expiry::After(ttl) => (ttl.as_millis() as u64).max(1),
    }
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn read(&self, key: &str) -> Result<Option<Snapshot>, StoreError> {
        let mut conn = self.conn.clone();
        let (value, pttl): (Option<String>, i64) =
            redis::pipe().atomic().get(key).pttl(key).query_async(&mut conn).await?;

        Ok(value.map(|value| Snapshot {
            token: encode_token(&value, pttl),
            value,
            expiry: expiry_from_pttl(pttl),
        }))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        token: &CasToken,
        value: String,
        expiry: Expiry,
    ) -> Result<bool, StoreError> {
        let (read_pttl, read_value) = decode_token(token)?;
        let mut conn = self.conn.clone();
        let swapped: i64 = self
            .cas
            .key(key)
            .arg(read_value)
            .arg(value)
            .arg(expiry_millis(expiry))
            .arg(read_pttl)
            .invoke_async(&mut conn)
            .await?;
        Ok(swapped == 1)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, expiry: Expiry) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        match expiry {
            Expiry::Persistent => {
                let _: () = conn.set(key, value).await?;
            },
            Expiry::After(_) => {
                let _: () = conn.pset_ex(key, value, expiry_millis(expiry)).await?;
            },
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn expiry(&self, key: &str) -> Result<Option<Expiry>, StoreError> {
        let mut conn = self.conn.clone();
        let pttl: i64 = conn.pttl(key).await?;
        // -2: key does not exist
        Ok((pttl != -2).then(|| expiry_from_pttl(pttl)))
    }
}
