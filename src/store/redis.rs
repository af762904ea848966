//! Redis-backed [`Store`] for sharing state across instances.
//!
//! `GET`/`SET EX`/`DEL` cover the plain contract; `compare_and_set` is
//! implemented with a small Lua script so the check-then-write is atomic
//! from Redis's point of view. A bare GET-then-SET from the client side
//! would reintroduce the lost-update race this is meant to close.

use super::{Store, StoreError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

const CAS_SCRIPT: &str = r#"
local key = KEYS[1]
local expected = ARGV[1]
local new_value = ARGV[2]
local ttl_ms = tonumber(ARGV[3])
local has_expected = ARGV[4]

local current = redis.call('GET', key)

if has_expected == '1' then
    if current ~= expected then
        return 0
    end
else
    if current then
        return 0
    end
end

redis.call('SET', key, new_value, 'PX', ttl_ms)
return 1
"#;

/// Redis-backed store, sharing one [`ConnectionManager`] (which reconnects
/// and queues on its own) across all keys.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    script: redis::Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Io(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self {
            manager,
            script: redis::Script::new(CAS_SCRIPT),
        })
    }

    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self {
            manager,
            script: redis::Script::new(CAS_SCRIPT),
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        value.ok_or(StoreError::NotFound)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let ttl_secs = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(key, value, ttl_secs)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let _: () = conn.del(key).await.map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();
        let ttl_ms = ttl.as_millis().max(1) as u64;
        let (expected_arg, has_expected): (Vec<u8>, &str) = match expected {
            Some(bytes) => (bytes.to_vec(), "1"),
            None => (Vec::new(), "0"),
        };

        let result: i32 = self
            .script
            .key(key)
            .arg(expected_arg)
            .arg(new_value)
            .arg(ttl_ms)
            .arg(has_expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(result == 1)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Io(format!("unexpected PING reply: {pong}")))
        }
    }
}
