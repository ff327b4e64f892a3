use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, Script};

use remedy_state::error::StateError;
use remedy_state::key::{KeyKind, StateKey};
use remedy_state::store::{CasResult, StateStore, Versioned};

use crate::config::RedisConfig;
use crate::key_render::{render_key, strip_prefix};
use crate::scripts;

fn backend(e: impl std::fmt::Display) -> StateError {
    StateError::Backend(e.to_string())
}

/// Redis-backed implementation of [`StateStore`].
///
/// Uses a `deadpool-redis` connection pool and Lua scripts for atomicity.
/// Every entry is a Redis hash with fields `v` (value) and `ver` (version).
pub struct RedisStateStore {
    pool: Pool,
    prefix: String,
}

impl RedisStateStore {
    /// Create a new `RedisStateStore` from the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, StateError> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| StateError::Connection(e.to_string()))?
            .map_err(|e| StateError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            prefix: config.prefix.clone(),
        })
    }

    fn redis_key(&self, key: &StateKey) -> String {
        render_key(&self.prefix, key)
    }

    /// Obtain a connection from the pool.
    async fn conn(&self) -> Result<deadpool_redis::Connection, StateError> {
        self.pool
            .get()
            .await
            .map_err(|e| StateError::Connection(e.to_string()))
    }

    /// SCAN every key matching `pattern` and read its value.
    async fn scan_pattern(&self, pattern: &str) -> Result<Vec<(String, String)>, StateError> {
        let mut conn = self.conn().await?;
        let mut results = Vec::new();
        let mut cursor = 0u64;

        loop {
            let (new_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(backend)?;

            for key in keys {
                // The key may have been deleted since SCAN saw it.
                let val: Option<String> = conn.hget(&key, "v").await.map_err(backend)?;
                if let Some(value) = val {
                    results.push((strip_prefix(&self.prefix, &key).to_owned(), value));
                }
            }

            cursor = new_cursor;
            if cursor == 0 {
                break;
            }
        }

        results.sort();
        Ok(results)
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn check_and_set(&self, key: &StateKey, value: &str) -> Result<bool, StateError> {
        let mut conn = self.conn().await?;
        let result: i64 = Script::new(scripts::CHECK_AND_SET)
            .key(self.redis_key(key))
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;

        Ok(result == 1)
    }

    async fn get_versioned(&self, key: &StateKey) -> Result<Option<Versioned>, StateError> {
        let mut conn = self.conn().await?;
        let (value, version): (Option<String>, Option<u64>) = redis::cmd("HMGET")
            .arg(self.redis_key(key))
            .arg("v")
            .arg("ver")
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        Ok(value.map(|value| Versioned {
            value,
            version: version.unwrap_or(1),
        }))
    }

    async fn set(&self, key: &StateKey, value: &str) -> Result<(), StateError> {
        let mut conn = self.conn().await?;
        let _version: i64 = Script::new(scripts::SET)
            .key(self.redis_key(key))
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        let mut conn = self.conn().await?;
        let deleted: i64 = conn.del(self.redis_key(key)).await.map_err(backend)?;
        Ok(deleted > 0)
    }

    async fn delete_if_version(
        &self,
        key: &StateKey,
        expected_version: u64,
    ) -> Result<bool, StateError> {
        let mut conn = self.conn().await?;
        let deleted: i64 = Script::new(scripts::DELETE_IF_VERSION)
            .key(self.redis_key(key))
            .arg(expected_version)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(deleted == 1)
    }

    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
    ) -> Result<CasResult, StateError> {
        let mut conn = self.conn().await?;
        let result: Vec<redis::Value> = Script::new(scripts::COMPARE_AND_SWAP)
            .key(self.redis_key(key))
            .arg(expected_version)
            .arg(new_value)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;

        // Success: [1, new_version]
        // Conflict: [0, current_version, current_value | false]
        let status = match result.first() {
            Some(redis::Value::Int(n)) => *n,
            _ => return Err(backend("unexpected CAS script response")),
        };

        if status == 1 {
            return Ok(CasResult::Ok);
        }

        let current_version = match result.get(1) {
            Some(redis::Value::Int(n)) => u64::try_from(*n).unwrap_or(0),
            _ => 0,
        };
        let current_value = match result.get(2) {
            Some(redis::Value::BulkString(bytes)) => String::from_utf8(bytes.clone()).ok(),
            _ => None,
        };

        Ok(CasResult::Conflict {
            current_value,
            current_version,
        })
    }

    async fn scan_keys(
        &self,
        namespace: &str,
        tenant: &str,
        kind: KeyKind,
        prefix: Option<&str>,
    ) -> Result<Vec<(String, String)>, StateError> {
        let pattern = format!(
            "{}:{}{}*",
            self.prefix,
            StateKey::scan_prefix(namespace, tenant, &kind),
            prefix.unwrap_or_default()
        );
        self.scan_pattern(&pattern).await
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;
    use crate::config::RedisConfig;

    fn test_config() -> RedisConfig {
        RedisConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            prefix: format!("remedy-test-{}", uuid::Uuid::new_v4()),
            ..RedisConfig::default()
        }
    }

    #[tokio::test]
    async fn store_conformance() {
        let config = test_config();
        let store = RedisStateStore::new(&config).expect("pool creation should succeed");
        remedy_state::testing::run_store_conformance_tests(&store)
            .await
            .expect("conformance tests should pass");
    }
}
