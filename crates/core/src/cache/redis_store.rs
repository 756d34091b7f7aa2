// Copyright © 2026 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::cache::store::{effective_ttl, BackendStore};
use crate::config::RedisStoreConfig;
use crate::types::{CacheError, Result};

const MAX_IDLE: Duration = Duration::from_secs(300);

/// Redis 连接池条目
struct PooledConnection {
    connection: MultiplexedConnection,
    last_used: Instant,
}

impl PooledConnection {
    fn new(connection: MultiplexedConnection) -> Self {
        Self {
            connection,
            last_used: Instant::now(),
        }
    }

    fn is_stale(&self, max_idle: Duration) -> bool {
        self.last_used.elapsed() > max_idle
    }
}

/// Redis 连接池
///
/// Every new connection goes through the AUTH / SELECT handshake before it is
/// handed out, so pooled connections are always bound to the configured
/// database.
struct ConnectionPool {
    url: String,
    password: Option<String>,
    database: i64,
    idle: tokio::sync::Mutex<Vec<PooledConnection>>,
    max_idle_connections: usize,
}

impl ConnectionPool {
    fn new(config: &RedisStoreConfig) -> Self {
        Self {
            url: connection_url(&config.host, config.port),
            password: config.password.clone().filter(|p| !p.is_empty()),
            database: config.database,
            idle: tokio::sync::Mutex::new(Vec::new()),
            max_idle_connections: config.pool_size as usize,
        }
    }

    async fn get(&self) -> Result<MultiplexedConnection> {
        {
            let mut idle = self.idle.lock().await;
            idle.retain(|c| !c.is_stale(MAX_IDLE));
            if let Some(pooled) = idle.pop() {
                return Ok(pooled.connection);
            }
        }

        self.connect().await
    }

    async fn connect(&self) -> Result<MultiplexedConnection> {
        let client = redis::Client::open(self.url.as_str()).map_err(|e| {
            CacheError::BackendUnavailable(format!("Failed to create Redis client: {}", e))
        })?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                CacheError::BackendUnavailable(format!("Failed to connect to Redis: {}", e))
            })?;

        if let Some(ref password) = self.password {
            let _: () = redis::cmd("AUTH")
                .arg(password)
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::BackendUnavailable(format!("Redis AUTH failed: {}", e)))?;
        }

        if self.database != 0 {
            let _: () = redis::cmd("SELECT")
                .arg(self.database)
                .query_async(&mut conn)
                .await
                .map_err(|e| {
                    CacheError::BackendUnavailable(format!("Redis SELECT failed: {}", e))
                })?;
        }

        Ok(conn)
    }

    async fn return_(&self, connection: MultiplexedConnection) {
        let mut idle = self.idle.lock().await;
        if idle.len() < self.max_idle_connections {
            idle.push(PooledConnection::new(connection));
        }
    }
}

pub(crate) fn connection_url(host: &str, port: u16) -> String {
    format!("redis://{}:{}/", host, port)
}

/// Redis 缓存后端
#[derive(Clone)]
pub struct RedisStore {
    pool: Arc<ConnectionPool>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("url", &self.pool.url)
            .field("database", &self.pool.database)
            .finish()
    }
}

impl RedisStore {
    /// 创建 Redis 缓存后端并用 PING 验证连接
    pub async fn new(config: &RedisStoreConfig) -> Result<Self> {
        let pool = Arc::new(ConnectionPool::new(config));

        let mut conn = pool.get().await?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendUnavailable(format!("Redis PING failed: {}", e)))?;

        if pong != "PONG" {
            return Err(CacheError::BackendUnavailable(format!(
                "Unexpected PING response: {}",
                pong
            )));
        }
        pool.return_(conn).await;

        debug!(
            "RedisStore connected to {} (database {}), pool_size={}",
            pool.url, pool.database, config.pool_size
        );

        Ok(Self { pool })
    }

    /// 清理过期的连接
    pub async fn cleanup(&self, max_idle: Duration) {
        let mut idle = self.pool.idle.lock().await;
        idle.retain(|c| !c.is_stale(max_idle));
    }
}

#[async_trait]
impl BackendStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.pool.get().await?;
        let result: redis::RedisResult<Option<Vec<u8>>> = conn.get(key).await;

        match result {
            Ok(data) => {
                self.pool.return_(conn).await;
                debug!("Redis get for key {}: hit={}", key, data.is_some());
                Ok(data)
            }
            Err(e) => {
                error!("Redis get error for key {}: {}", key, e);
                Err(CacheError::BackendUnavailable(format!(
                    "Redis get failed: {}",
                    e
                )))
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl_seconds: Option<u64>) -> Result<()> {
        let mut conn = self.pool.get().await?;

        let mut pipe = redis::pipe();
        pipe.atomic().set(key, value).ignore();
        if let Some(ttl) = effective_ttl(ttl_seconds) {
            let expire_at = chrono::Utc::now().timestamp() + ttl as i64;
            pipe.cmd("EXPIREAT").arg(key).arg(expire_at).ignore();
        }
        let result: redis::RedisResult<()> = pipe.query_async(&mut conn).await;

        match result {
            Ok(()) => {
                self.pool.return_(conn).await;
                debug!("Redis set for key {} ({} bytes)", key, value.len());
                Ok(())
            }
            Err(e) => {
                error!("Redis set error for key {}: {}", key, e);
                Err(CacheError::BackendUnavailable(format!(
                    "Redis set failed: {}",
                    e
                )))
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let result: redis::RedisResult<usize> = conn.del(key).await;

        match result {
            Ok(_) => {
                self.pool.return_(conn).await;
                debug!("Redis delete for key: {}", key);
                Ok(())
            }
            Err(e) => {
                error!("Redis delete error for key {}: {}", key, e);
                Err(CacheError::BackendUnavailable(format!(
                    "Redis delete failed: {}",
                    e
                )))
            }
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
