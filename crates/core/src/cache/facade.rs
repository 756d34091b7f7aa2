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

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::cache::driver::{CacheDriver, CacheMetricsSnapshot};
use crate::cache::file_store::FileStore;
use crate::cache::memory_store::MemoryStore;
use crate::cache::redis_store::RedisStore;
use crate::cache::store::BackendStore;
use crate::config::{CacheConfig, Config, DriverKind};
use crate::types::{CacheError, Clock, Identifier, Result};

pub const DEFAULT_INSTANCE: &str = "default";

/// Configured cache: a driver plus the instance's default TTL and
/// dependencies.
pub struct Cache {
    driver: CacheDriver,
    expiration: Option<u64>,
    dependencies: Vec<Identifier>,
}

impl Cache {
    /// Builds the store selected by `config.driver`. A redis store checks
    /// connectivity here.
    pub async fn from_config(config: &CacheConfig) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn BackendStore> = match config.driver {
            DriverKind::File => Arc::new(FileStore::from_config(&config.file)?),
            DriverKind::Memory => Arc::new(MemoryStore::new()),
            DriverKind::Redis => Arc::new(RedisStore::new(&config.redis).await?),
        };

        info!(
            "Cache '{}' ready on {} store",
            config.cache_id(),
            store.name()
        );

        let driver = CacheDriver::new(store, config.cache_id()).with_policy(config.handler_policy());
        Ok(Self {
            driver,
            expiration: config.expiration,
            dependencies: config.default_dependencies()?,
        })
    }

    pub fn from_driver(driver: CacheDriver) -> Self {
        Self {
            driver,
            expiration: None,
            dependencies: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.driver = self.driver.with_clock(clock);
        self
    }

    pub fn with_defaults(mut self, expiration: Option<u64>, dependencies: Vec<Identifier>) -> Self {
        self.expiration = expiration;
        self.dependencies = dependencies;
        self
    }

    pub fn driver(&self) -> &CacheDriver {
        &self.driver
    }

    pub fn default_expiration(&self) -> Option<u64> {
        self.expiration
    }

    /// Stores with the instance's default TTL and dependencies.
    pub async fn set<I, T>(&self, identifier: &I, contents: &T) -> Result<()>
    where
        I: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        self.driver
            .set(identifier, contents, self.expiration, &self.dependencies)
            .await
    }

    /// Stores with an explicit TTL and dependencies, which replace the
    /// defaults.
    pub async fn set_with<I, T, D>(
        &self,
        identifier: &I,
        contents: &T,
        ttl_seconds: Option<u64>,
        dependencies: &[D],
    ) -> Result<()>
    where
        I: Serialize + ?Sized,
        T: Serialize + ?Sized,
        D: Serialize,
    {
        let dependencies = Identifier::many(dependencies)?;
        self.driver
            .set(identifier, contents, ttl_seconds, &dependencies)
            .await
    }

    pub async fn get<I, T>(&self, identifier: &I) -> Result<T>
    where
        I: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.driver.get(identifier, true).await
    }

    /// Reads without expiration or dependency checks.
    pub async fn get_unchecked<I, T>(&self, identifier: &I) -> Result<T>
    where
        I: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.driver.get(identifier, false).await
    }

    /// `Ok(None)` for any kind of miss.
    pub async fn try_get<I, T>(&self, identifier: &I) -> Result<Option<T>>
    where
        I: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        match self.driver.get(identifier, true).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_miss() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn delete<I>(&self, identifier: &I) -> Result<()>
    where
        I: Serialize + ?Sized,
    {
        self.driver.delete(identifier).await
    }

    pub async fn delete_all(&self, section: Option<&str>) -> Result<bool> {
        self.driver.delete_all(section).await
    }

    pub async fn call<I, T, F, Fut>(&self, identifier: &I, producer: F) -> Result<T>
    where
        I: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.driver
            .call(identifier, producer, self.expiration, &self.dependencies)
            .await
    }

    pub async fn call_with<I, T, D, F, Fut>(
        &self,
        identifier: &I,
        producer: F,
        ttl_seconds: Option<u64>,
        dependencies: &[D],
    ) -> Result<T>
    where
        I: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        D: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let dependencies = Identifier::many(dependencies)?;
        self.driver
            .call(identifier, producer, ttl_seconds, &dependencies)
            .await
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.driver.metrics()
    }
}

/// Named cache instances built once and shared.
#[derive(Default)]
pub struct CacheRegistry {
    instances: DashMap<String, Arc<Cache>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the default instance and every named instance of `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let registry = Self::new();
        registry.register(DEFAULT_INSTANCE, &config.cache).await?;
        for (name, instance) in &config.instances {
            registry.register(name, instance).await?;
        }
        Ok(registry)
    }

    /// Builds and stores an instance, replacing any previous one of that name.
    pub async fn register(&self, name: &str, config: &CacheConfig) -> Result<Arc<Cache>> {
        let cache = Arc::new(Cache::from_config(config).await?);
        self.insert(name, cache.clone());
        Ok(cache)
    }

    pub fn insert(&self, name: &str, cache: Arc<Cache>) {
        self.instances.insert(name.to_string(), cache);
    }

    pub fn instance(&self, name: &str) -> Result<Arc<Cache>> {
        self.instances
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                CacheError::Configuration(format!("No cache instance named '{}'", name))
            })
    }

    pub fn default_instance(&self) -> Result<Arc<Cache>> {
        self.instance(DEFAULT_INSTANCE)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instances.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
