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

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::content::{ContentHandler, HandlerPolicy};
use crate::cache::entry::CacheEntry;
use crate::cache::section_index::SectionIndex;
use crate::cache::store::BackendStore;
use crate::types::{validate_section, CacheError, Clock, Identifier, Result, SystemClock};

/// Orchestrates reads and writes of cache entries over one backend.
///
/// Entry lifecycle per identifier: absent -> valid -> expired -> absent.
/// Expired entries are deleted lazily by the read that notices them.
///
/// No locking is done: concurrent `set` calls in one section race on the
/// section index, and concurrent `call` misses each run the producer.
pub struct CacheDriver<S: BackendStore + ?Sized = dyn BackendStore> {
    store: Arc<S>,
    index: SectionIndex<S>,
    clock: Arc<dyn Clock>,
    policy: HandlerPolicy,
    metrics: CacheMetrics,
}

impl<S: BackendStore + ?Sized> CacheDriver<S> {
    pub fn new(store: Arc<S>, cache_id: impl Into<String>) -> Self {
        let index = SectionIndex::new(store.clone(), cache_id);
        Self {
            store,
            index,
            clock: Arc::new(SystemClock),
            policy: HandlerPolicy::default(),
            metrics: CacheMetrics::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: HandlerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn index(&self) -> &SectionIndex<S> {
        &self.index
    }

    pub fn cache_id(&self) -> &str {
        self.index.cache_id()
    }

    /// Writes `contents` with the handler picked by the driver's policy.
    pub async fn set<I, T>(
        &self,
        identifier: &I,
        contents: &T,
        ttl_seconds: Option<u64>,
        dependencies: &[Identifier],
    ) -> Result<()>
    where
        I: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        let handler = self.policy.select::<T>();
        self.set_with_handler(identifier, contents, ttl_seconds, dependencies, handler)
            .await
    }

    pub async fn set_with_handler<I, T>(
        &self,
        identifier: &I,
        contents: &T,
        ttl_seconds: Option<u64>,
        dependencies: &[Identifier],
        handler: ContentHandler,
    ) -> Result<()>
    where
        I: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        let id = Identifier::new(identifier)?;
        let encoded = handler.encode(contents)?;
        let entry = CacheEntry::new(
            self.clock.now_micros(),
            ttl_seconds,
            dependencies.to_vec(),
            handler,
            encoded,
        );
        self.write_entry(&id, &entry).await
    }

    async fn write_entry(&self, id: &Identifier, entry: &CacheEntry) -> Result<()> {
        let physical_key = self.index.resolve_key(id.section(), id.leaf()).await?;
        let envelope = entry.to_envelope()?;

        self.store
            .set(
                &self.index.storage_key(&physical_key),
                &envelope,
                entry.backend_ttl(entry.created_secs()),
            )
            .await?;
        // Only after the backend write, so the index never points at nothing.
        self.index
            .update_index(id.section(), id.leaf(), &physical_key, entry.created)
            .await?;

        self.metrics.writes.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Cached '{}' via {} ({} bytes, handler={})",
            id,
            self.store.name(),
            envelope.len(),
            entry.content_handler
        );
        Ok(())
    }

    /// Reads and decodes an entry. With `use_expiration`, an entry past its
    /// expiration, older than one of its dependencies, or depending on an
    /// entry that is missing or expired is deleted and reported as
    /// [`CacheError::Expired`].
    pub async fn get<I, T>(&self, identifier: &I, use_expiration: bool) -> Result<T>
    where
        I: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let id = Identifier::new(identifier)?;
        self.metrics.requests.fetch_add(1, Ordering::Relaxed);

        let result = self.read_valid(&id, use_expiration).await;
        match result {
            Ok(entry) => {
                let value = entry.content_handler.decode(&entry.contents)?;
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for '{}'", id);
                Ok(value)
            }
            Err(e) => {
                if e.is_miss() {
                    self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                }
                Err(e)
            }
        }
    }

    /// Parsed entry metadata and raw contents, without expiration or
    /// dependency checks.
    pub async fn entry<I>(&self, identifier: &I) -> Result<CacheEntry>
    where
        I: Serialize + ?Sized,
    {
        let id = Identifier::new(identifier)?;
        self.read_entry(&id).await
    }

    async fn read_entry(&self, id: &Identifier) -> Result<CacheEntry> {
        let indexed = self
            .index
            .lookup(id.section(), id.leaf())
            .await?
            .ok_or_else(|| CacheError::NotFound(id.to_string()))?;

        let raw = self
            .store
            .get(&self.index.storage_key(indexed.physical_key()))
            .await?;
        let Some(raw) = raw else {
            // Expired natively or removed behind the index's back.
            debug!("Index entry for '{}' has no stored value, unindexing", id);
            self.index.remove_key(id.section(), id.leaf()).await?;
            return Err(CacheError::NotFound(id.to_string()));
        };

        CacheEntry::from_envelope(&raw).map_err(|e| {
            warn!("Malformed cache entry for '{}': {}", id, e);
            match e {
                CacheError::MalformedEntry(reason) => {
                    CacheError::MalformedEntry(format!("{}: {}", id, reason))
                }
                other => other,
            }
        })
    }

    async fn read_valid(&self, id: &Identifier, use_expiration: bool) -> Result<CacheEntry> {
        let entry = self.read_entry(id).await?;
        if !use_expiration {
            return Ok(entry);
        }

        let now = self.clock.now();
        if entry.is_expired(now) {
            return Err(self
                .invalidate(id, format!("{} expired at {}", id, entry.expiration.unwrap_or(now)))
                .await);
        }

        for dependency in &entry.dependencies {
            let reason = match self.read_entry(dependency).await {
                Ok(dep) if dep.is_expired(now) => {
                    Some(format!("{} depends on expired '{}'", id, dependency))
                }
                Ok(dep) if dep.created > entry.created => Some(format!(
                    "{} is older than its dependency '{}'",
                    id, dependency
                )),
                Ok(_) => None,
                Err(e) if e.is_miss() => Some(format!(
                    "{} depends on missing '{}' ({})",
                    id, dependency, e
                )),
                Err(e) => return Err(e),
            };
            if let Some(reason) = reason {
                return Err(self.invalidate(id, reason).await);
            }
        }

        Ok(entry)
    }

    /// Deletes an entry that failed validation and builds the error to report.
    async fn invalidate(&self, id: &Identifier, reason: String) -> CacheError {
        self.metrics.expirations.fetch_add(1, Ordering::Relaxed);
        warn!("Invalidating cache entry: {}", reason);
        match self.delete_id(id).await {
            Ok(()) => CacheError::Expired(reason),
            Err(e) => e,
        }
    }

    pub async fn delete<I>(&self, identifier: &I) -> Result<()>
    where
        I: Serialize + ?Sized,
    {
        let id = Identifier::new(identifier)?;
        self.delete_id(&id).await
    }

    async fn delete_id(&self, id: &Identifier) -> Result<()> {
        let Some(indexed) = self.index.lookup(id.section(), id.leaf()).await? else {
            return Ok(());
        };

        self.store
            .delete(&self.index.storage_key(indexed.physical_key()))
            .await?;
        self.index.remove_key(id.section(), id.leaf()).await?;

        self.metrics.deletes.fetch_add(1, Ordering::Relaxed);
        debug!("Deleted cache entry '{}'", id);
        Ok(())
    }

    /// Purges one section and everything below it, or the whole cache for
    /// `None`.
    pub async fn delete_all(&self, section: Option<&str>) -> Result<bool> {
        if let Some(section) = section {
            validate_section(section)?;
        }

        let removed = self.index.purge(section).await?;
        self.metrics.purges.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Purged {} entries from section {:?} of cache '{}'",
            removed,
            section,
            self.cache_id()
        );
        Ok(true)
    }

    /// Read-through: returns the cached value, or runs `producer`, stores its
    /// result and returns it. Not-found, expired and malformed entries all
    /// count as a miss.
    pub async fn call<I, T, F, Fut>(
        &self,
        identifier: &I,
        producer: F,
        ttl_seconds: Option<u64>,
        dependencies: &[Identifier],
    ) -> Result<T>
    where
        I: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.try_call(
            identifier,
            move || async move { Ok::<T, CacheError>(producer().await) },
            ttl_seconds,
            dependencies,
        )
        .await
    }

    /// [`Self::call`] for producers that can fail. A failed producer stores
    /// nothing.
    pub async fn try_call<I, T, E, F, Fut>(
        &self,
        identifier: &I,
        producer: F,
        ttl_seconds: Option<u64>,
        dependencies: &[Identifier],
    ) -> std::result::Result<T, E>
    where
        I: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        match self.get::<I, T>(identifier, true).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_miss() => debug!("Cache miss, producing value: {}", e),
            Err(e) => return Err(e.into()),
        }

        let value = producer().await?;
        self.set(identifier, &value, ttl_seconds, dependencies)
            .await?;
        Ok(value)
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[derive(Debug, Default)]
pub struct CacheMetrics {
    requests: AtomicUsize,
    hits: AtomicUsize,
    misses: AtomicUsize,
    expirations: AtomicUsize,
    writes: AtomicUsize,
    deletes: AtomicUsize,
    purges: AtomicUsize,
}

impl CacheMetrics {
    fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            purges: self.purges.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub requests: usize,
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub writes: usize,
    pub deletes: usize,
    pub purges: usize,
}

impl CacheMetricsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
