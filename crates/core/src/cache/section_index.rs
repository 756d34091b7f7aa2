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

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::cache::store::BackendStore;
use crate::types::{CacheError, Result};

/// `(physical key, created micros)` stored as a two-element JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry(pub String, pub i64);

impl IndexEntry {
    pub fn physical_key(&self) -> &str {
        &self.0
    }

    pub fn created(&self) -> i64 {
        self.1
    }
}

pub type SectionMap = BTreeMap<String, IndexEntry>;

/// Per-section directory of leaf identifiers, plus a global directory of
/// sections, all stored as values of the same backend.
///
/// Read-modify-write of index values is not atomic: concurrent writers to the
/// same section can lose each other's updates (last writer wins).
///
/// An unreadable index value is reported as [`CacheError::MalformedEntry`]
/// and left untouched; only [`Self::purge`] drops it.
pub struct SectionIndex<S: BackendStore + ?Sized> {
    store: Arc<S>,
    cache_id: String,
}

impl<S: BackendStore + ?Sized> SectionIndex<S> {
    pub fn new(store: Arc<S>, cache_id: impl Into<String>) -> Self {
        Self {
            store,
            cache_id: cache_id.into(),
        }
    }

    pub fn cache_id(&self) -> &str {
        &self.cache_id
    }

    /// Backend key of the entry stored under `physical_key`.
    pub fn storage_key(&self, physical_key: &str) -> String {
        format!("{}.{}", self.cache_id, physical_key)
    }

    pub fn index_key(&self, section: &str) -> String {
        if section.is_empty() {
            format!("{}._index", self.cache_id)
        } else {
            format!("{}._index.{}", self.cache_id, section)
        }
    }

    pub fn directory_key(&self) -> String {
        format!("{}._directory", self.cache_id)
    }

    pub fn generate_physical_key() -> String {
        Uuid::new_v4().simple().to_string()
    }

    pub async fn read_section(&self, section: &str) -> Result<SectionMap> {
        let key = self.index_key(section);
        match self.store.get(&key).await? {
            None => Ok(SectionMap::new()),
            Some(raw) => parse_index(&key, &raw),
        }
    }

    async fn write_section(&self, section: &str, map: &SectionMap) -> Result<()> {
        let key = self.index_key(section);
        if map.is_empty() {
            return self.store.delete(&key).await;
        }
        let raw = serde_json::to_vec(map)?;
        self.store.set(&key, &raw, None).await
    }

    pub async fn read_directory(&self) -> Result<Vec<String>> {
        let key = self.directory_key();
        match self.store.get(&key).await? {
            None => Ok(Vec::new()),
            Some(raw) => parse_index(&key, &raw),
        }
    }

    async fn write_directory(&self, sections: &[String]) -> Result<()> {
        let key = self.directory_key();
        if sections.is_empty() {
            return self.store.delete(&key).await;
        }
        let raw = serde_json::to_vec(sections)?;
        self.store.set(&key, &raw, None).await
    }

    pub async fn lookup(&self, section: &str, leaf: &str) -> Result<Option<IndexEntry>> {
        Ok(self.read_section(section).await?.remove(leaf))
    }

    /// Mapped physical key for the leaf, or a freshly generated one. The index
    /// is not touched; the mapping is recorded by [`Self::update_index`].
    pub async fn resolve_key(&self, section: &str, leaf: &str) -> Result<String> {
        match self.lookup(section, leaf).await? {
            Some(entry) => Ok(entry.0),
            None => Ok(Self::generate_physical_key()),
        }
    }

    pub async fn remove_key(&self, section: &str, leaf: &str) -> Result<()> {
        let mut map = self.read_section(section).await?;
        if map.remove(leaf).is_none() {
            return Ok(());
        }

        self.write_section(section, &map).await?;
        if map.is_empty() {
            let mut directory = self.read_directory().await?;
            let before = directory.len();
            directory.retain(|s| s != section);
            if directory.len() != before {
                self.write_directory(&directory).await?;
            }
        }

        debug!("Removed '{}' from section index '{}'", leaf, section);
        Ok(())
    }

    pub async fn update_index(
        &self,
        section: &str,
        leaf: &str,
        physical_key: &str,
        created: i64,
    ) -> Result<()> {
        let mut map = self.read_section(section).await?;
        map.insert(
            leaf.to_string(),
            IndexEntry(physical_key.to_string(), created),
        );
        self.write_section(section, &map).await?;

        let mut directory = self.read_directory().await?;
        if !directory.iter().any(|s| s == section) {
            directory.push(section.to_string());
            self.write_directory(&directory).await?;
        }

        debug!(
            "Section index '{}' maps '{}' -> {}",
            section, leaf, physical_key
        );
        Ok(())
    }

    /// Deletes every entry of the matching sections: `Some(section)` matches
    /// the section itself and every `section.*` below it, `None` matches all.
    /// Returns the number of entries deleted.
    pub async fn purge(&self, section: Option<&str>) -> Result<usize> {
        let directory = match self.read_directory().await {
            Ok(directory) => directory,
            Err(CacheError::MalformedEntry(reason)) if section.is_none() => {
                error!(
                    "Dropping unreadable directory {}, every indexed entry is orphaned: {}",
                    self.directory_key(),
                    reason
                );
                self.store.delete(&self.directory_key()).await?;
                return Ok(0);
            }
            Err(e) => return Err(e),
        };
        let (purged, kept): (Vec<String>, Vec<String>) = directory
            .into_iter()
            .partition(|candidate| section.map_or(true, |s| section_matches(candidate, s)));

        let mut removed = 0;
        for path in &purged {
            match self.read_section(path).await {
                Ok(map) => {
                    for entry in map.values() {
                        self.store.delete(&self.storage_key(entry.physical_key())).await?;
                        removed += 1;
                    }
                }
                Err(CacheError::MalformedEntry(reason)) => {
                    error!(
                        "Dropping unreadable section index {}, its entries are orphaned: {}",
                        self.index_key(path),
                        reason
                    );
                }
                Err(e) => return Err(e),
            }
            self.store.delete(&self.index_key(path)).await?;
        }

        if !purged.is_empty() {
            self.write_directory(&kept).await?;
        }

        debug!(
            "Purged {} sections ({} entries) matching {:?}",
            purged.len(),
            removed,
            section
        );
        Ok(removed)
    }
}

fn parse_index<T: serde::de::DeserializeOwned>(key: &str, raw: &[u8]) -> Result<T> {
    serde_json::from_slice(raw).map_err(|e| {
        error!("Unreadable index value {}: {}", key, e);
        CacheError::MalformedEntry(format!("index {}: {}", key, e))
    })
}

pub(crate) fn section_matches(candidate: &str, section: &str) -> bool {
    candidate == section
        || candidate
            .strip_prefix(section)
            .is_some_and(|rest| rest.starts_with('.'))
}
