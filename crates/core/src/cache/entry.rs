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

//! Stored cache entry and its envelope format:
//!
//! ```text
//! {{Cache_Properties}}{"created":..,"expiration":..,"dependencies":[..],"content_handler":".."}{{/Cache_Properties}}<raw content>
//! ```

use serde::{Deserialize, Serialize};

use crate::cache::content::ContentHandler;
use crate::types::{CacheError, Identifier, Result, MICROS_PER_SECOND};

pub const TAG_OPEN: &str = "{{Cache_Properties}}";
pub const TAG_CLOSE: &str = "{{/Cache_Properties}}";

#[derive(Debug, Serialize, Deserialize)]
struct EntryProperties {
    created: i64,
    expiration: Option<i64>,
    dependencies: Vec<String>,
    content_handler: ContentHandler,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Epoch microseconds of the write.
    pub created: i64,
    /// Absolute epoch seconds, `None` for entries that never expire.
    pub expiration: Option<i64>,
    pub dependencies: Vec<Identifier>,
    pub content_handler: ContentHandler,
    pub contents: Vec<u8>,
}

impl CacheEntry {
    /// `created` is in epoch microseconds; `ttl_seconds` of `None` or `0`
    /// means no expiration.
    pub fn new(
        created: i64,
        ttl_seconds: Option<u64>,
        dependencies: Vec<Identifier>,
        content_handler: ContentHandler,
        contents: Vec<u8>,
    ) -> Self {
        let expiration = ttl_seconds
            .filter(|ttl| *ttl > 0)
            .map(|ttl| {
                created
                    .div_euclid(MICROS_PER_SECOND)
                    .saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX))
            });

        Self {
            created,
            expiration,
            dependencies,
            content_handler,
            contents,
        }
    }

    pub fn created_secs(&self) -> i64 {
        self.created.div_euclid(MICROS_PER_SECOND)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expiration.is_some_and(|expiration| expiration < now)
    }

    /// Seconds left until expiration, negative once expired.
    pub fn ttl_remaining(&self, now: i64) -> Option<i64> {
        self.expiration.map(|expiration| expiration - now)
    }

    /// TTL to push down to a backend with native expiry. The entry stays
    /// valid through its whole expiration second, so the backend keeps it
    /// until the second after.
    pub fn backend_ttl(&self, now: i64) -> Option<u64> {
        self.ttl_remaining(now)
            .map(|remaining| u64::try_from(remaining.saturating_add(1).max(1)).unwrap_or(1))
    }

    pub fn to_envelope(&self) -> Result<Vec<u8>> {
        let properties = EntryProperties {
            created: self.created,
            expiration: self.expiration,
            dependencies: self
                .dependencies
                .iter()
                .map(|d| d.as_str().to_string())
                .collect(),
            content_handler: self.content_handler,
        };

        let json = serde_json::to_vec(&properties)?;
        let mut out =
            Vec::with_capacity(TAG_OPEN.len() + json.len() + TAG_CLOSE.len() + self.contents.len());
        out.extend_from_slice(TAG_OPEN.as_bytes());
        out.extend_from_slice(&json);
        out.extend_from_slice(TAG_CLOSE.as_bytes());
        out.extend_from_slice(&self.contents);
        Ok(out)
    }

    pub fn from_envelope(bytes: &[u8]) -> Result<Self> {
        let close = find(bytes, TAG_CLOSE.as_bytes()).ok_or_else(|| {
            CacheError::MalformedEntry("properties close tag not found".to_string())
        })?;

        let header = bytes[..close]
            .strip_prefix(TAG_OPEN.as_bytes())
            .ok_or_else(|| {
                CacheError::MalformedEntry("properties open tag not found".to_string())
            })?;
        let contents = bytes[close + TAG_CLOSE.len()..].to_vec();

        let properties: EntryProperties = serde_json::from_slice(header)
            .map_err(|e| CacheError::MalformedEntry(format!("invalid properties: {}", e)))?;

        let dependencies = properties
            .dependencies
            .iter()
            .map(|d| {
                Identifier::new(d.as_str()).map_err(|e| {
                    CacheError::MalformedEntry(format!("invalid dependency '{}': {}", d, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            created: properties.created,
            expiration: properties.expiration,
            dependencies,
            content_handler: properties.content_handler,
            contents,
        })
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
