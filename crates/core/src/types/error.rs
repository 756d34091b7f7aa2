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

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Invalid cache identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Cache not found: {0}")]
    NotFound(String),

    #[error("Cache expired: {0}")]
    Expired(String),

    #[error("Malformed cache entry: {0}")]
    MalformedEntry(String),

    #[error("Cache backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Content handler error: {0}")]
    ContentHandler(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CacheError {
    /// 缓存未命中：不存在、已过期或信封损坏，调用方都应当作“没有缓存”处理
    pub fn is_miss(&self) -> bool {
        matches!(
            self,
            CacheError::NotFound(_) | CacheError::Expired(_) | CacheError::MalformedEntry(_)
        )
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::BackendUnavailable(e.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::BackendUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::ContentHandler(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for CacheError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        CacheError::ContentHandler(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CacheError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        CacheError::ContentHandler(e.to_string())
    }
}

impl From<crate::config::ConfigError> for CacheError {
    fn from(e: crate::config::ConfigError) -> Self {
        CacheError::Configuration(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
