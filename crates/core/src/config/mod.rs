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
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::cache::content::{ContentHandler, HandlerPolicy};
use crate::types::Identifier;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {}", _0)]
    MissingRequired(String),

    #[error("Invalid configuration value: {}", _0)]
    InvalidValue(String),

    #[error("Configuration file error: {}", _0)]
    FileError(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// 缓存存储驱动类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    #[default]
    File,
    Memory,
    Redis,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::File => write!(f, "file"),
            DriverKind::Memory => write!(f, "memory"),
            DriverKind::Redis => write!(f, "redis"),
        }
    }
}

impl FromStr for DriverKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(DriverKind::File),
            "memory" => Ok(DriverKind::Memory),
            "redis" => Ok(DriverKind::Redis),
            _ => Err(ConfigError::InvalidValue(format!("Unknown cache driver: {}", s))),
        }
    }
}

const DEFAULT_CACHE_ID: &str = "cache";

fn default_cache_id() -> String {
    DEFAULT_CACHE_ID.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FileStoreConfig {
    pub cache_id: String,
    pub path: PathBuf,
    pub lock_timeout_ms: u64,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            cache_id: default_cache_id(),
            path: std::env::temp_dir().join("strata-cache"),
            lock_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MemoryStoreConfig {
    pub cache_id: String,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            cache_id: default_cache_id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisStoreConfig {
    pub cache_id: String,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: i64,
    pub pool_size: u32,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            cache_id: default_cache_id(),
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            database: 0,
            pool_size: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            include_location: true,
        }
    }
}

/// Settings of one cache instance.
///
/// Handler names are parsed into [`ContentHandler`] while deserializing, so
/// an unknown name fails when the configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CacheConfig {
    pub driver: DriverKind,
    /// Default TTL in seconds, `None` for entries that never expire.
    pub expiration: Option<u64>,
    pub dependencies: Vec<String>,
    pub content_handler: Option<ContentHandler>,
    /// Type name -> handler overrides.
    pub content_handlers: HashMap<String, ContentHandler>,
    pub file: FileStoreConfig,
    pub memory: MemoryStoreConfig,
    pub redis: RedisStoreConfig,
}

impl CacheConfig {
    /// Key namespace of the selected driver.
    pub fn cache_id(&self) -> &str {
        match self.driver {
            DriverKind::File => &self.file.cache_id,
            DriverKind::Memory => &self.memory.cache_id,
            DriverKind::Redis => &self.redis.cache_id,
        }
    }

    pub fn handler_policy(&self) -> HandlerPolicy {
        HandlerPolicy::new(self.content_handler, self.content_handlers.clone())
    }

    pub fn default_dependencies(&self) -> ConfigResult<Vec<Identifier>> {
        Identifier::many(&self.dependencies)
            .map_err(|e| ConfigError::InvalidValue(format!("dependencies: {}", e)))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let cache_id = self.cache_id();
        if cache_id.is_empty() {
            return Err(ConfigError::MissingRequired(format!(
                "{}.cache_id",
                self.driver
            )));
        }
        if !cache_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        {
            return Err(ConfigError::InvalidValue(format!(
                "{}.cache_id '{}' may only contain [A-Za-z0-9_-]",
                self.driver, cache_id
            )));
        }

        match self.driver {
            DriverKind::File if self.file.lock_timeout_ms == 0 => {
                return Err(ConfigError::InvalidValue(
                    "file.lock_timeout_ms must be positive".to_string(),
                ));
            }
            DriverKind::Redis if self.redis.pool_size == 0 => {
                return Err(ConfigError::InvalidValue(
                    "redis.pool_size must be positive".to_string(),
                ));
            }
            DriverKind::Redis if self.redis.host.is_empty() => {
                return Err(ConfigError::MissingRequired("redis.host".to_string()));
            }
            _ => {}
        }

        self.default_dependencies()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    /// The "default" cache instance.
    pub cache: CacheConfig,
    /// Additional named instances.
    pub instances: HashMap<String, CacheConfig>,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load_from_file(path: &str) -> ConfigResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileError(e.to_string()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidValue(e.to_string()))
    }

    pub fn load_from_env() -> ConfigResult<Self> {
        let mut config = Config::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// File settings first (when the file exists), then environment overrides.
    pub fn load(path: &str) -> ConfigResult<Self> {
        let mut config = match Self::load_from_file(path) {
            Ok(config) => config,
            Err(ConfigError::FileError(_)) => Config::default(),
            Err(e) => return Err(e),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies `CACHE_*` overrides to the default instance.
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cache = &mut self.cache;

        if let Some(driver) = lookup("CACHE_DRIVER") {
            cache.driver = driver.parse()?;
        }
        if let Some(expiration) = lookup("CACHE_EXPIRATION") {
            let seconds: u64 = expiration
                .parse()
                .map_err(|_| ConfigError::InvalidValue("CACHE_EXPIRATION".to_string()))?;
            cache.expiration = (seconds > 0).then_some(seconds);
        }
        if let Some(handler) = lookup("CACHE_CONTENT_HANDLER") {
            cache.content_handler = Some(
                handler
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("CACHE_CONTENT_HANDLER".to_string()))?,
            );
        }
        if let Some(path) = lookup("CACHE_FILE_PATH") {
            cache.file.path = PathBuf::from(path);
        }
        if let Some(host) = lookup("CACHE_REDIS_HOST") {
            cache.redis.host = host;
        }
        if let Some(port) = lookup("CACHE_REDIS_PORT") {
            cache.redis.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidValue("CACHE_REDIS_PORT".to_string()))?;
        }
        if let Some(password) = lookup("CACHE_REDIS_PASSWORD") {
            cache.redis.password = Some(password);
        }
        if let Some(database) = lookup("CACHE_REDIS_DATABASE") {
            cache.redis.database = database
                .parse()
                .map_err(|_| ConfigError::InvalidValue("CACHE_REDIS_DATABASE".to_string()))?;
        }

        if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }

        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.cache.validate()?;
        for (name, instance) in &self.instances {
            instance
                .validate()
                .map_err(|e| ConfigError::InvalidValue(format!("instances.{}: {}", name, e)))?;
        }
        Ok(())
    }
}
