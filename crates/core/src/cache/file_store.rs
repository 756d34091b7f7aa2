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
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::cache::store::BackendStore;
use crate::config::FileStoreConfig;
use crate::types::{CacheError, Result};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);
const FILE_EXTENSION: &str = "cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// 文件缓存后端，每个物理键对应一个文件
///
/// File contents are exactly the bytes handed to `set`. TTLs are not stored;
/// expiration is enforced by the driver on read.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
    lock_timeout: Duration,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| {
            CacheError::BackendUnavailable(format!(
                "Failed to create cache directory {}: {}",
                base_dir.display(),
                e
            ))
        })?;

        debug!("FileStore using directory {}", base_dir.display());
        Ok(Self {
            base_dir,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    pub fn from_config(config: &FileStoreConfig) -> Result<Self> {
        Ok(Self::new(&config.path)?.with_lock_timeout(Duration::from_millis(config.lock_timeout_ms)))
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if !valid {
            return Err(CacheError::BackendUnavailable(format!(
                "Key '{}' cannot be mapped to a cache file",
                key
            )));
        }
        Ok(self.base_dir.join(format!("{}.{}", key, FILE_EXTENSION)))
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(op)
            .await
            .map_err(|e| CacheError::BackendUnavailable(format!("File task failed: {}", e)))?
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn acquire_lock(file: &File, mode: LockMode, path: &Path, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let attempt = match mode {
            LockMode::Shared => FileExt::try_lock_shared(file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(file),
        };

        match attempt {
            Ok(()) => return Ok(()),
            Err(e) if is_contended(&e) => {
                if Instant::now() >= deadline {
                    warn!("Lock wait on {} exceeded {:?}", path.display(), timeout);
                    return Err(CacheError::BackendUnavailable(format!(
                        "Timed out after {:?} waiting for lock on {}",
                        timeout,
                        path.display()
                    )));
                }
                std::thread::sleep(LOCK_POLL_INTERVAL);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn read_locked(path: &Path, timeout: Duration) -> Result<Option<Vec<u8>>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    acquire_lock(&file, LockMode::Shared, path, timeout)?;
    let mut data = Vec::new();
    let result = file.read_to_end(&mut data);
    let _ = FileExt::unlock(&file);
    result?;

    Ok(Some(data))
}

fn write_locked(path: &Path, value: &[u8], timeout: Duration) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    acquire_lock(&file, LockMode::Exclusive, path, timeout)?;
    let result = file
        .set_len(0)
        .and_then(|_| file.write_all(value))
        .and_then(|_| file.flush());
    let _ = FileExt::unlock(&file);
    result?;

    Ok(())
}

fn delete_locked(path: &Path, timeout: Duration) -> Result<()> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    acquire_lock(&file, LockMode::Exclusive, path, timeout)?;
    let result = match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    };
    let _ = FileExt::unlock(&file);
    result?;

    Ok(())
}

#[async_trait]
impl BackendStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        let timeout = self.lock_timeout;
        let result = self.run_blocking(move || read_locked(&path, timeout)).await;
        if let Err(ref e) = result {
            error!("File store read error for key {}: {}", key, e);
        }
        result
    }

    async fn set(&self, key: &str, value: &[u8], _ttl_seconds: Option<u64>) -> Result<()> {
        let path = self.path_for(key)?;
        let timeout = self.lock_timeout;
        let value = value.to_vec();
        let result = self
            .run_blocking(move || write_locked(&path, &value, timeout))
            .await;
        if let Err(ref e) = result {
            error!("File store write error for key {}: {}", key, e);
        }
        result
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let timeout = self.lock_timeout;
        self.run_blocking(move || delete_locked(&path, timeout)).await
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
