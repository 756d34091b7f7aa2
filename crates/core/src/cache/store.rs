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

use crate::types::Result;

/// Minimal key-value primitive every storage driver wraps.
///
/// `ttl_seconds` of `None` or `Some(0)` means the backend keeps the value
/// until it is deleted. Backends without native expiry may ignore the TTL;
/// the driver enforces expiration on read regardless.
#[async_trait]
pub trait BackendStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8], ttl_seconds: Option<u64>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Short backend name used in logs.
    fn name(&self) -> &'static str;
}

pub(crate) fn effective_ttl(ttl_seconds: Option<u64>) -> Option<u64> {
    ttl_seconds.filter(|ttl| *ttl > 0)
}
