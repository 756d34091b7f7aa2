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

pub mod content;
pub mod driver;
pub mod entry;
pub mod facade;
pub mod file_store;
pub mod memory_store;
pub mod redis_store;
pub mod section_index;
pub mod store;


pub use content::{ContentHandler, HandlerPolicy};
pub use driver::{CacheDriver, CacheMetricsSnapshot};
pub use entry::CacheEntry;
pub use facade::{Cache, CacheRegistry, DEFAULT_INSTANCE};
pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;
pub use section_index::{IndexEntry, SectionIndex};
pub use store::BackendStore;
