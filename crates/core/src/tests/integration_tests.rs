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

//! End-to-end scenarios over the memory and file stores

use crate::cache::{BackendStore, Cache, CacheDriver, ContentHandler, FileStore, MemoryStore};
use crate::config::{CacheConfig, DriverKind};
use crate::types::{CacheError, Identifier, ManualClock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn memory_driver(clock: &Arc<ManualClock>) -> (MemoryStore, CacheDriver<MemoryStore>) {
    let store = MemoryStore::new();
    let driver = CacheDriver::new(Arc::new(store.clone()), "cache").with_clock(clock.clone());
    (store, driver)
}

#[tokio::test]
async fn test_entry_expires_and_is_removed() {
    let clock = Arc::new(ManualClock::new(1_000));
    let (_store, driver) = memory_driver(&clock);

    driver.set("session.abc", "token", Some(10), &[]).await.unwrap();

    clock.set(1_010);
    let value: String = driver.get("session.abc", true).await.unwrap();
    assert_eq!(value, "token");

    clock.set(1_011);
    assert!(matches!(
        driver.get::<_, String>("session.abc", true).await,
        Err(CacheError::Expired(_))
    ));
    // The expired read deleted the entry.
    assert!(matches!(
        driver.get::<_, String>("session.abc", false).await,
        Err(CacheError::NotFound(_))
    ));
    assert!(driver.index().read_directory().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unchecked_read_ignores_expiration() {
    let clock = Arc::new(ManualClock::new(1_000));
    let (_store, driver) = memory_driver(&clock);

    driver.set("stale", &7u64, Some(1), &[]).await.unwrap();
    clock.advance(100);

    assert_eq!(driver.get::<_, u64>("stale", false).await.unwrap(), 7);
    assert!(driver.get::<_, u64>("stale", true).await.is_err());
}

#[tokio::test]
async fn test_dependency_cascade() {
    let clock = Arc::new(ManualClock::new(100));
    let (_store, driver) = memory_driver(&clock);
    let base = Identifier::new("config.global").unwrap();

    driver.set("config.global", "v1", None, &[]).await.unwrap();
    clock.advance(1);
    driver
        .set("page.home", "<html>v1</html>", None, &[base.clone()])
        .await
        .unwrap();
    assert_eq!(
        driver.get::<_, String>("page.home", true).await.unwrap(),
        "<html>v1</html>"
    );

    // Rewriting the dependency makes the dependent entry stale.
    clock.advance(1);
    driver.set("config.global", "v2", None, &[]).await.unwrap();
    assert!(matches!(
        driver.get::<_, String>("page.home", true).await,
        Err(CacheError::Expired(_))
    ));
    assert!(matches!(
        driver.get::<_, String>("page.home", true).await,
        Err(CacheError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_dependency_cascade_on_wall_clock() {
    let driver = CacheDriver::new(Arc::new(MemoryStore::new()), "cache");
    let base = Identifier::new("base").unwrap();

    driver.set("base", "v1", None, &[]).await.unwrap();
    driver.set("dep", "v2", None, &[base]).await.unwrap();
    assert_eq!(driver.get::<_, String>("dep", true).await.unwrap(), "v2");

    driver.set("base", "v1", None, &[]).await.unwrap();
    assert!(matches!(
        driver.get::<_, String>("dep", true).await,
        Err(CacheError::Expired(_))
    ));
}

#[tokio::test]
async fn test_native_expiry_of_a_read_entry() {
    let store = MemoryStore::new();
    let driver = CacheDriver::new(Arc::new(store.clone()), "cache");

    driver.set("session.live", "token", Some(1), &[]).await.unwrap();
    assert_eq!(
        driver.get::<_, String>("session.live", true).await.unwrap(),
        "token"
    );

    tokio::time::sleep(Duration::from_millis(2_200)).await;
    let result = driver.get::<_, String>("session.live", true).await;
    assert!(result.unwrap_err().is_miss());

    // Nothing is left behind in the index.
    assert!(driver.index().read_section("session").await.unwrap().is_empty());
    assert!(driver.index().read_directory().await.unwrap().is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_native_expiry_of_a_dependency() {
    let store = MemoryStore::new();
    let driver = CacheDriver::new(Arc::new(store.clone()), "cache");
    let base = Identifier::new("base").unwrap();

    driver.set("base", "v", Some(1), &[]).await.unwrap();
    driver.set("derived", "d", None, &[base]).await.unwrap();
    assert_eq!(driver.get::<_, String>("derived", true).await.unwrap(), "d");

    tokio::time::sleep(Duration::from_millis(2_200)).await;
    assert!(matches!(
        driver.get::<_, String>("derived", true).await,
        Err(CacheError::Expired(_))
    ));
    assert!(matches!(
        driver.get::<_, String>("base", true).await,
        Err(CacheError::NotFound(_))
    ));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_native_expiry_with_frozen_driver_clock() {
    // The backend expires on real time even when the driver's clock stands still.
    let clock = Arc::new(ManualClock::new(1_000));
    let (store, driver) = memory_driver(&clock);
    let base = Identifier::new("base").unwrap();

    driver.set("base", "v", Some(1), &[]).await.unwrap();
    driver.set("derived", "d", None, &[base]).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2_200)).await;
    assert!(matches!(
        driver.get::<_, String>("derived", true).await,
        Err(CacheError::Expired(_))
    ));
    assert_eq!(driver.index().lookup("", "base").await.unwrap(), None);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_missing_dependency_expires_entry() {
    let clock = Arc::new(ManualClock::new(100));
    let (_store, driver) = memory_driver(&clock);
    let base = Identifier::new("base").unwrap();

    driver.set("base", &1u8, None, &[]).await.unwrap();
    driver.set("derived", &2u8, None, &[base]).await.unwrap();
    assert_eq!(driver.get::<_, u8>("derived", true).await.unwrap(), 2);

    driver.delete("base").await.unwrap();
    assert!(matches!(
        driver.get::<_, u8>("derived", true).await,
        Err(CacheError::Expired(_))
    ));
}

#[tokio::test]
async fn test_section_purge_is_isolated() {
    let clock = Arc::new(ManualClock::new(100));
    let (store, driver) = memory_driver(&clock);

    for id in ["a.x.1", "a.y.2", "b.z.3", "ab.w.4"] {
        driver.set(id, id, None, &[]).await.unwrap();
    }

    assert!(driver.delete_all(Some("a")).await.unwrap());
    for id in ["a.x.1", "a.y.2"] {
        assert!(matches!(
            driver.get::<_, String>(id, true).await,
            Err(CacheError::NotFound(_))
        ));
    }
    assert_eq!(driver.get::<_, String>("b.z.3", true).await.unwrap(), "b.z.3");
    assert_eq!(driver.get::<_, String>("ab.w.4", true).await.unwrap(), "ab.w.4");

    let mut sections = driver.index().read_directory().await.unwrap();
    sections.sort();
    assert_eq!(sections, vec!["ab.w".to_string(), "b.z".to_string()]);

    assert!(driver.delete_all(None).await.unwrap());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_nested_sections_are_purged_with_parent() {
    let clock = Arc::new(ManualClock::new(100));
    let (_store, driver) = memory_driver(&clock);

    driver.set("shop.cart.1", &1u32, None, &[]).await.unwrap();
    driver.set("shop.2", &2u32, None, &[]).await.unwrap();
    driver.set("other", &3u32, None, &[]).await.unwrap();

    driver.delete_all(Some("shop")).await.unwrap();
    assert!(driver.get::<_, u32>("shop.cart.1", true).await.is_err());
    assert!(driver.get::<_, u32>("shop.2", true).await.is_err());
    assert_eq!(driver.get::<_, u32>("other", true).await.unwrap(), 3);
}

#[tokio::test]
async fn test_read_through_runs_producer_once() {
    let clock = Arc::new(ManualClock::new(100));
    let (_store, driver) = memory_driver(&clock);
    let counter = AtomicUsize::new(0);
    let calls = &counter;

    for _ in 0..3 {
        let value: Vec<u32> = driver
            .call(
                "report.daily",
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    vec![1, 2, 3]
                },
                Some(60),
                &[],
            )
            .await
            .unwrap();
        assert_eq!(value, vec![1, 2, 3]);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // After expiry the producer runs again.
    clock.advance(61);
    let _: Vec<u32> = driver
        .call(
            "report.daily",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                vec![4]
            },
            Some(60),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let metrics = driver.metrics();
    assert_eq!(metrics.hits, 2);
    assert_eq!(metrics.misses, 2);
    assert_eq!(metrics.writes, 2);
}

#[tokio::test]
async fn test_failed_producer_stores_nothing() {
    let clock = Arc::new(ManualClock::new(100));
    let (store, driver) = memory_driver(&clock);

    let result: Result<u32, CacheError> = driver
        .try_call(
            "flaky",
            || async { Err(CacheError::BackendUnavailable("upstream down".to_string())) },
            None,
            &[],
        )
        .await;
    assert!(result.is_err());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_malformed_entry_is_recomputed() {
    let clock = Arc::new(ManualClock::new(100));
    let (store, driver) = memory_driver(&clock);

    driver.set("broken", "ok", None, &[]).await.unwrap();
    let indexed = driver.index().lookup("", "broken").await.unwrap().unwrap();
    let storage_key = driver.index().storage_key(indexed.physical_key());
    store.set(&storage_key, b"garbage", None).await.unwrap();

    assert!(matches!(
        driver.get::<_, String>("broken", true).await,
        Err(CacheError::MalformedEntry(_))
    ));

    let value: String = driver
        .call("broken", || async { "fresh".to_string() }, None, &[])
        .await
        .unwrap();
    assert_eq!(value, "fresh");
    // The rewrite reuses the physical key.
    let again = driver.index().lookup("", "broken").await.unwrap().unwrap();
    assert_eq!(again.physical_key(), indexed.physical_key());
    assert_eq!(driver.get::<_, String>("broken", true).await.unwrap(), "fresh");
}

#[tokio::test]
async fn test_user_profile_end_to_end() {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let (store, driver) = memory_driver(&clock);

    let mut profile = BTreeMap::new();
    profile.insert("name".to_string(), "Ann".to_string());

    driver.set("user.42", &profile, Some(300), &[]).await.unwrap();

    let section = driver.index().read_section("user").await.unwrap();
    let indexed = section.get("42").unwrap();
    assert_eq!(indexed.created(), 1_700_000_000 * 1_000_000);
    assert_eq!(driver.index().read_directory().await.unwrap(), vec!["user"]);

    let raw = store
        .get(&driver.index().storage_key(indexed.physical_key()))
        .await
        .unwrap()
        .unwrap();
    assert!(raw.starts_with(b"{{Cache_Properties}}"));

    let entry = driver.entry("user.42").await.unwrap();
    assert_eq!(entry.content_handler, ContentHandler::Serialized);
    assert_eq!(entry.expiration, Some(1_700_000_300));

    let read: BTreeMap<String, String> = driver.get("user.42", true).await.unwrap();
    assert_eq!(read, profile);

    driver.delete("user.42").await.unwrap();
    assert!(matches!(
        driver.get::<_, BTreeMap<String, String>>("user.42", true).await,
        Err(CacheError::NotFound(_))
    ));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_structured_identifiers_round_trip() {
    let clock = Arc::new(ManualClock::new(100));
    let (_store, driver) = memory_driver(&clock);

    let mut query = BTreeMap::new();
    query.insert("page", 2);
    query.insert("per_page", 50);

    driver.set(&query, "results", None, &[]).await.unwrap();
    assert_eq!(
        driver.get::<_, String>(&query, true).await.unwrap(),
        "results"
    );
    assert_eq!(driver.index().read_directory().await.unwrap(), vec!["_hashes"]);
}

#[tokio::test]
async fn test_json_handler_through_facade() {
    let config = CacheConfig {
        driver: DriverKind::Memory,
        content_handler: Some(ContentHandler::Json),
        ..CacheConfig::default()
    };
    let cache = Cache::from_config(&config).await.unwrap();

    cache.set("list", &vec!["a", "b"]).await.unwrap();
    let entry = cache.driver().entry("list").await.unwrap();
    assert_eq!(entry.content_handler, ContentHandler::Json);
    assert_eq!(entry.contents, b"a[\"a\",\"b\"]".to_vec());
    assert_eq!(
        cache.get::<_, Vec<String>>("list").await.unwrap(),
        vec!["a", "b"]
    );
}

#[tokio::test]
async fn test_file_store_scenario() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = CacheConfig::default();
    config.file.path = dir.path().to_path_buf();
    config.file.cache_id = "files".to_string();

    let cache = Cache::from_config(&config).await.unwrap();
    cache.set("docs.readme", "# Title").await.unwrap();
    cache.set("docs.license", "Apache-2.0").await.unwrap();
    cache.set("images.logo", &vec![0u8, 1, 2]).await.unwrap();

    assert_eq!(
        cache.get::<_, String>("docs.readme").await.unwrap(),
        "# Title"
    );

    let cache_files = || {
        std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "cache"))
            .count()
    };
    // Three entries, two section indexes and the directory.
    assert_eq!(cache_files(), 6);

    cache.delete_all(Some("docs")).await.unwrap();
    assert!(cache.try_get::<_, String>("docs.readme").await.unwrap().is_none());
    assert_eq!(
        cache.get::<_, Vec<u8>>("images.logo").await.unwrap(),
        vec![0, 1, 2]
    );
    assert_eq!(cache_files(), 3);

    // A second store over the same directory sees the same entries.
    let reopened = FileStore::new(dir.path()).unwrap();
    let driver = CacheDriver::new(Arc::new(reopened), "files");
    assert_eq!(
        driver.get::<_, Vec<u8>>("images.logo", true).await.unwrap(),
        vec![0, 1, 2]
    );
}
