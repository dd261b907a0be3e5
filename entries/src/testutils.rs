use crate::store::{KeyValueStore, MemoryStore, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const PREFIX: &str = "contentful";
pub const CACHE_PREFIX: &str = "cache";

pub fn entry(id: &str, fields: Value) -> Value {
    json!({
        "sys": {
            "type": "Entry",
            "id": id,
            "contentType": {"sys": {"type": "Link", "linkType": "ContentType", "id": "article"}}
        },
        "fields": fields,
    })
}

pub fn asset(id: &str) -> Value {
    json!({
        "sys": {"type": "Asset", "id": id},
        "fields": {"title": id, "file": {"url": format!("//images.example.com/{id}.png")}},
    })
}

pub fn link(link_type: &str, id: &str) -> Value {
    json!({"sys": {"type": "Link", "linkType": link_type, "id": id}})
}

pub fn put_entry(store: &MemoryStore, value: &Value) {
    let id = value["sys"]["id"].as_str().unwrap();
    store.insert(&format!("{PREFIX}:entry:{id}"), &value.to_string());
}

pub fn put_asset(store: &MemoryStore, value: &Value) {
    let id = value["sys"]["id"].as_str().unwrap();
    store.insert(&format!("{PREFIX}:asset:{id}"), &value.to_string());
}

/// Polls until `key` shows up in `store`, for detached cache writes.
pub async fn wait_for_key(store: &MemoryStore, key: &str) -> String {
    for _ in 0..100 {
        if let Some(value) = store.get(key).await.unwrap() {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{key} was never written");
}

/// Wraps a [`MemoryStore`], failing reads of chosen keys and optionally all
/// writes. Counts every read so tests can assert a tier was not touched.
pub struct FailingStore {
    inner: MemoryStore,
    failing_keys: Mutex<HashSet<String>>,
    fail_writes: AtomicBool,
    reads: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: MemoryStore) -> Self {
        FailingStore {
            inner,
            failing_keys: Mutex::new(HashSet::new()),
            fail_writes: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn fail_key(&self, key: &str) {
        self.failing_keys.lock().insert(key.into());
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::Relaxed);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    fn check(&self, key: &str) -> Result<(), StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if self.failing_keys.lock().contains(key) {
            return Err(StoreError::Unavailable { attempts: 0 });
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check(key)?;
        self.inner.get(key).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.check(key)?;
        self.inner.hget(key, field).await
    }

    async fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.check(key)?;
        self.inner.lrange(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable { attempts: 0 });
        }
        self.inner.set(key, value, ttl).await
    }
}
