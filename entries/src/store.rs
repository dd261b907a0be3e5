//! The key-value store shared by the replica and the result cache.
//!
//! The replica is populated by an external sync process using Redis string,
//! hash and list values. Only the read side of those shapes is needed here,
//! plus plain string writes for the result cache.

use async_trait::async_trait;
use moka::Expiry;
use moka::sync::Cache;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store unavailable after {attempts} connection attempts")]
    Unavailable { attempts: u32 },

    #[error("value at {0} holds the wrong kind of data")]
    WrongType(String),
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Returns the whole list stored at `key`, empty if there is none.
    async fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Stores a string value. `None` means the value never expires.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// False once the store has been given up on.
    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Clone, Debug)]
struct Text {
    value: String,
    ttl: Option<Duration>,
    expires_at: Option<Instant>,
}

impl Text {
    fn new(value: &str, ttl: Option<Duration>) -> Self {
        Text {
            value: value.into(),
            ttl,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }
}

/// Expires each string value after the TTL it was written with.
struct TextExpiry;

impl Expiry<String, Text> for TextExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        text: &Text,
        _created_at: Instant,
    ) -> Option<Duration> {
        text.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        text: &Text,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        text.ttl
    }
}

#[derive(Clone, Debug)]
enum Collection {
    Hash(HashMap<String, String>),
    List(Vec<String>),
}

/// In-process implementation of [`KeyValueStore`] with Redis-like typing.
///
/// String values live in a moka cache that evicts them once their TTL has
/// passed. Hashes and lists are only written by fixtures and never expire.
pub struct MemoryStore {
    texts: Cache<String, Text>,
    collections: RwLock<HashMap<String, Collection>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore {
            texts: Cache::builder().expire_after(TextExpiry).build(),
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.put_text(key, Text::new(value, None));
    }

    pub fn insert_hash_field(&self, key: &str, field: &str, value: &str) {
        let mut collections = self.collections.write();
        self.texts.invalidate(key);
        let collection = collections
            .entry(key.into())
            .or_insert_with(|| Collection::Hash(HashMap::new()));
        match collection {
            Collection::Hash(hash) => {
                hash.insert(field.into(), value.into());
            }
            other => *other = Collection::Hash(HashMap::from([(field.into(), value.into())])),
        }
    }

    pub fn push_list(&self, key: &str, value: &str) {
        let mut collections = self.collections.write();
        self.texts.invalidate(key);
        let collection = collections
            .entry(key.into())
            .or_insert_with(|| Collection::List(Vec::new()));
        match collection {
            Collection::List(list) => list.push(value.into()),
            other => *other = Collection::List(vec![value.into()]),
        }
    }

    /// Remaining lifetime of the string at `key`. `Some(None)` means it never expires.
    pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        let text = self.texts.get(key)?;
        Some(
            text.expires_at
                .map(|at| at.saturating_duration_since(Instant::now())),
        )
    }

    /// Number of keys held, after evicting expired values.
    pub fn len(&self) -> usize {
        self.texts.run_pending_tasks();
        self.texts.entry_count() as usize + self.collections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn put_text(&self, key: &str, text: Text) {
        let mut collections = self.collections.write();
        collections.remove(key);
        self.texts.insert(key.into(), text);
    }

    fn read_collection<T>(
        &self,
        key: &str,
        f: impl FnOnce(&Collection) -> Option<T>,
    ) -> Result<Option<T>, StoreError> {
        match self.collections.read().get(key) {
            Some(collection) => f(collection)
                .map(Some)
                .ok_or_else(|| StoreError::WrongType(key.into())),
            None if self.texts.contains_key(key) => Err(StoreError::WrongType(key.into())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(text) = self.texts.get(key) {
            return Ok(Some(text.value));
        }
        match self.collections.read().contains_key(key) {
            true => Err(StoreError::WrongType(key.into())),
            false => Ok(None),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let value = self.read_collection(key, |collection| match collection {
            Collection::Hash(hash) => Some(hash.get(field).cloned()),
            Collection::List(_) => None,
        })?;
        Ok(value.flatten())
    }

    async fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let value = self.read_collection(key, |collection| match collection {
            Collection::List(list) => Some(list.clone()),
            Collection::Hash(_) => None,
        })?;
        Ok(value.unwrap_or_default())
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.put_text(key, Text::new(value, ttl));
        Ok(())
    }
}
