use crate::errors::EntriesError;
use crate::metrics_defs::{RESULT_CACHE_HIT, RESULT_CACHE_MISS, RESULT_CACHE_WRITE_FAILED};
use crate::store::KeyValueStore;
use crate::types::{ResponsePayload, Source};
use shared::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Outcome of a result cache read.
#[derive(Debug)]
pub enum CacheLookup {
    Hit(ResponsePayload),
    /// Caching is enabled but nothing is stored yet. Carries the key to write back to.
    Miss(String),
    /// Caching is not configured, so there is nothing to write back either.
    Disabled,
}

/// Cache of fully assembled responses, keyed by `<prefix>:<param>/<include>`.
#[derive(Clone)]
pub struct ResultCache {
    store: Option<Arc<dyn KeyValueStore>>,
    prefix: String,
    ttl: Option<Duration>,
}

impl ResultCache {
    /// Caching is disabled when either `store` is absent or `prefix` is empty.
    pub fn new(
        store: Option<Arc<dyn KeyValueStore>>,
        prefix: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Self {
        let prefix = prefix.into();
        ResultCache {
            store: store.filter(|_| !prefix.is_empty()),
            prefix,
            ttl,
        }
    }

    pub fn disabled() -> Self {
        ResultCache::new(None, "", None)
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn key(&self, param: &str, include: i64) -> String {
        format!("{}:{}/{}", self.prefix, param, include)
    }

    pub async fn lookup(&self, param: &str, include: i64) -> Result<CacheLookup, EntriesError> {
        let Some(store) = &self.store else {
            return Ok(CacheLookup::Disabled);
        };

        let key = self.key(param, include);
        match store.get(&key).await? {
            Some(json) => {
                counter!(RESULT_CACHE_HIT).increment(1);
                let mut payload: ResponsePayload = serde_json::from_str(&json)?;
                payload.source = Source::Cache;
                Ok(CacheLookup::Hit(payload))
            }
            None => {
                counter!(RESULT_CACHE_MISS).increment(1);
                tracing::debug!(key = %key, "Cache miss");
                Ok(CacheLookup::Miss(key))
            }
        }
    }

    /// Writes `payload` under `key` on a detached task.
    ///
    /// Failures are logged and counted, never reported to the caller. The
    /// handle is only returned so tests can wait for the write.
    pub fn store_detached(&self, key: String, payload: &ResponsePayload) -> Option<JoinHandle<()>> {
        let store = self.store.clone()?;
        let ttl = self.ttl;
        let payload = payload.clone();

        Some(tokio::spawn(async move {
            let result = match serde_json::to_string(&payload) {
                Ok(json) => store.set(&key, &json, ttl).await.map_err(EntriesError::from),
                Err(err) => Err(err.into()),
            };
            if let Err(err) = result {
                counter!(RESULT_CACHE_WRITE_FAILED).increment(1);
                tracing::error!(key = %key, error = %err, "Failed to write result cache");
            }
        }))
    }
}
