use crate::errors::EntriesError;
use crate::store::{KeyValueStore, StoreError};
use crate::types::ResourceKind;
use serde_json::Value;
use std::sync::Arc;

/// Typed reads over the denormalized CMS snapshot kept in the store.
///
/// Key layout, shared with the process that populates the replica:
///
/// - `<prefix>:entry:<sysId>` JSON entry
/// - `<prefix>:asset:<sysId>` JSON asset
/// - `<prefix>:authorIds` hash of author id to entry sysId
/// - `<prefix>:contentType:<contentType>` list of entry sysIds
#[derive(Clone)]
pub struct Replica {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl Replica {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Replica {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn resource_key(&self, kind: ResourceKind, sys_id: &str) -> String {
        format!("{}:{}:{}", self.prefix, kind.key_segment(), sys_id)
    }

    pub fn author_index_key(&self) -> String {
        format!("{}:authorIds", self.prefix)
    }

    pub fn content_type_key(&self, content_type: &str) -> String {
        format!("{}:contentType:{}", self.prefix, content_type)
    }

    /// Reads the raw snapshot of an entry or asset, `None` if it is absent.
    pub async fn fetch(
        &self,
        kind: ResourceKind,
        sys_id: &str,
    ) -> Result<Option<Value>, EntriesError> {
        let key = self.resource_key(kind, sys_id);
        tracing::debug!(key = %key, "Getting replica key");

        match self.store.get(&key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn author_entry_id(&self, author_id: &str) -> Result<Option<String>, StoreError> {
        let key = self.author_index_key();
        tracing::debug!(key = %key, author_id, "Getting replica hash field");
        self.store.hget(&key, author_id).await
    }

    pub async fn content_type_ids(&self, content_type: &str) -> Result<Vec<String>, StoreError> {
        let key = self.content_type_key(content_type);
        tracing::debug!(key = %key, "Getting replica list");
        let ids = self.store.lrange(&key).await?;
        tracing::debug!(key = %key, count = ids.len(), "Got replica list");
        Ok(ids)
    }
}
