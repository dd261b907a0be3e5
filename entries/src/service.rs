use crate::config::{CacheConfig, Config, StoreConfig};
use crate::errors::EntriesError;
use crate::fallback::FallbackClient;
use crate::metrics_defs::REPLICA_QUERY_DURATION;
use crate::redis_store::RedisStore;
use crate::replica::Replica;
use crate::resolver::{LinkResolver, ResolvedGraph};
use crate::result_cache::{CacheLookup, ResultCache};
use crate::store::{KeyValueStore, MemoryStore};
use crate::types::{ContentQuery, MAX_ITEMS, ResourceKind, ResponsePayload, Source};
use futures::future::try_join_all;
use shared::histogram;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Responses cached while the replica is disabled expire after this long,
/// whatever TTL is configured.
pub const REPLICA_DISABLED_CACHE_TTL: Duration = Duration::from_secs(30);

struct EntryServiceInner {
    store: Option<Arc<dyn KeyValueStore>>,
    resolver: Option<LinkResolver>,
    cache: ResultCache,
    fallback: Option<FallbackClient>,
}

/// Answers content queries from the result cache, the replica or the CMS API.
///
/// The replica queries report [`EntriesError::ReplicaDisabled`] when no
/// replica is configured. Moving on to the matching fallback query is up to
/// the caller.
#[derive(Clone)]
pub struct EntryService {
    inner: Arc<EntryServiceInner>,
}

impl EntryService {
    pub fn from_config(config: &Config) -> Result<Self, EntriesError> {
        let store: Option<Arc<dyn KeyValueStore>> = match &config.store {
            Some(StoreConfig::Redis { url, retry }) => {
                Some(Arc::new(RedisStore::new(url, retry.clone())?))
            }
            Some(StoreConfig::Memory) => Some(Arc::new(MemoryStore::new())),
            None => None,
        };

        let fallback = match &config.fallback {
            Some(fallback) => FallbackClient::new(fallback)?,
            None => None,
        };

        Ok(EntryService::new(
            store,
            &config.replica_prefix,
            &config.cache,
            fallback,
        ))
    }

    pub fn new(
        store: Option<Arc<dyn KeyValueStore>>,
        replica_prefix: &str,
        cache: &CacheConfig,
        fallback: Option<FallbackClient>,
    ) -> Self {
        let resolver = store
            .clone()
            .filter(|_| !replica_prefix.is_empty())
            .map(|store| LinkResolver::new(Replica::new(store, replica_prefix)));

        let ttl = match resolver {
            Some(_) => cache.ttl(),
            None => Some(REPLICA_DISABLED_CACHE_TTL),
        };

        EntryService {
            inner: Arc::new(EntryServiceInner {
                cache: ResultCache::new(store.clone(), cache.prefix.as_str(), ttl),
                store,
                resolver,
                fallback,
            }),
        }
    }

    pub fn replica_enabled(&self) -> bool {
        self.inner.resolver.is_some()
    }

    pub fn caching_enabled(&self) -> bool {
        self.inner.cache.is_enabled()
    }

    pub fn fallback_enabled(&self) -> bool {
        self.inner.fallback.is_some()
    }

    /// False once the backing store has been given up on.
    pub fn is_ready(&self) -> bool {
        self.inner
            .store
            .as_ref()
            .is_none_or(|store| store.is_available())
    }

    /// Runs `query` against the replica, or against the CMS API when the
    /// replica is disabled.
    pub async fn query(
        &self,
        query: &ContentQuery,
        include: i64,
    ) -> Result<ResponsePayload, EntriesError> {
        match self.query_replica(query, include).await {
            Err(EntriesError::ReplicaDisabled) => self.query_fallback(query, include).await,
            result => result,
        }
    }

    pub async fn get_entry_by_id(
        &self,
        content_id: &str,
        include: i64,
    ) -> Result<ResponsePayload, EntriesError> {
        self.cached(content_id, include, async {
            let resolver = self.resolver()?;
            let started = Instant::now();
            let graph = resolver
                .get_by_sys_id(ResourceKind::Entry, Some(content_id), include, false)
                .await?;
            histogram!(REPLICA_QUERY_DURATION).record(started.elapsed().as_secs_f64());
            Ok(single_payload(graph))
        })
        .await
    }

    pub async fn get_entry_by_author_id(
        &self,
        author_id: &str,
        include: i64,
    ) -> Result<ResponsePayload, EntriesError> {
        self.cached(author_id, include, async {
            let resolver = self.resolver()?;
            let started = Instant::now();
            let entry_id = resolver.replica().author_entry_id(author_id).await?;
            let graph = resolver
                .get_by_sys_id(ResourceKind::Entry, entry_id.as_deref(), include, false)
                .await?;
            histogram!(REPLICA_QUERY_DURATION).record(started.elapsed().as_secs_f64());
            Ok(single_payload(graph))
        })
        .await
    }

    pub async fn get_entries_by_content_type(
        &self,
        content_type: &str,
        include: i64,
    ) -> Result<ResponsePayload, EntriesError> {
        self.cached(content_type, include, async {
            let resolver = self.resolver()?;
            let started = Instant::now();
            let ids = resolver.replica().content_type_ids(content_type).await?;
            let graphs = try_join_all(ids.iter().map(|id| {
                resolver.get_by_sys_id(ResourceKind::Entry, Some(id), include, false)
            }))
            .await?;
            histogram!(REPLICA_QUERY_DURATION).record(started.elapsed().as_secs_f64());
            Ok(list_payload(graphs))
        })
        .await
    }

    pub async fn query_replica(
        &self,
        query: &ContentQuery,
        include: i64,
    ) -> Result<ResponsePayload, EntriesError> {
        match query {
            ContentQuery::ById { content_id, .. } => {
                self.get_entry_by_id(content_id, include).await
            }
            ContentQuery::ByAuthor { author_id, .. } => {
                self.get_entry_by_author_id(author_id, include).await
            }
            ContentQuery::ByContentType { content_type } => {
                self.get_entries_by_content_type(content_type, include)
                    .await
            }
        }
    }

    pub async fn fallback_entry_by_id(
        &self,
        content_id: &str,
        content_type: &str,
        include: i64,
    ) -> Result<ResponsePayload, EntriesError> {
        self.cached(content_id, include, async {
            let fallback = self.fallback()?;
            Ok(fallback
                .entries_by_id(content_id, content_type, include)
                .await?)
        })
        .await
    }

    pub async fn fallback_entry_by_author_id(
        &self,
        author_id: &str,
        content_type: &str,
        include: i64,
    ) -> Result<ResponsePayload, EntriesError> {
        self.cached(author_id, include, async {
            let fallback = self.fallback()?;
            Ok(fallback
                .entries_by_author(author_id, content_type, include)
                .await?)
        })
        .await
    }

    pub async fn fallback_entries_by_content_type(
        &self,
        content_type: &str,
        include: i64,
    ) -> Result<ResponsePayload, EntriesError> {
        self.cached(content_type, include, async {
            let fallback = self.fallback()?;
            Ok(fallback
                .entries_by_content_type(content_type, include)
                .await?)
        })
        .await
    }

    pub async fn query_fallback(
        &self,
        query: &ContentQuery,
        include: i64,
    ) -> Result<ResponsePayload, EntriesError> {
        match query {
            ContentQuery::ById {
                content_id,
                content_type,
            } => {
                self.fallback_entry_by_id(content_id, content_type, include)
                    .await
            }
            ContentQuery::ByAuthor {
                author_id,
                content_type,
            } => {
                self.fallback_entry_by_author_id(author_id, content_type, include)
                    .await
            }
            ContentQuery::ByContentType { content_type } => {
                self.fallback_entries_by_content_type(content_type, include)
                    .await
            }
        }
    }

    fn resolver(&self) -> Result<&LinkResolver, EntriesError> {
        self.inner
            .resolver
            .as_ref()
            .ok_or(EntriesError::ReplicaDisabled)
    }

    fn fallback(&self) -> Result<&FallbackClient, EntriesError> {
        self.inner
            .fallback
            .as_ref()
            .ok_or(EntriesError::FallbackDisabled)
    }

    /// Serves from the result cache, or runs `tier` and writes its result back
    /// on a miss. `tier` is not polled on a hit.
    async fn cached<F>(
        &self,
        param: &str,
        include: i64,
        tier: F,
    ) -> Result<ResponsePayload, EntriesError>
    where
        F: Future<Output = Result<ResponsePayload, EntriesError>>,
    {
        let key = match self.inner.cache.lookup(param, include).await? {
            CacheLookup::Hit(payload) => return Ok(payload),
            CacheLookup::Miss(key) => Some(key),
            CacheLookup::Disabled => None,
        };

        let payload = tier.await?;

        if let Some(key) = key {
            // Not awaited: cache writes never hold up or fail the response
            let _ = self.inner.cache.store_detached(key, &payload);
        }

        Ok(payload)
    }
}

fn single_payload(graph: ResolvedGraph) -> ResponsePayload {
    let mut payload = ResponsePayload::empty(Source::Replica);
    if !graph.content.is_null() {
        payload.items.push(graph.content);
        payload.total = 1;
    }
    payload.includes.entries = graph.included_entries;
    payload.includes.assets = graph.included_assets;
    payload
}

fn list_payload(graphs: Vec<ResolvedGraph>) -> ResponsePayload {
    let mut payload = ResponsePayload::empty(Source::Replica);
    let mut items = Vec::new();
    for graph in graphs {
        if !graph.content.is_null() {
            items.push(graph.content);
        }
        payload.includes.entries.extend(graph.included_entries);
        payload.includes.assets.extend(graph.included_assets);
    }
    payload.total = items.len() as u64;
    items.truncate(MAX_ITEMS);
    payload.items = items;
    payload
}
