use crate::config::RetryPolicy;
use crate::metrics_defs::STORE_RECONNECT;
use crate::store::{KeyValueStore, StoreError};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisResult};
use shared::counter;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;

enum ConnectionState {
    /// No connection yet, or the last one was dropped.
    Idle,
    Connected {
        conn: MultiplexedConnection,
        generation: u64,
    },
    /// Retries were exhausted. Only a process restart recovers from this.
    Abandoned,
}

/// A connection handed out for one command, tagged with the connect that
/// opened it.
struct Lease {
    conn: MultiplexedConnection,
    generation: u64,
}

/// Redis-backed [`KeyValueStore`].
///
/// The connection is opened lazily on the first command and shared by all
/// callers. See [`RetryPolicy`] for the reconnect schedule.
pub struct RedisStore {
    client: redis::Client,
    policy: RetryPolicy,
    state: Mutex<ConnectionState>,
    generations: AtomicU64,
    abandoned: AtomicBool,
}

impl RedisStore {
    pub fn new(url: &str, policy: RetryPolicy) -> Result<Self, StoreError> {
        Ok(RedisStore {
            client: redis::Client::open(url)?,
            policy,
            state: Mutex::new(ConnectionState::Idle),
            generations: AtomicU64::new(0),
            abandoned: AtomicBool::new(false),
        })
    }

    async fn connection(&self) -> Result<Lease, StoreError> {
        let attempts = self.policy.attempts();
        // Held across retries so concurrent callers wait for one connect loop
        let mut state = self.state.lock().await;
        match &*state {
            ConnectionState::Connected { conn, generation } => {
                return Ok(Lease {
                    conn: conn.clone(),
                    generation: *generation,
                });
            }
            ConnectionState::Abandoned => return Err(StoreError::Unavailable { attempts }),
            ConnectionState::Idle => {}
        }

        for attempt in 1..=attempts {
            match self.client.get_multiplexed_async_connection().await {
                Ok(conn) => {
                    let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
                    *state = ConnectionState::Connected {
                        conn: conn.clone(),
                        generation,
                    };
                    return Ok(Lease { conn, generation });
                }
                Err(err) => {
                    counter!(STORE_RECONNECT).increment(1);
                    if attempt == attempts {
                        tracing::error!(attempt, error = %err, "Store refused the connection");
                        break;
                    }
                    let delay = self.policy.delay(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Reconnecting to store"
                    );
                    sleep(delay).await;
                }
            }
        }

        tracing::error!(attempts, "Giving up on the store connection");
        *state = ConnectionState::Abandoned;
        self.abandoned.store(true, Ordering::Relaxed);
        Err(StoreError::Unavailable { attempts })
    }

    /// Returns to `Idle` if connection `generation` is still the current one.
    /// A newer connection opened by another caller is left alone.
    async fn invalidate(&self, generation: u64) -> bool {
        let mut state = self.state.lock().await;
        match &*state {
            ConnectionState::Connected { generation: current, .. } if *current == generation => {
                *state = ConnectionState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Drops a broken connection so the next command reconnects.
    async fn observe<T>(&self, generation: u64, result: RedisResult<T>) -> Result<T, StoreError> {
        if let Err(err) = &result
            && (err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error())
            && self.invalidate(generation).await
        {
            tracing::warn!(error = %err, generation, "Store connection lost");
        }
        Ok(result?)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let Lease { mut conn, generation } = self.connection().await?;
        let result: RedisResult<Option<String>> = conn.get(key).await;
        self.observe(generation, result).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let Lease { mut conn, generation } = self.connection().await?;
        let result: RedisResult<Option<String>> = conn.hget(key, field).await;
        self.observe(generation, result).await
    }

    async fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let Lease { mut conn, generation } = self.connection().await?;
        let result: RedisResult<Vec<String>> = conn.lrange(key, 0, -1).await;
        self.observe(generation, result).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let Lease { mut conn, generation } = self.connection().await?;
        let result: RedisResult<()> = match ttl {
            Some(ttl) => conn.set_ex(key, value, ttl.as_secs().max(1)).await,
            None => conn.set(key, value).await,
        };
        self.observe(generation, result).await
    }

    fn is_available(&self) -> bool {
        !self.abandoned.load(Ordering::Relaxed)
    }
}
