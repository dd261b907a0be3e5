use serde::Deserialize;
use std::time::Duration;

const DEFAULT_CMS_URL: &str = "https://cdn.contentful.com";

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StoreConfig {
    Redis {
        url: String,
        #[serde(default)]
        retry: RetryPolicy,
    },
    /// Process-local store, empty at startup.
    Memory,
}

/// Reconnect schedule for the store connection.
///
/// Attempt `n` (1-based) waits `min(base_delay_ms * 2^(n-1), max_delay_ms)`
/// before the next one. Once `max_attempts` connects have failed the store is
/// given up on for the rest of the process lifetime. At least one connect is
/// always attempted, even with `max_attempts: 0`.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
        let millis = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    10
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    3000
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct CacheConfig {
    /// Key prefix of cached responses. Empty disables the result cache.
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: i64,
}

impl CacheConfig {
    /// `None` means cached responses never expire.
    pub fn ttl(&self) -> Option<Duration> {
        u64::try_from(self.ttl_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            prefix: String::new(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> i64 {
    -1
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct FallbackConfig {
    #[serde(default)]
    pub space: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl FallbackConfig {
    pub fn is_enabled(&self) -> bool {
        !self.space.is_empty() && !self.access_token.is_empty()
    }
}

fn default_environment() -> String {
    "master".into()
}

fn default_base_url() -> String {
    DEFAULT_CMS_URL.into()
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct Config {
    /// Backing store shared by the replica and the result cache.
    pub store: Option<StoreConfig>,
    /// Key prefix of the replicated entries. Empty disables the replica.
    #[serde(default)]
    pub replica_prefix: String,
    #[serde(default)]
    pub cache: CacheConfig,
    pub fallback: Option<FallbackConfig>,
}
