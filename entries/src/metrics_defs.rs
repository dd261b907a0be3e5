//! Metrics definitions for content entry resolution.

use shared::metrics_defs::{MetricDef, MetricType};

pub const RESULT_CACHE_HIT: MetricDef = MetricDef {
    name: "result_cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of queries answered from the result cache",
};

pub const RESULT_CACHE_MISS: MetricDef = MetricDef {
    name: "result_cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of queries that missed the result cache",
};

pub const RESULT_CACHE_WRITE_FAILED: MetricDef = MetricDef {
    name: "result_cache.write_failed",
    metric_type: MetricType::Counter,
    description: "Number of resolved responses that could not be written to the result cache",
};

pub const REPLICA_LINK_FAILED: MetricDef = MetricDef {
    name: "replica.link_failed",
    metric_type: MetricType::Counter,
    description: "Number of links replaced with null because they could not be fetched",
};

pub const REPLICA_QUERY_DURATION: MetricDef = MetricDef {
    name: "replica.query.duration",
    metric_type: MetricType::Histogram,
    description: "Time to resolve a query against the replica in seconds",
};

pub const FALLBACK_REQUESTS: MetricDef = MetricDef {
    name: "fallback.requests",
    metric_type: MetricType::Counter,
    description: "Number of queries sent to the live CMS API",
};

pub const FALLBACK_ERRORS: MetricDef = MetricDef {
    name: "fallback.errors",
    metric_type: MetricType::Counter,
    description: "Number of failed queries to the live CMS API",
};

pub const STORE_RECONNECT: MetricDef = MetricDef {
    name: "store.reconnect",
    metric_type: MetricType::Counter,
    description: "Number of failed store connection attempts",
};

pub const ALL_METRICS: &[MetricDef] = &[
    RESULT_CACHE_HIT,
    RESULT_CACHE_MISS,
    RESULT_CACHE_WRITE_FAILED,
    REPLICA_LINK_FAILED,
    REPLICA_QUERY_DURATION,
    FALLBACK_REQUESTS,
    FALLBACK_ERRORS,
    STORE_RECONNECT,
];
