//! Resolution of CMS entry graphs from a key-value replica, with a result
//! cache in front and the live CMS API as the last tier.

pub mod config;
pub mod errors;
pub mod fallback;
pub mod metrics_defs;
pub mod redis_store;
pub mod replica;
pub mod resolver;
pub mod result_cache;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
mod testutils;

pub use errors::EntriesError;
pub use service::EntryService;
pub use types::{ContentQuery, ErrorEnvelope, ResponsePayload, Source};
