//! Peer-sharded render result cache.
//!
//! Every daemon in the group holds the same static member list. A key is
//! owned by exactly one member (consistent hashing); the owner keeps a
//! size-bounded in-memory store of serialized results and fills misses by
//! rendering, with at most one concurrent fill per key. Requests arriving
//! at a non-owner are forwarded to the owner over its internal cache
//! route, falling back to a local fill if the peer cannot be reached.
//!
//! The fill path is injected as [`RenderSource`] so this module never
//! depends on the render pipeline's types, only on its error.

mod config;
mod flight;
mod ring;
mod store;

pub use self::config::CacheConfig;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::error::AppError;
use crate::domain::diagram::Format;

use flight::{Flight, FlightGroup};
use ring::HashRing;
use store::ValueStore;

const TARGET: &str = "umlpipe::cache";

/// Content address of a render result: upper-case format name plus the
/// short code of the canonical source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub format: Format,
    pub encoded: String,
}

impl CacheKey {
    pub fn parse(raw: &str) -> Option<Self> {
        let (format, encoded) = raw.split_once(':')?;
        let format = Format::parse(format)?;
        if encoded.is_empty() {
            return None;
        }
        Some(Self {
            format,
            encoded: encoded.to_string(),
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.format.as_str(), self.encoded)
    }
}

/// Authoritative producer for cache misses; implemented by the render
/// pipeline and injected at construction.
#[async_trait]
pub trait RenderSource: Send + Sync {
    async fn render_key(&self, key: &CacheKey) -> Result<Bytes, AppError>;
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache key has wrong format: {0}")]
    BadKey(String),
    #[error(transparent)]
    Fill(Arc<AppError>),
    #[error("peer fetch from {peer} failed: {reason}")]
    Peer { peer: String, reason: String },
    #[error("concurrent fill for this key was abandoned")]
    Abandoned,
}

pub struct RenderCache {
    local: String,
    ring: HashRing,
    store: ValueStore,
    flight: FlightGroup,
    source: Arc<dyn RenderSource>,
    client: reqwest::Client,
}

impl RenderCache {
    pub fn new(config: CacheConfig, source: Arc<dyn RenderSource>) -> Self {
        let mut members = config.members.clone();
        members.push(config.local_addr.clone());
        members.sort();
        members.dedup();
        info!(
            target: TARGET,
            local = %config.local_addr,
            members = members.len(),
            max_bytes = config.max_bytes,
            "starting render cache"
        );

        Self {
            local: config.local_addr,
            ring: HashRing::new(members),
            store: ValueStore::new(config.max_bytes),
            flight: FlightGroup::new(),
            source,
            client: reqwest::Client::new(),
        }
    }

    /// Fetch a value, routing to the key's owner.
    pub async fn get(&self, key: &CacheKey) -> Result<Bytes, CacheError> {
        let key_str = key.to_string();
        let owner = self.ring.owner(&key_str).to_string();
        if owner == self.local {
            return self.get_owned(key).await;
        }

        match self.fetch_from_peer(&owner, &key_str).await {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(
                    target: TARGET,
                    key = %key_str,
                    error = %err,
                    "peer fetch failed, filling locally"
                );
                self.get_owned(key).await
            }
        }
    }

    /// Fetch or fill a value this node serves authoritatively.
    ///
    /// Peers land here via the internal cache route; there is no further
    /// forwarding. At most one fill per key runs at a time, with
    /// concurrent callers coalescing onto its outcome.
    pub async fn get_owned(&self, key: &CacheKey) -> Result<Bytes, CacheError> {
        let key_str = key.to_string();
        if let Some(hit) = self.store.get(&key_str) {
            return Ok(hit);
        }

        match self.flight.join(&key_str) {
            Flight::Leader(guard) => {
                info!(target: TARGET, key = %key_str, "cache miss, rendering");
                let result = self
                    .source
                    .render_key(key)
                    .await
                    .map_err(|err| CacheError::Fill(Arc::new(err)));
                if let Ok(value) = &result {
                    self.store.insert(&key_str, value.clone());
                }
                guard.complete(result.clone());
                result
            }
            Flight::Waiter(rx) => rx.await.unwrap_or(Err(CacheError::Abandoned)),
        }
    }

    async fn fetch_from_peer(&self, owner: &str, key: &str) -> Result<Bytes, CacheError> {
        let url = format!("http://{owner}/internal/cache/render/{key}");
        let peer_err = |reason: String| CacheError::Peer {
            peer: owner.to_string(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| peer_err(err.to_string()))?;
        if !response.status().is_success() {
            return Err(peer_err(format!("status {}", response.status())));
        }
        response
            .bytes()
            .await
            .map_err(|err| peer_err(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_round_trips_through_display() {
        let key = CacheKey {
            format: Format::Svg,
            encoded: "SoWk0000".to_string(),
        };
        assert_eq!(key.to_string(), "SVG:SoWk0000");
        assert_eq!(CacheKey::parse("SVG:SoWk0000"), Some(key));
    }

    #[test]
    fn cache_key_parse_rejects_malformed_input() {
        assert_eq!(CacheKey::parse("SVG"), None);
        assert_eq!(CacheKey::parse("SVG:"), None);
        assert_eq!(CacheKey::parse("GIF:abc"), None);
        assert_eq!(CacheKey::parse("UNSPECIFIED:abc"), None);
    }
}
