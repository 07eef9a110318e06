//! Behavioral tests for the peer-sharded render cache: store hits,
//! single-flight coalescing, error propagation, and peer fallback.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use umlpipe::application::error::AppError;
use umlpipe::cache::{CacheConfig, CacheError, CacheKey, RenderCache, RenderSource};
use umlpipe::domain::diagram::Format;

struct CountingSource {
    calls: AtomicUsize,
    delay: Duration,
    fail: bool,
}

impl CountingSource {
    fn new(delay: Duration, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            fail,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderSource for CountingSource {
    async fn render_key(&self, key: &CacheKey) -> Result<Bytes, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(AppError::validation("unable to decode diagram"));
        }
        Ok(Bytes::from(format!("rendered:{key}")))
    }
}

fn single_node_cache(source: Arc<CountingSource>) -> RenderCache {
    RenderCache::new(
        CacheConfig {
            local_addr: "127.0.0.1:8441".to_string(),
            members: Vec::new(),
            max_bytes: 1024 * 1024,
        },
        source,
    )
}

fn key(encoded: &str) -> CacheKey {
    CacheKey {
        format: Format::Png,
        encoded: encoded.to_string(),
    }
}

#[tokio::test]
async fn repeated_gets_render_once() {
    let source = CountingSource::new(Duration::ZERO, false);
    let cache = single_node_cache(source.clone());

    let first = cache.get(&key("SoWk0000")).await.expect("first get");
    let second = cache.get(&key("SoWk0000")).await.expect("second get");

    assert_eq!(first, second);
    assert_eq!(source.calls(), 1, "second get must come from the store");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_gets_coalesce_onto_one_fill() {
    let source = CountingSource::new(Duration::from_millis(200), false);
    let cache = Arc::new(single_node_cache(source.clone()));

    let k = key("SoWk0000");
    let (a, b, c) = tokio::join!(cache.get(&k), cache.get(&k), cache.get(&k),);

    let a = a.expect("leader");
    assert_eq!(b.expect("waiter"), a);
    assert_eq!(c.expect("waiter"), a);
    assert_eq!(source.calls(), 1, "all callers must share one render");
}

#[tokio::test]
async fn distinct_keys_fill_independently() {
    let source = CountingSource::new(Duration::ZERO, false);
    let cache = single_node_cache(source.clone());

    let png = cache.get(&key("SoWk0000")).await.expect("png fill");
    let svg = cache
        .get(&CacheKey {
            format: Format::Svg,
            encoded: "SoWk0000".to_string(),
        })
        .await
        .expect("svg fill");

    assert_ne!(png, svg, "format is part of the key");
    assert_eq!(source.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fill_failures_reach_every_coalesced_caller_and_are_not_cached() {
    let source = CountingSource::new(Duration::from_millis(100), true);
    let cache = Arc::new(single_node_cache(source.clone()));

    let bad = key("bad");
    let (a, b) = tokio::join!(cache.get(&bad), cache.get(&bad));
    assert!(matches!(a, Err(CacheError::Fill(_))), "got {a:?}");
    assert!(matches!(b, Err(CacheError::Fill(_))), "got {b:?}");
    assert_eq!(source.calls(), 1, "failed fill must still be single-flight");

    // Failures are not stored, so the next caller re-renders.
    let _ = cache.get(&key("bad")).await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn unreachable_peers_fall_back_to_local_fill() {
    let source = CountingSource::new(Duration::ZERO, false);
    // Port 1 is never listening; keys owned by the peer must still resolve.
    let cache = RenderCache::new(
        CacheConfig {
            local_addr: "127.0.0.1:8441".to_string(),
            members: vec!["127.0.0.1:1".to_string()],
            max_bytes: 1024 * 1024,
        },
        source.clone(),
    );

    for i in 0..16 {
        let value = cache
            .get(&key(&format!("diagram-{i}")))
            .await
            .expect("every key must resolve despite the dead peer");
        assert!(!value.is_empty());
    }
    assert_eq!(source.calls(), 16);
}
