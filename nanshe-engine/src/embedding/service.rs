//! Cached embedding front end used by the rest of the engine.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{Embedder, HashedEmbedder};
use crate::config::EmbeddingConfig;

/// Cache key: text digest plus whether the remote backend was allowed.
type CacheKey = (String, bool);

/// Embeds text with the remote backend when enabled, falling back to
/// hashing. Results are cached per `(text, remote_allowed)` in a bounded
/// LRU.
pub struct EmbeddingService {
    local: HashedEmbedder,
    remote: Option<Arc<dyn Embedder>>,
    use_remote: bool,
    cache: Mutex<LruCache<CacheKey, Vec<f32>>>,
}

impl EmbeddingService {
    pub fn new(config: &EmbeddingConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            local: HashedEmbedder::new(config.dimension),
            remote: None,
            use_remote: config.use_remote,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Attach a remote backend; only consulted when `use_remote` is set
    pub fn with_remote(mut self, remote: Arc<dyn Embedder>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn dimension(&self) -> usize {
        self.local.dimension()
    }

    /// Embed with the configured backend
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        self.embed_with(text, self.use_remote).await
    }

    /// Embed, allowing the remote backend only if `remote_allowed`
    pub async fn embed_with(&self, text: &str, remote_allowed: bool) -> Vec<f32> {
        let key = (hex::encode(Sha256::digest(text.as_bytes())), remote_allowed);
        if let Some(hit) = self.cache_get(&key) {
            return hit;
        }

        let vector = match (&self.remote, remote_allowed) {
            (Some(remote), true) => match remote.embed(text).await {
                Ok(v) if v.len() == self.dimension() => v,
                Ok(v) => {
                    warn!(got = v.len(), want = self.dimension(), "Remote embedding has wrong size, using hashed fallback");
                    self.local.embed_sync(text)
                }
                Err(e) => {
                    warn!(error = %e, "Remote embedding failed, using hashed fallback");
                    self.local.embed_sync(text)
                }
            },
            _ => self.local.embed_sync(text),
        };

        self.cache_put(key, vector.clone());
        vector
    }

    fn cache_get(&self, key: &CacheKey) -> Option<Vec<f32>> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let hit = cache.get(key).cloned();
        if hit.is_some() {
            debug!("Embedding cache hit");
        }
        hit
    }

    fn cache_put(&self, key: CacheKey, vector: Vec<f32>) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(key, vector);
    }

    /// Number of cached vectors
    pub fn cached(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineError, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRemote {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Embedder for CountingRemote {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EngineError::Embedding("down".into()));
            }
            let mut v = vec![0.0; 8];
            v[0] = 1.0;
            Ok(v)
        }

        fn dimension(&self) -> usize {
            8
        }
    }

    fn config(use_remote: bool, cache_capacity: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            dimension: 8,
            use_remote,
            cache_capacity,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cache_avoids_second_remote_call() {
        let remote = Arc::new(CountingRemote {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let service = EmbeddingService::new(&config(true, 4)).with_remote(remote.clone());
        let a = service.embed("hello").await;
        let b = service.embed("hello").await;
        assert_eq!(a, b);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a[0], 1.0);
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_hashed() {
        let remote = Arc::new(CountingRemote {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let service = EmbeddingService::new(&config(true, 4)).with_remote(remote);
        let v = service.embed("hello world").await;
        assert_eq!(v, HashedEmbedder::new(8).embed_sync("hello world"));
    }

    #[tokio::test]
    async fn test_remote_flag_is_part_of_key() {
        let remote = Arc::new(CountingRemote {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let service = EmbeddingService::new(&config(true, 4)).with_remote(remote.clone());
        let local = service.embed_with("hello", false).await;
        let remote_v = service.embed_with("hello", true).await;
        assert_ne!(local, remote_v);
        assert_eq!(service.cached(), 2);
    }

    #[tokio::test]
    async fn test_cache_is_bounded() {
        let service = EmbeddingService::new(&config(false, 2));
        for text in ["a", "b", "c"] {
            service.embed(text).await;
        }
        assert_eq!(service.cached(), 2);
    }
}
