use std::sync::Arc;
use std::time::Duration;

use moka::sync::{Cache, CacheBuilder};
use tokio::sync::Semaphore;
use tracing::warn;

use crate::error::{FetchCause, SymbolicationError};
use crate::metric_consts::{
    FETCH_FAILURES, GATE_TIMEOUTS, MAPPER_CACHE_HITS, MAPPER_CACHE_MISSES, MAPPER_CACHE_SIZE,
    NEGATIVE_CACHE_HITS,
};

use super::ArtifactProvider;

// The symbolication engine's cache layer: a positive LRU of parsed mappers, a
// negative LRU of keys we know we can't fetch, and a single-slot gate
// serializing the whole operation. The gate is a performance/safety decision
// about parse cost and mapper access patterns, not about cache integrity -
// both caches are individually atomic, and a double-parse race would be
// harmless. Eviction is size-driven only.
pub struct CachingLoader<P: ArtifactProvider> {
    provider: P,
    mappers: Cache<String, Arc<P::Mapper>>,
    missing: Cache<String, ()>,
    gate: Semaphore,
    gate_timeout: Duration,
}

impl<P: ArtifactProvider> CachingLoader<P> {
    pub fn new(provider: P, cache_size: u64, gate_timeout: Duration) -> Self {
        metrics::gauge!(MAPPER_CACHE_SIZE).set(cache_size as f64);
        Self {
            provider,
            mappers: CacheBuilder::new(cache_size).build(),
            missing: CacheBuilder::new(cache_size).build(),
            gate: Semaphore::new(1),
            gate_timeout,
        }
    }

    // Runs `op` against the mapper for `r`, loading and caching it first if
    // needed. Holds the gate for the whole call, lookup included.
    pub async fn with_mapper<T>(
        &self,
        r: &P::Ref,
        op: impl FnOnce(&P::Mapper) -> Result<T, SymbolicationError>,
    ) -> Result<T, SymbolicationError> {
        let key = r.to_string();

        // The semaphore is never closed, so the only failure mode here is the
        // timeout. Timeouts are fetch-classified - they mean the backend (or
        // whoever is holding the gate on its behalf) was unavailable to us.
        let permit = match tokio::time::timeout(self.gate_timeout, self.gate.acquire()).await {
            Ok(Ok(permit)) => permit,
            _ => {
                metrics::counter!(GATE_TIMEOUTS).increment(1);
                return Err(SymbolicationError::fetch(key, FetchCause::GateTimeout));
            }
        };

        if self.missing.contains_key(&key) {
            metrics::counter!(NEGATIVE_CACHE_HITS).increment(1);
            return Err(SymbolicationError::fetch(key, FetchCause::KnownMissing));
        }

        if let Some(mapper) = self.mappers.get(&key) {
            metrics::counter!(MAPPER_CACHE_HITS).increment(1);
            return op(&mapper);
        }
        metrics::counter!(MAPPER_CACHE_MISSES).increment(1);

        let data = match self.provider.fetch(r).await {
            Ok(data) => data,
            Err(e) => {
                // Only fetch failures land in the negative cache. Parse
                // failures below stay transient - they can indicate a partial
                // download worth retrying on a later record.
                warn!("Failed to fetch artifact {}: {}", key, e);
                metrics::counter!(FETCH_FAILURES).increment(1);
                self.missing.insert(key.clone(), ());
                return Err(SymbolicationError::fetch(key, FetchCause::Store(e)));
            }
        };

        let mapper = Arc::new(self.provider.parse(data)?);
        self.mappers.insert(key, mapper.clone());

        let result = op(&mapper);
        drop(permit);
        result
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::error::StoreError;
    use crate::symbol_store::ArtifactProvider;

    use super::*;

    // A provider where every fetch yields a fresh "mapper" recording how many
    // times the backend was actually touched.
    struct StubProvider {
        fetches: AtomicUsize,
        fetch_result: fn() -> Result<Vec<u8>, StoreError>,
        parse_result: fn(Vec<u8>) -> Result<usize, SymbolicationError>,
    }

    #[async_trait]
    impl ArtifactProvider for StubProvider {
        type Ref = String;
        type Mapper = usize;

        async fn fetch(&self, _: &String) -> Result<Vec<u8>, StoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            (self.fetch_result)()
        }

        fn parse(&self, data: Vec<u8>) -> Result<usize, SymbolicationError> {
            (self.parse_result)(data)
        }
    }

    fn loader(
        fetch_result: fn() -> Result<Vec<u8>, StoreError>,
        parse_result: fn(Vec<u8>) -> Result<usize, SymbolicationError>,
    ) -> CachingLoader<StubProvider> {
        CachingLoader::new(
            StubProvider {
                fetches: AtomicUsize::new(0),
                fetch_result,
                parse_result,
            },
            8,
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn repeated_loads_fetch_once() {
        let loader = loader(|| Ok(vec![1, 2, 3]), |d| Ok(d.len()));

        for _ in 0..5 {
            let len = loader
                .with_mapper(&"key".to_string(), |m| Ok(*m))
                .await
                .unwrap();
            assert_eq!(len, 3);
        }
        assert_eq!(loader.provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_failures_are_negative_cached() {
        let loader = loader(
            || Err(StoreError::NotFound("missing.txt".to_string())),
            |d| Ok(d.len()),
        );

        let err = loader
            .with_mapper(&"key".to_string(), |m| Ok(*m))
            .await
            .unwrap_err();
        assert!(err.is_fetch());

        // The second call must not touch the backend again.
        let err = loader
            .with_mapper(&"key".to_string(), |m| Ok(*m))
            .await
            .unwrap_err();
        assert!(err.is_fetch());
        assert_eq!(loader.provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn parse_failures_are_not_cached() {
        let loader = loader(
            || Ok(vec![]),
            |_| Err(SymbolicationError::Parse("truncated".to_string())),
        );

        for _ in 0..2 {
            let err = loader
                .with_mapper(&"key".to_string(), |m| Ok(*m))
                .await
                .unwrap_err();
            assert!(matches!(err, SymbolicationError::Parse(_)));
        }
        // Parse errors are transient, so both calls re-fetched.
        assert_eq!(loader.provider.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gate_timeouts_are_fetch_classified() {
        let loader = loader(|| Ok(vec![]), |d| Ok(d.len()));

        // Hold the gate so the load below has to wait out its timeout.
        let held = loader.gate.try_acquire().unwrap();
        let err = loader
            .with_mapper(&"key".to_string(), |m| Ok(*m))
            .await
            .unwrap_err();
        drop(held);

        assert!(err.is_fetch());
        assert_eq!(loader.provider.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn distinct_keys_fetch_independently() {
        let loader = loader(|| Ok(vec![7]), |d| Ok(d.len()));

        loader
            .with_mapper(&"a".to_string(), |m| Ok(*m))
            .await
            .unwrap();
        loader
            .with_mapper(&"b".to_string(), |m| Ok(*m))
            .await
            .unwrap();
        assert_eq!(loader.provider.fetches.load(Ordering::SeqCst), 2);
    }
}
