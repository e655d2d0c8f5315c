// Per-input result cache
// Rows are keyed by (model, input identity); the column header is cached per model

pub mod backend;

pub use backend::{CacheBackend, CacheFuture, RedisBackend};

use crate::error::EngineError;
use crate::models::input::InputItem;
use crate::models::plan::Row;
use crate::models::settings::EngineSettings;
use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a batched lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheLookup {
    /// Item index -> cached row
    pub hits: HashMap<usize, Row>,
    /// Indices of items that must be computed, in input order
    pub misses: Vec<usize>,
}

impl CacheLookup {
    pub fn all_misses(count: usize) -> Self {
        Self {
            hits: HashMap::new(),
            misses: (0..count).collect(),
        }
    }
}

pub struct ResultCache {
    backend: Option<Arc<dyn CacheBackend>>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            backend: Some(backend),
            ttl,
        }
    }

    /// Cache that is never available
    pub fn disabled() -> Self {
        Self {
            backend: None,
            ttl: Duration::ZERO,
        }
    }

    /// Redis-backed cache from settings; an unusable URI disables caching
    pub fn from_settings(settings: &EngineSettings) -> Self {
        let connect_timeout = Duration::from_millis(settings.cache_connect_timeout_ms);
        let response_timeout = Duration::from_millis(settings.cache_response_timeout_ms);
        match RedisBackend::new(&settings.redis_uri, connect_timeout, response_timeout) {
            Ok(backend) => Self::new(Arc::new(backend), settings.cache_ttl()),
            Err(e) => {
                warn!("Result cache disabled: {}", e);
                Self::disabled()
            }
        }
    }

    fn backend(&self) -> Result<&Arc<dyn CacheBackend>, EngineError> {
        self.backend
            .as_ref()
            .ok_or_else(|| EngineError::CacheUnavailable("cache disabled".to_string()))
    }

    pub async fn is_available(&self) -> bool {
        let reachable = match self.backend() {
            Ok(backend) => backend.ping().await,
            Err(e) => Err(e),
        };
        match reachable {
            Ok(()) => true,
            Err(e) => {
                warn!("Result cache not reachable: {}", e);
                false
            }
        }
    }

    pub async fn lookup(&self, model_id: &str, items: &[InputItem]) -> Result<CacheLookup, EngineError> {
        let backend = self.backend()?;
        let keys: Vec<String> = items.iter().map(|item| cache_key(model_id, item)).collect();
        let cached = backend.get_many(&keys).await?;

        if cached.len() != keys.len() {
            return Err(EngineError::CacheUnavailable(format!(
                "multi-get returned {} values for {} keys",
                cached.len(),
                keys.len()
            )));
        }

        let mut lookup = CacheLookup::default();
        for (index, value) in cached.into_iter().enumerate() {
            match value.map(|raw| serde_json::from_str::<Row>(&raw)) {
                Some(Ok(row)) => {
                    lookup.hits.insert(index, row);
                }
                Some(Err(e)) => {
                    warn!("Discarding undecodable cache entry {}: {}", keys[index], e);
                    lookup.misses.push(index);
                }
                None => lookup.misses.push(index),
            }
        }

        debug!(
            "Cache lookup for {}: {} hits, {} misses",
            model_id,
            lookup.hits.len(),
            lookup.misses.len()
        );
        Ok(lookup)
    }

    /// Write computed rows back, one entry per item, in a single atomic batch
    pub async fn store(&self, model_id: &str, items: &[&InputItem], rows: &[Row]) -> Result<(), EngineError> {
        let backend = self.backend()?;
        let mut entries = Vec::with_capacity(items.len());
        for (item, row) in items.iter().zip(rows) {
            let encoded = serde_json::to_string(row)
                .map_err(|e| EngineError::Codec(format!("Failed to encode row: {}", e)))?;
            entries.push((cache_key(model_id, item), encoded));
        }
        backend.set_many(&entries, self.ttl).await
    }

    /// Return the cached header, caching `computed` when none is stored yet.
    /// A freshly computed header wins over the cached one.
    pub async fn get_or_compute_header(
        &self,
        model_id: &str,
        computed: Option<&[String]>,
    ) -> Result<Option<Vec<String>>, EngineError> {
        let backend = self.backend()?;
        let key = header_key(model_id);

        let cached = backend
            .get_many(std::slice::from_ref(&key))
            .await?
            .into_iter()
            .next()
            .flatten()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok());

        match (computed, cached) {
            (Some(header), cached) if !header.is_empty() => {
                if cached.as_deref() != Some(header) {
                    let encoded = serde_json::to_string(header)
                        .map_err(|e| EngineError::Codec(format!("Failed to encode header: {}", e)))?;
                    backend.set_many(&[(key, encoded)], self.ttl).await?;
                }
                Ok(Some(header.to_vec()))
            }
            (_, cached) => Ok(cached),
        }
    }
}

/// `model:key` for keyed items, otherwise a 128-bit digest of `model:value`
pub fn cache_key(model_id: &str, item: &InputItem) -> String {
    match item.key() {
        Some(key) => format!("{}:{}", model_id, key),
        None => {
            let digest = Sha256::digest(format!("{}:{}", model_id, item.value()).as_bytes());
            digest[..16].iter().map(|b| format!("{:02x}", b)).collect()
        }
    }
}

pub fn header_key(model_id: &str) -> String {
    format!("header:{}", model_id)
}
