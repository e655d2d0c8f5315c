// Key-value backends for the result cache

use crate::error::EngineError;
use log::{info, warn};
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed future returned by cache backends
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EngineError>> + Send + 'a>>;

/// Minimal request/response contract the result cache needs
pub trait CacheBackend: Send + Sync {
    fn ping(&self) -> CacheFuture<'_, ()>;

    /// Batched get; one slot per key, in key order
    fn get_many<'a>(&'a self, keys: &'a [String]) -> CacheFuture<'a, Vec<Option<String>>>;

    /// Write all entries atomically with a shared expiry
    fn set_many<'a>(&'a self, entries: &'a [(String, String)], ttl: Duration) -> CacheFuture<'a, ()>;
}

/// Redis-compatible backend over one multiplexed connection.
/// Every connect and every command is bounded; a failed or silent connection is dropped so
/// the next call reconnects.
pub struct RedisBackend {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl RedisBackend {
    pub fn new(uri: &str, connect_timeout: Duration, response_timeout: Duration) -> Result<Self, EngineError> {
        let client = redis::Client::open(uri)
            .map_err(|e| EngineError::Config(format!("Invalid cache URI {:?}: {}", uri, e)))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            connect_timeout,
            response_timeout,
        })
    }

    // The lock only guards the handle; clones share the socket without holding it
    async fn connection(&self) -> Result<MultiplexedConnection, EngineError> {
        let cached = self.connection.lock().clone();
        if let Some(connection) = cached {
            return Ok(connection);
        }

        let connection = match tokio::time::timeout(self.connect_timeout, self.client.get_multiplexed_tokio_connection())
            .await
        {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return Err(EngineError::CacheUnavailable(e.to_string())),
            Err(_) => {
                return Err(EngineError::CacheUnavailable(format!(
                    "connect timed out after {:?}",
                    self.connect_timeout
                )))
            }
        };

        info!("Cache connected");
        *self.connection.lock() = Some(connection.clone());
        Ok(connection)
    }

    async fn run<T, F, Fut>(&self, op: F) -> Result<T, EngineError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let connection = self.connection().await?;
        let reason = match tokio::time::timeout(self.response_timeout, op(connection)).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("no reply within {:?}", self.response_timeout),
        };

        warn!("Cache command failed, dropping connection: {}", reason);
        *self.connection.lock() = None;
        Err(EngineError::CacheUnavailable(reason))
    }
}

impl CacheBackend for RedisBackend {
    fn ping(&self) -> CacheFuture<'_, ()> {
        Box::pin(self.run(|mut con| async move {
            let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut con).await;
            pong.map(|_| ())
        }))
    }

    fn get_many<'a>(&'a self, keys: &'a [String]) -> CacheFuture<'a, Vec<Option<String>>> {
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(Vec::new());
            }
            self.run(|mut con| async move {
                let values: redis::RedisResult<Vec<Option<String>>> =
                    redis::cmd("MGET").arg(keys).query_async(&mut con).await;
                values
            })
            .await
        })
    }

    fn set_many<'a>(&'a self, entries: &'a [(String, String)], ttl: Duration) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            if entries.is_empty() {
                return Ok(());
            }
            let ttl_secs = ttl.as_secs().max(1);
            let mut pipe = redis::pipe();
            pipe.atomic();
            for (key, value) in entries {
                pipe.cmd("SETEX").arg(key).arg(ttl_secs).arg(value).ignore();
            }
            self.run(|mut con| async move {
                let written: redis::RedisResult<()> = pipe.query_async(&mut con).await;
                written
            })
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    fn backend(uri: &str, timeout_ms: u64) -> RedisBackend {
        let timeout = Duration::from_millis(timeout_ms);
        RedisBackend::new(uri, timeout, timeout).unwrap()
    }

    #[test]
    fn test_invalid_uri_is_config_error() {
        let result = RedisBackend::new("not a uri", Duration::from_millis(10), Duration::from_millis(10));
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_cache_unavailable() {
        // Port 1 is reserved and refuses connections
        let backend = backend("redis://127.0.0.1:1", 200);
        assert!(matches!(backend.ping().await, Err(EngineError::CacheUnavailable(_))));
        assert!(matches!(
            backend.get_many(&["k".to_string()]).await,
            Err(EngineError::CacheUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_silent_server_times_out_without_blocking_other_calls() {
        // The kernel completes the handshake; nothing ever reads or replies
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let uri = format!("redis://{}", listener.local_addr().unwrap());
        let backend = backend(&uri, 200);
        let keys = vec!["k".to_string()];

        let started = Instant::now();
        let (first, second) = tokio::join!(backend.get_many(&keys), backend.get_many(&keys));

        assert!(matches!(first, Err(EngineError::CacheUnavailable(_))));
        assert!(matches!(second, Err(EngineError::CacheUnavailable(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(backend.connection.lock().is_none());
    }

    #[tokio::test]
    async fn test_empty_batches_skip_the_network() {
        let backend = backend("redis://127.0.0.1:1", 10);
        assert!(backend.get_many(&[]).await.unwrap().is_empty());
        assert!(backend.set_many(&[], Duration::from_secs(1)).await.is_ok());
    }
}
