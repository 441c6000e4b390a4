//! Counter storage for the rate limiter.
//!
//! Both stores implement a fixed window: the first hit on a key opens a
//! window, every hit increments its counter, and the counter starts over
//! once the window has elapsed. `increment` is atomic per key, so
//! concurrent requests never lose updates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::Client as RedisClient;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Counter state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Attempts counted in the current window, including rejected ones.
    pub count: u64,
    /// Time until the window closes.
    pub resets_in: Duration,
}

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error")]
    Redis(#[from] redis::RedisError),
}

/// Shared counter storage.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Current window for `key`, if one is open.
    async fn get(&self, key: &str) -> Result<Option<WindowState>, StoreError>;

    /// Count one attempt against `key` and return the updated window.
    ///
    /// Opens a new window of length `window` when none is open or the
    /// previous one has elapsed.
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowState, StoreError>;

    /// Drop the window for `key`.
    async fn reset(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    started: Instant,
    length: Duration,
}

impl Window {
    fn elapsed_at(&self, now: Instant) -> bool {
        now.duration_since(self.started) >= self.length
    }

    fn state_at(&self, now: Instant) -> WindowState {
        WindowState {
            count: self.count,
            resets_in: self.length.saturating_sub(now.duration_since(self.started)),
        }
    }
}

/// In-process store.
///
/// Each key's read-modify-write happens under the map shard's write lock
/// held by the `entry` guard.
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    windows: DashMap<String, Window>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove elapsed windows. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.elapsed_at(now));
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked keys (for monitoring).
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Periodically sweep elapsed windows until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let dropped = store.sweep();
                if dropped > 0 {
                    debug!(dropped, "swept elapsed rate limit windows");
                }
            }
        })
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn get(&self, key: &str) -> Result<Option<WindowState>, StoreError> {
        let now = Instant::now();
        Ok(self
            .windows
            .get(key)
            .filter(|window| !window.elapsed_at(now))
            .map(|window| window.state_at(now)))
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<WindowState, StoreError> {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
            length: window,
        });

        if entry.elapsed_at(now) {
            entry.count = 0;
            entry.started = now;
            entry.length = window;
        }
        entry.count += 1;

        Ok(entry.state_at(now))
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.windows.remove(key);
        Ok(())
    }
}

/// Redis-backed store for multi-instance deployments.
///
/// Increments with one Lua script (INCR, PEXPIRE on the first hit, PTTL),
/// so a crash between commands cannot leave a counter without expiry.
#[derive(Clone)]
pub struct RedisRateLimitStore {
    redis: RedisClient,
}

const INCREMENT_SCRIPT: &str = r"local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
  ttl = tonumber(ARGV[1])
end
return {count, ttl}";

impl RedisRateLimitStore {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn get(&self, key: &str) -> Result<Option<WindowState>, StoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let (count, ttl_ms): (Option<u64>, i64) = redis::pipe()
            .get(key)
            .pttl(key)
            .query_async(&mut conn)
            .await?;

        Ok(count.map(|count| WindowState {
            count,
            resets_in: Duration::from_millis(ttl_ms.max(0) as u64),
        }))
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<WindowState, StoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let window_ms = window.as_millis().max(1) as i64;

        let (count, ttl_ms): (u64, i64) = redis::Script::new(INCREMENT_SCRIPT)
            .key(key)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;

        Ok(WindowState {
            count,
            resets_in: Duration::from_millis(ttl_ms.max(0) as u64),
        })
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let _: () = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisRateLimitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRateLimitStore").finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn counts_within_window() {
        let store = MemoryRateLimitStore::new();

        for expected in 1..=3 {
            let state = store.increment("rate:api:a", WINDOW).await.unwrap();
            assert_eq!(state.count, expected);
        }

        let state = store.get("rate:api:a").await.unwrap().unwrap();
        assert_eq!(state.count, 3);
        assert_eq!(state.resets_in, WINDOW);
        assert!(store.get("rate:api:b").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_elapsing() {
        let store = MemoryRateLimitStore::new();
        store.increment("k", WINDOW).await.unwrap();
        store.increment("k", WINDOW).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        let state = store.get("k").await.unwrap().unwrap();
        assert_eq!(state.resets_in, Duration::from_secs(6));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(store.get("k").await.unwrap().is_none());

        let state = store.increment("k", WINDOW).await.unwrap();
        assert_eq!(state.count, 1);
        assert_eq!(state.resets_in, WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_only_elapsed_windows() {
        let store = MemoryRateLimitStore::new();
        store.increment("short", Duration::from_secs(1)).await.unwrap();
        store.increment("long", Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("long").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reset_clears_key() {
        let store = MemoryRateLimitStore::new();
        store.increment("k", WINDOW).await.unwrap();
        store.reset("k").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryRateLimitStore::new());

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.increment("hot", WINDOW).await.unwrap().count })
            })
            .collect();

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap());
        }
        seen.sort_unstable();

        // Every attempt observed a distinct count
        assert_eq!(seen, (1..=200).collect::<Vec<u64>>());
        assert_eq!(store.get("hot").await.unwrap().unwrap().count, 200);
    }
}
