//! Per-wishlist processing claims.
//!
//! A delivery must hold the claim for its wishlist id from the first lookup until
//! the notified flag is written, so two deliveries of the same message cannot
//! both dispatch. Redis claims use `SET NX PX` with a random token and are
//! released with a compare-and-delete script; expiry bounds a crashed holder.
//!
//! A [`ClaimGuard`] that is dropped without an explicit release (for example
//! when the processing future is cancelled) still gives its claim back.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use stockpulse_common::error::AppError;

/// Default claim expiry (60 seconds).
const DEFAULT_CLAIM_TTL: Duration = Duration::from_secs(60);

/// Deletes the claim only if it still carries our token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Runs when a guard is dropped while still armed. Receives key and token.
type DropHook = Box<dyn FnOnce(&str, &str) + Send + Sync>;

/// Proof of a held claim. Hand it back to [`ClaimLock::release`]; if it is
/// dropped instead, the claim is released in the background.
pub struct ClaimGuard {
    key: String,
    token: String,
    on_drop: Option<DropHook>,
}

impl ClaimGuard {
    fn new(key: String, token: String, on_drop: DropHook) -> Self {
        Self {
            key,
            token,
            on_drop: Some(on_drop),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Skip the drop hook; the caller releases explicitly.
    fn disarm(&mut self) {
        self.on_drop = None;
    }
}

impl std::fmt::Debug for ClaimGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimGuard")
            .field("key", &self.key)
            .field("armed", &self.on_drop.is_some())
            .finish()
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if let Some(hook) = self.on_drop.take() {
            tracing::debug!(key = %self.key, "Claim dropped without release, releasing");
            hook(&self.key, &self.token);
        }
    }
}

/// Mutual exclusion keyed by wishlist id.
#[async_trait]
pub trait ClaimLock: Send + Sync {
    /// Try to claim `wishlist_id`. `None` means another holder has it.
    async fn acquire(&self, wishlist_id: &str) -> Result<Option<ClaimGuard>, AppError>;

    async fn release(&self, guard: ClaimGuard) -> Result<(), AppError>;
}

/// Redis-backed claims shared by every consumer and API instance.
#[derive(Clone)]
pub struct RedisClaimLock {
    redis: ConnectionManager,
    ttl: Duration,
}

impl RedisClaimLock {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            ttl: DEFAULT_CLAIM_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn claim_key(wishlist_id: &str) -> String {
        format!("wishlist:claim:{}", wishlist_id)
    }

    async fn delete_if_owned(
        redis: &mut ConnectionManager,
        key: &str,
        token: &str,
    ) -> Result<bool, redis::RedisError> {
        let removed: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(redis)
            .await?;
        Ok(removed > 0)
    }

    /// Release from `Drop`: spawn the compare-and-delete on the current runtime.
    fn background_release(redis: ConnectionManager) -> DropHook {
        Box::new(move |key: &str, token: &str| {
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                tracing::warn!(key, "No runtime to release claim; it will expire on its own");
                return;
            };
            let (key, token) = (key.to_string(), token.to_string());
            let mut redis = redis;
            handle.spawn(async move {
                if let Err(e) = Self::delete_if_owned(&mut redis, &key, &token).await {
                    tracing::warn!(key = %key, error = %e, "Background claim release failed");
                }
            });
        })
    }
}

#[async_trait]
impl ClaimLock for RedisClaimLock {
    async fn acquire(&self, wishlist_id: &str) -> Result<Option<ClaimGuard>, AppError> {
        let key = Self::claim_key(wishlist_id);
        let token = Uuid::new_v4().to_string();
        let mut redis = self.redis.clone();

        // SET key token NX PX ttl
        // Returns Some("OK") if the claim was taken, None if already held
        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut redis)
            .await?;

        if result.is_none() {
            tracing::debug!(wishlist_id, "Claim held by another delivery");
            return Ok(None);
        }

        let hook = Self::background_release(self.redis.clone());
        Ok(Some(ClaimGuard::new(key, token, hook)))
    }

    async fn release(&self, mut guard: ClaimGuard) -> Result<(), AppError> {
        guard.disarm();
        let mut redis = self.redis.clone();
        if !Self::delete_if_owned(&mut redis, &guard.key, &guard.token).await? {
            tracing::warn!(key = %guard.key, "Claim expired before release");
        }
        Ok(())
    }
}

/// In-process claims for a single instance (embedding and tests).
#[derive(Default)]
pub struct LocalClaimLock {
    held: Arc<Mutex<HashSet<String>>>,
}

impl LocalClaimLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, wishlist_id: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(wishlist_id)
    }
}

#[async_trait]
impl ClaimLock for LocalClaimLock {
    async fn acquire(&self, wishlist_id: &str) -> Result<Option<ClaimGuard>, AppError> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(wishlist_id.to_string()) {
            return Ok(None);
        }

        let set = Arc::clone(&self.held);
        let hook: DropHook = Box::new(move |key: &str, _token: &str| {
            set.lock().unwrap_or_else(PoisonError::into_inner).remove(key);
        });
        Ok(Some(ClaimGuard::new(wishlist_id.to_string(), String::new(), hook)))
    }

    async fn release(&self, mut guard: ClaimGuard) -> Result<(), AppError> {
        guard.disarm();
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&guard.key);
        Ok(())
    }
}
