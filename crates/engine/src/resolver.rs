//! Entity resolver: point lookups that turn absent records into typed failures.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use stockpulse_common::error::AppError;
use stockpulse_common::types::{Stock, User, Wishlist};

use crate::error::{Entity, ProcessingError};
use crate::store::WishlistStore;

/// Default upper bound on a single store lookup.
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves users, stocks and wishlists by primary key. Performs no retries.
#[derive(Clone)]
pub struct EntityResolver {
    store: Arc<dyn WishlistStore>,
    timeout: Duration,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn WishlistStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User, ProcessingError> {
        tracing::debug!(user_id, "Fetching user");
        self.bounded("user lookup", self.store.find_user(user_id))
            .await?
            .ok_or_else(|| Self::not_found(Entity::User, user_id))
    }

    pub async fn get_stock(&self, stock_id: &str) -> Result<Stock, ProcessingError> {
        tracing::debug!(stock_id, "Fetching stock");
        self.bounded("stock lookup", self.store.find_stock(stock_id))
            .await?
            .ok_or_else(|| Self::not_found(Entity::Stock, stock_id))
    }

    pub async fn get_wishlist(&self, wishlist_id: &str) -> Result<Wishlist, ProcessingError> {
        tracing::debug!(wishlist_id, "Fetching wishlist");
        self.bounded("wishlist lookup", self.store.find_wishlist(wishlist_id))
            .await?
            .ok_or_else(|| Self::not_found(Entity::Wishlist, wishlist_id))
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        lookup: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, ProcessingError> {
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ProcessingError::Timeout { operation }),
        }
    }

    fn not_found(entity: Entity, id: &str) -> ProcessingError {
        tracing::warn!(entity = %entity, id, "Record not found");
        ProcessingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
