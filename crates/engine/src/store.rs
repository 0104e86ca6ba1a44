//! Record store: point reads of users, stocks and wishlists, plus the
//! conditional notified-flag write.
//!
//! `PgStore` is the production backend. `MemoryStore` has the same semantics
//! for single-process embedding and tests.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use sqlx::PgPool;

use stockpulse_common::error::AppError;
use stockpulse_common::types::{Stock, User, Wishlist};

/// Storage contract consumed by the resolver and the pipeline.
#[async_trait]
pub trait WishlistStore: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, AppError>;

    async fn find_stock(&self, stock_id: &str) -> Result<Option<Stock>, AppError>;

    async fn find_wishlist(&self, wishlist_id: &str) -> Result<Option<Wishlist>, AppError>;

    /// Persist the notified flag and timestamp of `wishlist`, but only while the
    /// stored row is still un-notified. Returns `false` when nothing was written.
    async fn mark_notified(&self, wishlist: &Wishlist) -> Result<bool, AppError>;

    /// All wishlists of a user, newest first, optionally only active ones.
    async fn list_wishlists_by_user(
        &self,
        user_id: &str,
        active_only: bool,
    ) -> Result<Vec<Wishlist>, AppError>;

    /// Active wishlists that have not been notified yet, oldest first.
    async fn list_pending_wishlists(&self) -> Result<Vec<Wishlist>, AppError>;
}

const WISHLIST_COLUMNS: &str = "id, user_id, stock_id, rule_type, rule_value_in_percent, \
     rate_value_targeted, rule_value_at_set, created_at, updated_at, active, notified";

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WishlistStore for PgStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        let user: Option<User> = sqlx::query_as(
            r#"
            SELECT id, name, email, phone, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_stock(&self, stock_id: &str) -> Result<Option<Stock>, AppError> {
        let stock: Option<Stock> = sqlx::query_as(
            r#"
            SELECT id, symbol, name, current_price, exchange, sector
            FROM stocks
            WHERE id = $1
            "#,
        )
        .bind(stock_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(stock)
    }

    async fn find_wishlist(&self, wishlist_id: &str) -> Result<Option<Wishlist>, AppError> {
        let wishlist: Option<Wishlist> =
            sqlx::query_as(&format!("SELECT {WISHLIST_COLUMNS} FROM wishlists WHERE id = $1"))
                .bind(wishlist_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(wishlist)
    }

    async fn mark_notified(&self, wishlist: &Wishlist) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE wishlists
            SET notified = $2, updated_at = $3
            WHERE id = $1 AND notified = false
            "#,
        )
        .bind(&wishlist.id)
        .bind(wishlist.notified)
        .bind(wishlist.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_wishlists_by_user(
        &self,
        user_id: &str,
        active_only: bool,
    ) -> Result<Vec<Wishlist>, AppError> {
        let wishlists: Vec<Wishlist> = sqlx::query_as(&format!(
            "SELECT {WISHLIST_COLUMNS} FROM wishlists \
             WHERE user_id = $1 AND (active = true OR NOT $2) \
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(wishlists)
    }

    async fn list_pending_wishlists(&self) -> Result<Vec<Wishlist>, AppError> {
        let wishlists: Vec<Wishlist> = sqlx::query_as(&format!(
            "SELECT {WISHLIST_COLUMNS} FROM wishlists \
             WHERE active = true AND notified = false \
             ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(wishlists)
    }
}

/// In-process store with the same semantics as [`PgStore`].
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, User>>,
    stocks: RwLock<HashMap<String, Stock>>,
    wishlists: RwLock<HashMap<String, Wishlist>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.id.clone(), user);
    }

    pub fn insert_stock(&self, stock: Stock) {
        self.stocks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(stock.id.clone(), stock);
    }

    pub fn insert_wishlist(&self, wishlist: Wishlist) {
        self.wishlists
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(wishlist.id.clone(), wishlist);
    }

    /// Snapshot of a stored wishlist.
    pub fn wishlist(&self, wishlist_id: &str) -> Option<Wishlist> {
        self.wishlists
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(wishlist_id)
            .cloned()
    }
}

#[async_trait]
impl WishlistStore for MemoryStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned())
    }

    async fn find_stock(&self, stock_id: &str) -> Result<Option<Stock>, AppError> {
        Ok(self
            .stocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(stock_id)
            .cloned())
    }

    async fn find_wishlist(&self, wishlist_id: &str) -> Result<Option<Wishlist>, AppError> {
        Ok(self.wishlist(wishlist_id))
    }

    async fn mark_notified(&self, wishlist: &Wishlist) -> Result<bool, AppError> {
        let mut wishlists = self
            .wishlists
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        match wishlists.get_mut(&wishlist.id) {
            Some(stored) if !stored.notified => {
                stored.notified = wishlist.notified;
                stored.updated_at = wishlist.updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_wishlists_by_user(
        &self,
        user_id: &str,
        active_only: bool,
    ) -> Result<Vec<Wishlist>, AppError> {
        let mut found: Vec<Wishlist> = self
            .wishlists
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|w| w.user_id == user_id && (w.active || !active_only))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn list_pending_wishlists(&self) -> Result<Vec<Wishlist>, AppError> {
        let mut found: Vec<Wishlist> = self
            .wishlists
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|w| w.active && !w.notified)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }
}
