use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator between the user id and the stock id in a wishlist id.
pub const WISHLIST_ID_SEPARATOR: &str = "::";

/// Inbound queue message: `{ "id": "<userId>::<stockId>" }`.
///
/// `id` is optional so that `{}` and `{"id": null}` decode and are rejected by
/// validation rather than by the JSON decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    #[serde(default)]
    pub id: Option<String>,
}

impl QueueMessage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
        }
    }
}

/// A registered user. Owned by the identity subsystem; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Recipient address, or an empty string when the user has none.
    pub fn email_address(&self) -> &str {
        self.email.as_deref().unwrap_or_default()
    }

    /// Display name, falling back to the user id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// A listed stock. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Stock {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub current_price: Option<f64>,
    pub exchange: Option<String>,
    pub sector: Option<String>,
}

/// Classification of a wishlist alert trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    PercentageIncrease,
    PercentageDrop,
    /// Any rule type this service has no phrasing for.
    Other,
}

impl RuleType {
    /// Interpret a stored rule type string, ignoring case.
    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "percentage_increase" => RuleType::PercentageIncrease,
            "percentage_drop" => RuleType::PercentageDrop,
            _ => RuleType::Other,
        }
    }
}

impl std::fmt::Display for RuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleType::PercentageIncrease => write!(f, "percentage_increase"),
            RuleType::PercentageDrop => write!(f, "percentage_drop"),
            RuleType::Other => write!(f, "other"),
        }
    }
}

/// A user's standing alert rule on one stock, keyed by `userId::stockId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Wishlist {
    pub id: String,
    pub user_id: String,
    pub stock_id: String,
    /// Free-form rule type, e.g. "percentage_increase" (see [`RuleType::parse`])
    pub rule_type: String,
    /// Display value of the rule, e.g. "5%"
    pub rule_value_in_percent: String,
    /// Target price, e.g. 2500
    pub rate_value_targeted: Option<f64>,
    /// Price of the stock when the rule was set or last updated
    pub rule_value_at_set: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Only active wishlists are price-tracked upstream
    pub active: bool,
    /// Set once the user has been notified
    pub notified: bool,
}

impl Wishlist {
    /// Build the composite wishlist id for a user/stock pair.
    pub fn composite_id(user_id: &str, stock_id: &str) -> String {
        format!("{user_id}{WISHLIST_ID_SEPARATOR}{stock_id}")
    }

    /// Whether `id` matches `user_id::stock_id`.
    pub fn has_consistent_id(&self) -> bool {
        self.id == Self::composite_id(&self.user_id, &self.stock_id)
    }

    pub fn rule(&self) -> RuleType {
        RuleType::parse(&self.rule_type)
    }

    /// The notified variant of this wishlist, stamped at `at`.
    pub fn into_notified(self, at: DateTime<Utc>) -> Self {
        Self {
            notified: true,
            updated_at: at,
            ..self
        }
    }
}
