use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (claims, queue, dead letters)
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Redis list the consumer pops wishlist messages from (default: "QStacks")
    pub queue_name: String,

    /// Seconds a single BRPOP blocks before returning empty (default: 5)
    pub queue_poll_timeout_secs: u64,

    /// Redis list that receives failed payloads. Unset means log-and-drop.
    pub dead_letter_queue: Option<String>,

    /// Retry attempts for retryable failures (default: 0, no retry)
    pub max_retries: u32,

    /// Base delay for exponential retry backoff in milliseconds (default: 500)
    pub retry_backoff_ms: u64,

    /// Upper bound on a single store call in milliseconds (default: 5000)
    pub store_timeout_ms: u64,

    /// Upper bound on a notification dispatch in milliseconds (default: 10000)
    pub notify_timeout_ms: u64,

    /// Expiry of the per-wishlist processing claim in milliseconds (default: 60000).
    /// Must outlast the claimed section, see [`AppConfig::claimed_section_ms`].
    pub claim_ttl_ms: u64,

    /// Delay applied by the simulated email transport (default: 100)
    pub simulated_send_delay_ms: u64,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,

    /// Port the manual-trigger API listens on (default: 3000)
    pub api_port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            queue_name: std::env::var("QUEUE_NAME").unwrap_or_else(|_| "QStacks".to_string()),
            queue_poll_timeout_secs: std::env::var("QUEUE_POLL_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("QUEUE_POLL_TIMEOUT_SECS must be a valid u64"))?,
            dead_letter_queue: std::env::var("DEAD_LETTER_QUEUE")
                .ok()
                .filter(|q| !q.trim().is_empty()),
            max_retries: std::env::var("MAX_RETRIES")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("MAX_RETRIES must be a valid u32"))?,
            retry_backoff_ms: std::env::var("RETRY_BACKOFF_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RETRY_BACKOFF_MS must be a valid u64"))?,
            store_timeout_ms: std::env::var("STORE_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("STORE_TIMEOUT_MS must be a valid u64"))?,
            notify_timeout_ms: std::env::var("NOTIFY_TIMEOUT_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("NOTIFY_TIMEOUT_MS must be a valid u64"))?,
            claim_ttl_ms: std::env::var("CLAIM_TTL_MS")
                .unwrap_or_else(|_| "60000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("CLAIM_TTL_MS must be a valid u64"))?,
            simulated_send_delay_ms: std::env::var("SIMULATED_SEND_DELAY_MS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SIMULATED_SEND_DELAY_MS must be a valid u64"))?,
            resend_api_key: std::env::var("RESEND_API_KEY").ok(),
            email_from: std::env::var("EMAIL_FROM").ok(),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid u16"))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Worst case a claim must cover: the acquire, three lookups and the
    /// notified-flag write at `store_timeout_ms` each, plus one dispatch.
    pub fn claimed_section_ms(&self) -> u64 {
        self.store_timeout_ms
            .saturating_mul(5)
            .saturating_add(self.notify_timeout_ms)
    }

    /// Reject settings under which a claim can expire mid-run.
    pub fn validate(&self) -> anyhow::Result<()> {
        let section = self.claimed_section_ms();
        if self.claim_ttl_ms <= section {
            anyhow::bail!(
                "CLAIM_TTL_MS ({}) must exceed 5 x STORE_TIMEOUT_MS + NOTIFY_TIMEOUT_MS ({})",
                self.claim_ttl_ms,
                section
            );
        }
        Ok(())
    }
}
