/// Configuration management for feed-composer
///
/// Loads configuration from environment variables (a `.env` file is honored).
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Upper bound on waiting for a pooled connection; this is the repository timeout
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

/// Upper bound for a single FEED_SLOT_* weight
pub const MAX_SLOT_WEIGHT: usize = 1000;

/// Slot weights for the canonical page of 10
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotWeights {
    pub discovery: usize,
    pub following: usize,
    pub friends: usize,
    pub regional: usize,
}

impl Default for SlotWeights {
    fn default() -> Self {
        Self {
            discovery: 4,
            following: 3,
            friends: 2,
            regional: 1,
        }
    }
}

/// Feed composition policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub slots: SlotWeights,
    /// Discovery only samples posts newer than this
    pub discovery_window_days: i64,
    pub view_window_days: i64,
    pub view_cap: usize,
    pub city_window_days: i64,
    pub region_window_days: i64,
    pub country_window_days: i64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 50,
            slots: SlotWeights::default(),
            discovery_window_days: 7,
            view_window_days: 30,
            view_cap: 1000,
            city_window_days: 3,
            region_window_days: 5,
            country_window_days: 7,
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

fn default_run_migrations() -> bool {
    true
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl FeedConfig {
    /// Read FEED_* overrides on top of the defaults
    pub fn from_env() -> Self {
        let defaults = FeedConfig::default();
        FeedConfig {
            default_page_size: env_or("FEED_DEFAULT_PAGE_SIZE", defaults.default_page_size),
            max_page_size: env_or("FEED_MAX_PAGE_SIZE", defaults.max_page_size),
            slots: SlotWeights {
                discovery: env_or("FEED_SLOT_DISCOVERY", defaults.slots.discovery),
                following: env_or("FEED_SLOT_FOLLOWING", defaults.slots.following),
                friends: env_or("FEED_SLOT_FRIENDS", defaults.slots.friends),
                regional: env_or("FEED_SLOT_REGIONAL", defaults.slots.regional),
            },
            discovery_window_days: env_or(
                "FEED_DISCOVERY_WINDOW_DAYS",
                defaults.discovery_window_days,
            ),
            view_window_days: env_or("FEED_VIEW_WINDOW_DAYS", defaults.view_window_days),
            view_cap: env_or("FEED_VIEW_CAP", defaults.view_cap),
            city_window_days: env_or("FEED_CITY_WINDOW_DAYS", defaults.city_window_days),
            region_window_days: env_or("FEED_REGION_WINDOW_DAYS", defaults.region_window_days),
            country_window_days: env_or(
                "FEED_COUNTRY_WINDOW_DAYS",
                defaults.country_window_days,
            ),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let slots = self.slots;
        let weights = [slots.discovery, slots.following, slots.friends, slots.regional];
        if weights.iter().any(|w| *w > MAX_SLOT_WEIGHT) {
            anyhow::bail!("FEED_SLOT_* weights must not exceed {}", MAX_SLOT_WEIGHT);
        }
        if weights.iter().all(|w| *w == 0) {
            anyhow::bail!("at least one FEED_SLOT_* weight must be positive");
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            anyhow::bail!(
                "FEED_DEFAULT_PAGE_SIZE must be within 1..={}",
                self.max_page_size
            );
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("APP_PORT", 8010),
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL environment variable not set")?,
            max_connections: env_or("DB_MAX_CONNECTIONS", default_max_connections()),
            acquire_timeout_secs: env_or(
                "DB_ACQUIRE_TIMEOUT_SECS",
                default_acquire_timeout_secs(),
            ),
            run_migrations: env_or("DB_RUN_MIGRATIONS", default_run_migrations()),
        };

        let feed = FeedConfig::from_env();
        feed.validate().context("invalid feed configuration")?;

        Ok(Config {
            app,
            database,
            feed,
        })
    }
}
