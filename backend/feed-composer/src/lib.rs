pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod services;

pub use config::Config;
pub use error::{AppError, FeedError, Result};

// Re-export the feed core
pub use repository::{ContentRepository, InMemoryContentRepository, PgContentRepository};
pub use services::{FeedComposer, FeedRequest, FeedService, SlotBudget};
