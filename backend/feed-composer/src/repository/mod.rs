mod memory;
mod postgres;

pub use memory::InMemoryContentRepository;
pub use postgres::PgContentRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{ExclusionSet, Post, PostId, Profile, Relationship, User, ViewEvent};

/// Errors raised by a content repository
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Transport, pool or timeout failure
    #[error("repository unavailable: {0}")]
    Unavailable(String),

    /// The query itself failed (bad row, constraint, decode)
    #[error("repository query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => RepositoryError::Unavailable(err.to_string()),
            other => RepositoryError::Query(other.to_string()),
        }
    }
}

/// Geographic attribute used by the regional tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationField {
    City,
    Region,
    Country,
}

impl LocationField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::City => "city",
            Self::Region => "region",
            Self::Country => "country",
        }
    }

    pub fn value_for<'a>(&self, user: &'a User) -> Option<&'a str> {
        match self {
            Self::City => user.city.as_deref(),
            Self::Region => user.region.as_deref(),
            Self::Country => user.country.as_deref(),
        }
    }
}

/// Which posts are eligible
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostFilter {
    /// Everything created strictly after the timestamp
    CreatedSince(DateTime<Utc>),
    /// Everything written by one of the authors
    ByAuthors(Vec<String>),
    /// Authors whose location attribute matches, newer than `since`, never `exclude_author`
    ByLocation {
        field: LocationField,
        value: String,
        since: DateTime<Utc>,
        exclude_author: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOrder {
    /// created_at desc
    Newest,
    /// likes + hearts + comment_count desc, then newest
    Engagement,
    /// likes + hearts desc, then newest
    Popularity,
}

/// fetch-posts(predicate, order, limit); the exclusion set travels alongside
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    pub filter: PostFilter,
    pub order: PostOrder,
    pub limit: usize,
}

/// Non-personalized listing filters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowseQuery {
    /// Case-insensitive substring of the content
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

/// Read-mostly content store consumed by the feed core.
/// Both PgContentRepository and InMemoryContentRepository implement this.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Fetch a user by username
    async fn fetch_user(&self, username: &str) -> Result<Option<User>, RepositoryError>;

    /// Every edge touching the user, in either direction
    async fn fetch_relationships(&self, username: &str)
        -> Result<Vec<Relationship>, RepositoryError>;

    /// View events newer than `since`, most recent first, at most `cap`
    async fn fetch_recent_views(
        &self,
        username: &str,
        since: DateTime<Utc>,
        cap: usize,
    ) -> Result<Vec<ViewEvent>, RepositoryError>;

    /// Posts matching the query whose ids are not in `exclude`
    async fn fetch_posts(
        &self,
        query: &PostQuery,
        exclude: &ExclusionSet,
    ) -> Result<Vec<Post>, RepositoryError>;

    /// Ids of every post matching `filter` and not in `exclude`, ascending.
    /// Discovery samples over this full set.
    async fn fetch_post_ids(
        &self,
        filter: &PostFilter,
        exclude: &ExclusionSet,
    ) -> Result<Vec<PostId>, RepositoryError>;

    /// Append view events (advisory, duplicates allowed)
    async fn record_views(&self, events: &[ViewEvent]) -> Result<(), RepositoryError>;

    /// Filtered listing, newest first
    async fn browse_posts(&self, query: &BrowseQuery) -> Result<Vec<Post>, RepositoryError>;

    /// Profiles for the given authors; unknown names are skipped
    async fn fetch_profiles(&self, usernames: &[String]) -> Result<Vec<Profile>, RepositoryError>;

    /// Posts by id, in no particular order; unknown ids are skipped
    async fn fetch_posts_by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>, RepositoryError>;

    /// Health check (optional)
    async fn health_check(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
