use chrono::{DateTime, Utc};

use crate::error::{FeedError, FeedResult};
use crate::repository::BrowseQuery;

pub const DEFAULT_BROWSE_LIMIT: usize = 20;
pub const MAX_BROWSE_LIMIT: usize = 100;

/// Listing filters as received from the client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowseParams {
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl BrowseParams {
    /// Validate and normalize. Limit is clamped to 1..=100, blank filters are dropped.
    pub fn into_query(self) -> FeedResult<BrowseQuery> {
        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since > until {
                return Err(FeedError::InvalidRequest(
                    "since must not be after until".to_string(),
                ));
            }
        }

        Ok(BrowseQuery {
            keyword: non_blank(self.keyword),
            category: non_blank(self.category),
            since: self.since,
            until: self.until,
            limit: self
                .limit
                .unwrap_or(DEFAULT_BROWSE_LIMIT)
                .clamp(1, MAX_BROWSE_LIMIT),
            offset: self.offset.unwrap_or(0),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
