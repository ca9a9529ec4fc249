use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{FeedError, FeedResult};
use crate::metrics;
use crate::models::{ExclusionSet, PostId, ViewEvent};
use crate::repository::ContentRepository;

/// Recent-view window used to exclude already seen posts.
///
/// Exclusion is a quality optimization: lookup failures degrade to an empty set.
#[derive(Clone)]
pub struct ViewHistoryTracker {
    repo: Arc<dyn ContentRepository>,
    window: Duration,
    cap: usize,
}

impl ViewHistoryTracker {
    pub fn new(repo: Arc<dyn ContentRepository>, window_days: i64, cap: usize) -> Self {
        Self {
            repo,
            window: Duration::days(window_days),
            cap,
        }
    }

    /// Post ids viewed in the window, at most `cap` most recent events
    pub async fn recent_views(&self, username: &str, now: DateTime<Utc>) -> ExclusionSet {
        match self
            .repo
            .fetch_recent_views(username, now - self.window, self.cap)
            .await
        {
            Ok(mut events) => {
                // most-recent-first before truncation, whatever the backend returned
                events.sort_by(|a, b| b.viewed_at.cmp(&a.viewed_at));
                events.truncate(self.cap);
                let exclusion: ExclusionSet = events.into_iter().map(|e| e.post_id).collect();
                debug!(user_id = %username, excluded = exclusion.len(), "Loaded view history");
                exclusion
            }
            Err(e) => {
                warn!(
                    user_id = %username,
                    error = %e,
                    "View history unavailable, continuing without exclusions"
                );
                metrics::record_view_history_failure();
                ExclusionSet::new()
            }
        }
    }

    /// Append view events for posts that exist. Returns how many were recorded.
    pub async fn record(
        &self,
        username: &str,
        post_ids: &[PostId],
        now: DateTime<Utc>,
    ) -> FeedResult<usize> {
        let unique: Vec<PostId> = {
            let mut seen = HashSet::new();
            post_ids.iter().copied().filter(|id| seen.insert(*id)).collect()
        };
        if unique.is_empty() {
            return Ok(0);
        }

        let known: HashSet<PostId> = self
            .repo
            .fetch_posts_by_ids(&unique)
            .await
            .map_err(FeedError::from)?
            .into_iter()
            .map(|p| p.id)
            .collect();

        let events: Vec<ViewEvent> = unique
            .into_iter()
            .filter(|id| known.contains(id))
            .map(|post_id| ViewEvent {
                username: username.to_string(),
                post_id,
                viewed_at: now,
            })
            .collect();

        self.repo.record_views(&events).await.map_err(FeedError::from)?;
        Ok(events.len())
    }
}
