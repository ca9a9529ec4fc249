use chrono::{DateTime, Utc};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::browse::BrowseParams;
use super::composer::FeedComposer;
use super::enrichment::{authors_of, enrich_candidates, enrich_posts};
use super::relationships::RelationshipResolver;
use super::sources::FetchContext;
use super::view_history::ViewHistoryTracker;
use crate::config::FeedConfig;
use crate::error::{FeedError, FeedResult};
use crate::metrics;
use crate::models::{FeedItem, FeedPage, Post, PostId, Profile};
use crate::repository::ContentRepository;

/// One personalized page request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedRequest {
    pub user_id: String,
    /// Defaults to the configured page size
    pub page_size: Option<usize>,
    /// Ids the client already holds (previous pages); excluded on top of view history
    pub exclude: Vec<PostId>,
}

/// Entry point for the feed API: personalized pages, view recording and listings
pub struct FeedService {
    repo: Arc<dyn ContentRepository>,
    resolver: RelationshipResolver,
    history: ViewHistoryTracker,
    composer: FeedComposer,
    config: FeedConfig,
}

impl FeedService {
    pub fn new(repo: Arc<dyn ContentRepository>, config: FeedConfig) -> Self {
        Self {
            resolver: RelationshipResolver::new(repo.clone()),
            history: ViewHistoryTracker::new(
                repo.clone(),
                config.view_window_days,
                config.view_cap,
            ),
            composer: FeedComposer::from_config(repo.clone(), &config),
            repo,
            config,
        }
    }

    /// Swap in a custom composer (tests wire failing or stub sources this way)
    pub fn with_composer(mut self, composer: FeedComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn ContentRepository> {
        &self.repo
    }

    fn page_size(&self, requested: Option<usize>) -> FeedResult<usize> {
        let page_size = requested.unwrap_or(self.config.default_page_size);
        if page_size == 0 || page_size > self.config.max_page_size {
            return Err(FeedError::InvalidRequest(format!(
                "page_size must be within 1..={}",
                self.config.max_page_size
            )));
        }
        Ok(page_size)
    }

    /// Compose one page for `request.user_id` at `now`.
    ///
    /// Fails only on invalid input, an unknown user, or an unreachable store while
    /// resolving the user and their relationships. Everything past that point degrades.
    pub async fn build_feed(
        &self,
        request: &FeedRequest,
        now: DateTime<Utc>,
        rng: &mut (dyn RngCore + Send),
    ) -> FeedResult<FeedPage> {
        let page_size = self.page_size(request.page_size)?;
        let user_id = request.user_id.trim();
        if user_id.is_empty() {
            return Err(FeedError::InvalidRequest("user_id is required".to_string()));
        }

        let user = self
            .repo
            .fetch_user(user_id)
            .await?
            .ok_or_else(|| FeedError::UserNotFound(user_id.to_string()))?;

        let graph = self.resolver.resolve(&user.username).await?;

        let mut exclusion = self.history.recent_views(&user.username, now).await;
        exclusion.extend(request.exclude.iter().copied());

        let ctx = FetchContext {
            user: &user,
            graph: &graph,
            now,
        };
        let page = self.composer.compose(&ctx, exclusion, page_size, rng).await;

        metrics::record_composition(&page.composition);
        info!(
            user_id = %user.username,
            friends = graph.friends.len(),
            following = graph.following.len(),
            delivered = page.len(),
            requested = page_size,
            "Feed built"
        );
        Ok(page)
    }

    /// Profiles for the given posts' authors. Lookup failure just drops author fields.
    async fn profiles_for<'a>(
        &self,
        posts: impl IntoIterator<Item = &'a Post>,
    ) -> HashMap<String, Profile> {
        let authors = authors_of(posts);
        if authors.is_empty() {
            return HashMap::new();
        }

        match self.repo.fetch_profiles(&authors).await {
            Ok(profiles) => profiles
                .into_iter()
                .map(|p| (p.username.clone(), p))
                .collect(),
            Err(e) => {
                warn!(
                    authors = authors.len(),
                    error = %e,
                    "Profile lookup failed, omitting author fields"
                );
                HashMap::new()
            }
        }
    }

    pub async fn enrich_page(&self, page: &FeedPage) -> Vec<FeedItem> {
        let profiles = self
            .profiles_for(page.candidates.iter().map(|c| &c.post))
            .await;
        enrich_candidates(&page.candidates, &profiles)
    }

    /// Record that `user_id` viewed `post_ids`; unknown post ids are skipped
    pub async fn record_views(
        &self,
        user_id: &str,
        post_ids: &[PostId],
        now: DateTime<Utc>,
    ) -> FeedResult<usize> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(FeedError::InvalidRequest("user_id is required".to_string()));
        }
        if self.repo.fetch_user(user_id).await?.is_none() {
            return Err(FeedError::UserNotFound(user_id.to_string()));
        }
        self.history.record(user_id, post_ids, now).await
    }

    /// Non-personalized listing, newest first
    pub async fn browse(
        &self,
        params: BrowseParams,
    ) -> FeedResult<(Vec<FeedItem>, usize, usize)> {
        let query = params.into_query()?;
        let posts = self.repo.browse_posts(&query).await?;
        let profiles = self.profiles_for(&posts).await;
        Ok((enrich_posts(&posts, &profiles), query.limit, query.offset))
    }
}
