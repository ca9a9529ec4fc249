use async_trait::async_trait;
use chrono::Duration;
use rand::seq::SliceRandom;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{DegradeReason, FetchContext, FetchOutcome, Slot, SourceFetcher};
use crate::models::{Candidate, ExclusionSet, PostId, SourceKind};
use crate::repository::{ContentRepository, PostFilter, RepositoryError};

/// Discovery - unweighted random sample of every post inside the window
///
/// Sampling happens over the ids of the whole eligible set, so the seeded rng alone
/// decides which posts are picked; only the picked rows are loaded.
pub struct DiscoveryFetcher {
    repo: Arc<dyn ContentRepository>,
    window: Duration,
}

impl DiscoveryFetcher {
    pub fn new(repo: Arc<dyn ContentRepository>, window_days: i64) -> Self {
        Self {
            repo,
            window: Duration::days(window_days),
        }
    }

    /// Sample up to `count` recent posts and tag them with `tag`.
    ///
    /// The composer also calls this directly for fallbacks and the top-up, so the
    /// provenance tag is a parameter.
    pub async fn sample(
        &self,
        ctx: &FetchContext<'_>,
        exclusion: &ExclusionSet,
        count: usize,
        tag: SourceKind,
        rng: &mut (dyn RngCore + Send),
    ) -> FetchOutcome {
        if count == 0 {
            return FetchOutcome::Supplied(Vec::new());
        }

        let filter = PostFilter::CreatedSince(ctx.now - self.window);
        let pool = match self.repo.fetch_post_ids(&filter, exclusion).await {
            Ok(pool) => pool,
            Err(e) => return Self::query_failed(ctx, tag, &e),
        };

        let picked: Vec<PostId> = pool.choose_multiple(rng, count).copied().collect();
        let mut rows: HashMap<PostId, _> = match self.repo.fetch_posts_by_ids(&picked).await {
            Ok(posts) => posts.into_iter().map(|post| (post.id, post)).collect(),
            Err(e) => return Self::query_failed(ctx, tag, &e),
        };

        // sample order, not storage order
        let candidates: Vec<Candidate> = picked
            .iter()
            .filter_map(|id| rows.remove(id))
            .map(|post| Candidate::new(post, tag))
            .collect();

        debug!(
            user_id = %ctx.user.username,
            source = tag.as_str(),
            pool = pool.len(),
            requested = count,
            supplied = candidates.len(),
            "Discovery sample"
        );

        FetchOutcome::from_partial(candidates, count, DegradeReason::ShortPool)
    }

    fn query_failed(
        ctx: &FetchContext<'_>,
        tag: SourceKind,
        error: &RepositoryError,
    ) -> FetchOutcome {
        warn!(
            user_id = %ctx.user.username,
            source = tag.as_str(),
            error = %error,
            "Discovery query failed"
        );
        FetchOutcome::degraded(DegradeReason::QueryFailed)
    }
}

#[async_trait]
impl SourceFetcher for DiscoveryFetcher {
    fn slot(&self) -> Slot {
        Slot::Discovery
    }

    async fn fetch(
        &self,
        ctx: &FetchContext<'_>,
        exclusion: &ExclusionSet,
        count: usize,
        rng: &mut (dyn RngCore + Send),
    ) -> FetchOutcome {
        self.sample(ctx, exclusion, count, SourceKind::Random, rng)
            .await
    }
}
