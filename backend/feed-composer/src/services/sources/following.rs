use async_trait::async_trait;
use rand::RngCore;
use std::sync::Arc;
use tracing::warn;

use super::{DegradeReason, FetchContext, FetchOutcome, Slot, SourceFetcher};
use crate::models::{Candidate, ExclusionSet, SourceKind};
use crate::repository::{ContentRepository, PostFilter, PostOrder, PostQuery};

/// Following - newest posts from accounts the user follows one-way
pub struct FollowingFetcher {
    repo: Arc<dyn ContentRepository>,
}

impl FollowingFetcher {
    pub fn new(repo: Arc<dyn ContentRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl SourceFetcher for FollowingFetcher {
    fn slot(&self) -> Slot {
        Slot::Following
    }

    async fn fetch(
        &self,
        ctx: &FetchContext<'_>,
        exclusion: &ExclusionSet,
        count: usize,
        _rng: &mut (dyn RngCore + Send),
    ) -> FetchOutcome {
        if ctx.graph.following.is_empty() {
            return FetchOutcome::degraded(DegradeReason::NoConnections);
        }
        if count == 0 {
            return FetchOutcome::Supplied(Vec::new());
        }

        let query = PostQuery {
            filter: PostFilter::ByAuthors(ctx.graph.following.iter().cloned().collect()),
            order: PostOrder::Newest,
            limit: count,
        };

        match self.repo.fetch_posts(&query, exclusion).await {
            Ok(posts) => {
                let candidates: Vec<Candidate> = posts
                    .into_iter()
                    .take(count)
                    .map(|post| Candidate::new(post, SourceKind::Following))
                    .collect();
                FetchOutcome::from_partial(candidates, count, DegradeReason::ShortPool)
            }
            Err(e) => {
                warn!(
                    user_id = %ctx.user.username,
                    following = ctx.graph.following.len(),
                    error = %e,
                    "Following query failed"
                );
                FetchOutcome::degraded(DegradeReason::QueryFailed)
            }
        }
    }
}
