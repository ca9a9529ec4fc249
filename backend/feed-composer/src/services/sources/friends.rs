use async_trait::async_trait;
use rand::RngCore;
use std::sync::Arc;
use tracing::warn;

use super::{DegradeReason, FetchContext, FetchOutcome, Slot, SourceFetcher};
use crate::models::{Candidate, ExclusionSet, SourceKind};
use crate::repository::{ContentRepository, PostFilter, PostOrder, PostQuery};

/// Friends - most engaging posts from mutual connections
///
/// Engagement = likes + hearts + comment count, ties broken newest first.
pub struct FriendsFetcher {
    repo: Arc<dyn ContentRepository>,
}

impl FriendsFetcher {
    pub fn new(repo: Arc<dyn ContentRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl SourceFetcher for FriendsFetcher {
    fn slot(&self) -> Slot {
        Slot::Friends
    }

    async fn fetch(
        &self,
        ctx: &FetchContext<'_>,
        exclusion: &ExclusionSet,
        count: usize,
        _rng: &mut (dyn RngCore + Send),
    ) -> FetchOutcome {
        if ctx.graph.friends.is_empty() {
            return FetchOutcome::degraded(DegradeReason::NoConnections);
        }
        if count == 0 {
            return FetchOutcome::Supplied(Vec::new());
        }

        let query = PostQuery {
            filter: PostFilter::ByAuthors(ctx.graph.friends.iter().cloned().collect()),
            order: PostOrder::Engagement,
            limit: count,
        };

        match self.repo.fetch_posts(&query, exclusion).await {
            Ok(posts) => {
                let candidates: Vec<Candidate> = posts
                    .into_iter()
                    .take(count)
                    .map(|post| Candidate::new(post, SourceKind::Friends))
                    .collect();
                FetchOutcome::from_partial(candidates, count, DegradeReason::ShortPool)
            }
            Err(e) => {
                warn!(
                    user_id = %ctx.user.username,
                    friends = ctx.graph.friends.len(),
                    error = %e,
                    "Friends query failed"
                );
                FetchOutcome::degraded(DegradeReason::QueryFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::repository::InMemoryContentRepository;
    use crate::services::relationships::SocialGraph;
    use crate::services::sources::test_support::scored;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[tokio::test]
    async fn test_ranked_by_engagement_then_recency() {
        let repo = Arc::new(InMemoryContentRepository::new());
        repo.insert_post(scored(1, "ann", 48, 2, 0)).await;
        // same score as #3 but older
        repo.insert_post(scored(2, "ann", 20, 5, 5)).await;
        repo.insert_post(scored(3, "bob", 5, 10, 0)).await;
        repo.insert_post(scored(4, "bob", 1, 50, 7)).await;

        let fetcher = FriendsFetcher::new(repo);
        let user = User::new("me");
        let graph = SocialGraph {
            friends: ["ann".to_string(), "bob".to_string()].into_iter().collect(),
            ..SocialGraph::default()
        };
        let ctx = FetchContext {
            user: &user,
            graph: &graph,
            now: Utc::now(),
        };
        let exclusion: ExclusionSet = [1].into_iter().collect();
        let mut rng = StdRng::seed_from_u64(9);

        let outcome = fetcher.fetch(&ctx, &exclusion, 5, &mut rng).await;

        let ids: Vec<i64> = outcome.candidates().iter().map(|c| c.post_id()).collect();
        assert_eq!(ids, vec![4, 3, 2]);
        assert!(matches!(
            outcome,
            FetchOutcome::Degraded {
                reason: DegradeReason::ShortPool,
                ..
            }
        ));
    }
}
