use async_trait::async_trait;
use chrono::Duration;
use rand::RngCore;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{DegradeReason, FetchContext, FetchOutcome, Slot, SourceFetcher};
use crate::models::{Candidate, ExclusionSet, SourceKind};
use crate::repository::{ContentRepository, LocationField, PostFilter, PostOrder, PostQuery};

/// One widening step of the regional source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionTier {
    pub field: LocationField,
    pub window: Duration,
    pub tag: SourceKind,
}

impl RegionTier {
    pub fn new(field: LocationField, window_days: i64) -> Self {
        let tag = match field {
            LocationField::City => SourceKind::RegionalCity,
            LocationField::Region => SourceKind::RegionalRegion,
            LocationField::Country => SourceKind::RegionalCountry,
        };
        Self {
            field,
            window: Duration::days(window_days),
            tag,
        }
    }
}

/// Regional - popular posts from nearby authors, city then region then country.
///
/// Each tier only fills what the previous tiers left open and never re-offers a post
/// an earlier tier already picked. The remaining shortfall is reported to the composer.
pub struct RegionalFetcher {
    repo: Arc<dyn ContentRepository>,
    tiers: Vec<RegionTier>,
}

impl RegionalFetcher {
    pub fn new(repo: Arc<dyn ContentRepository>, tiers: Vec<RegionTier>) -> Self {
        Self { repo, tiers }
    }

    /// City < 3 days, region < 5 days, country < 7 days
    pub fn with_default_tiers(repo: Arc<dyn ContentRepository>) -> Self {
        Self::new(
            repo,
            vec![
                RegionTier::new(LocationField::City, 3),
                RegionTier::new(LocationField::Region, 5),
                RegionTier::new(LocationField::Country, 7),
            ],
        )
    }
}

#[async_trait]
impl SourceFetcher for RegionalFetcher {
    fn slot(&self) -> Slot {
        Slot::Regional
    }

    async fn fetch(
        &self,
        ctx: &FetchContext<'_>,
        exclusion: &ExclusionSet,
        count: usize,
        _rng: &mut (dyn RngCore + Send),
    ) -> FetchOutcome {
        if !ctx.user.has_location() {
            return FetchOutcome::degraded(DegradeReason::NoLocation);
        }

        let mut selected: Vec<Candidate> = Vec::with_capacity(count);
        let mut tier_exclusion = exclusion.clone();
        let mut query_failed = false;

        for tier in &self.tiers {
            let remaining = count.saturating_sub(selected.len());
            if remaining == 0 {
                break;
            }
            let Some(value) = tier.field.value_for(ctx.user) else {
                continue;
            };

            let query = PostQuery {
                filter: PostFilter::ByLocation {
                    field: tier.field,
                    value: value.to_string(),
                    since: ctx.now - tier.window,
                    exclude_author: ctx.user.username.clone(),
                },
                order: PostOrder::Popularity,
                limit: remaining,
            };

            match self.repo.fetch_posts(&query, &tier_exclusion).await {
                Ok(posts) => {
                    let picked: Vec<Candidate> = posts
                        .into_iter()
                        .take(remaining)
                        .map(|post| Candidate::new(post, tier.tag))
                        .collect();
                    debug!(
                        user_id = %ctx.user.username,
                        tier = tier.tag.as_str(),
                        requested = remaining,
                        supplied = picked.len(),
                        "Regional tier"
                    );
                    tier_exclusion.absorb(&picked);
                    selected.extend(picked);
                }
                Err(e) => {
                    warn!(
                        user_id = %ctx.user.username,
                        tier = tier.tag.as_str(),
                        error = %e,
                        "Regional tier query failed, widening"
                    );
                    query_failed = true;
                }
            }
        }

        let reason = if query_failed {
            DegradeReason::QueryFailed
        } else {
            DegradeReason::ShortPool
        };
        FetchOutcome::from_partial(selected, count, reason)
    }
}
