//! Feed composition
//!
//! Blends the four sources into one page:
//! 1. Each source, in slot order, fetches its budgeted share against a running exclusion set
//! 2. A degraded source may be backfilled from discovery (see `fallback_tag`)
//! 3. Any shortfall left after all sources is topped up from discovery once, then
//!    offered back to the personalized sources against the running exclusion set
//! 4. The page is shuffled, truncated to the page size and its composition counted
//!
//! If the pipeline itself breaks (a fetcher panics or violates its contract) the
//! partial result is dropped and the page is rebuilt from discovery alone.

use futures::FutureExt;
use rand::seq::SliceRandom;
use rand::RngCore;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::sources::{
    DegradeReason, DiscoveryFetcher, FetchContext, FollowingFetcher, FriendsFetcher, RegionTier,
    RegionalFetcher, Slot, SourceFetcher,
};
use crate::config::{FeedConfig, SlotWeights};
use crate::metrics;
use crate::models::{Candidate, ExclusionSet, FeedPage, PostId, SourceKind};
use crate::repository::{ContentRepository, LocationField};

/// Unexpected failure spanning the whole pipeline
#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("{source_name} source returned {returned} candidates for {requested} slots")]
    OverReturned {
        source_name: &'static str,
        requested: usize,
        returned: usize,
    },

    #[error("{source_name} source returned excluded or duplicate post {post_id}")]
    ExclusionViolated {
        source_name: &'static str,
        post_id: PostId,
    },

    #[error("source panicked: {0}")]
    Panicked(String),
}

/// Per-source slot counts for one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAllocation {
    pub discovery: usize,
    pub following: usize,
    pub friends: usize,
    pub regional: usize,
}

impl SlotAllocation {
    pub fn for_slot(&self, slot: Slot) -> usize {
        match slot {
            Slot::Discovery => self.discovery,
            Slot::Following => self.following,
            Slot::Friends => self.friends,
            Slot::Regional => self.regional,
        }
    }

    pub fn total(&self) -> usize {
        self.discovery + self.following + self.friends + self.regional
    }
}

/// Slot budget, scaled to any page size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotBudget {
    weights: SlotWeights,
}

impl SlotBudget {
    pub fn new(weights: SlotWeights) -> Self {
        Self { weights }
    }

    /// Largest-remainder apportionment of `page_size` over the weights.
    /// Ties go to the earlier slot. The canonical 4/3/2/1 budget maps a page of 10 exactly.
    pub fn allocate(&self, page_size: usize) -> SlotAllocation {
        let weights = [
            self.weights.discovery,
            self.weights.following,
            self.weights.friends,
            self.weights.regional,
        ];
        // u128 keeps weight * page_size exact for any configured weights
        let total_weight: u128 = weights.iter().map(|w| *w as u128).sum();
        if total_weight == 0 {
            return SlotAllocation {
                discovery: page_size,
                following: 0,
                friends: 0,
                regional: 0,
            };
        }

        let mut counts = [0usize; 4];
        let mut remainders = [(0u128, 0usize); 4];
        for (i, weight) in weights.iter().enumerate() {
            let scaled = *weight as u128 * page_size as u128;
            // at most page_size
            counts[i] = (scaled / total_weight) as usize;
            remainders[i] = (scaled % total_weight, i);
        }

        let assigned: usize = counts.iter().sum();
        // larger remainder first, earlier slot on ties
        remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        for (_, i) in remainders.iter().take(page_size - assigned) {
            counts[*i] += 1;
        }

        SlotAllocation {
            discovery: counts[0],
            following: counts[1],
            friends: counts[2],
            regional: counts[3],
        }
    }
}

/// Which discovery tag, if any, backfills a degraded source
fn fallback_tag(slot: Slot, reason: DegradeReason) -> Option<SourceKind> {
    match (slot, reason) {
        (Slot::Discovery, _) => None,
        (Slot::Following | Slot::Friends, DegradeReason::ShortPool) => None,
        (Slot::Following | Slot::Friends, _) => Some(SourceKind::Random),
        (Slot::Regional, _) => Some(SourceKind::Fallback),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Orchestrates the fetchers for one request
pub struct FeedComposer {
    discovery: Arc<DiscoveryFetcher>,
    sources: Vec<Arc<dyn SourceFetcher>>,
    budget: SlotBudget,
}

impl FeedComposer {
    /// Custom source list. `sources` is consulted in the given order.
    pub fn new(
        discovery: Arc<DiscoveryFetcher>,
        sources: Vec<Arc<dyn SourceFetcher>>,
        budget: SlotBudget,
    ) -> Self {
        Self {
            discovery,
            sources,
            budget,
        }
    }

    /// Discovery, following, friends, regional over one repository
    pub fn from_config(repo: Arc<dyn ContentRepository>, config: &FeedConfig) -> Self {
        let discovery = Arc::new(DiscoveryFetcher::new(
            repo.clone(),
            config.discovery_window_days,
        ));
        let regional = RegionalFetcher::new(
            repo.clone(),
            vec![
                RegionTier::new(LocationField::City, config.city_window_days),
                RegionTier::new(LocationField::Region, config.region_window_days),
                RegionTier::new(LocationField::Country, config.country_window_days),
            ],
        );

        let sources: Vec<Arc<dyn SourceFetcher>> = vec![
            discovery.clone(),
            Arc::new(FollowingFetcher::new(repo.clone())),
            Arc::new(FriendsFetcher::new(repo)),
            Arc::new(regional),
        ];

        Self::new(discovery, sources, SlotBudget::new(config.slots))
    }

    /// Compose one page. Never fails; the worst case is a discovery-only page.
    pub async fn compose(
        &self,
        ctx: &FetchContext<'_>,
        exclusion: ExclusionSet,
        page_size: usize,
        rng: &mut (dyn RngCore + Send),
    ) -> FeedPage {
        let pipeline = AssertUnwindSafe(self.run_pipeline(ctx, exclusion.clone(), page_size, rng))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(CompositionError::Panicked(panic_message(payload))));

        let (mut candidates, composition_fallback) = match pipeline {
            Ok(candidates) => (candidates, false),
            Err(e) => {
                warn!(
                    user_id = %ctx.user.username,
                    error = %e,
                    "Composition failed, falling back to discovery-only page"
                );
                metrics::record_composition_fallback();
                let (candidates, _) = self
                    .discovery
                    .sample(ctx, &exclusion, page_size, SourceKind::Random, rng)
                    .await
                    .into_parts();
                (candidates, true)
            }
        };

        candidates.shuffle(rng);
        candidates.truncate(page_size);

        let page = FeedPage::new(candidates, composition_fallback);
        info!(
            user_id = %ctx.user.username,
            page_size,
            delivered = page.len(),
            discovery = page.composition.discovery_total(),
            following = page.composition.count(SourceKind::Following),
            friends = page.composition.count(SourceKind::Friends),
            regional = page.composition.regional_total(),
            fallback = composition_fallback,
            "Feed composed"
        );
        page
    }

    async fn run_pipeline(
        &self,
        ctx: &FetchContext<'_>,
        mut running: ExclusionSet,
        page_size: usize,
        rng: &mut (dyn RngCore + Send),
    ) -> Result<Vec<Candidate>, CompositionError> {
        let allocation = self.budget.allocate(page_size);
        let mut collected: Vec<Candidate> = Vec::with_capacity(page_size);

        debug!(
            user_id = %ctx.user.username,
            discovery = allocation.discovery,
            following = allocation.following,
            friends = allocation.friends,
            regional = allocation.regional,
            excluded = running.len(),
            "Slot allocation"
        );

        for fetcher in &self.sources {
            let slot = fetcher.slot();
            let want = allocation.for_slot(slot);
            if want == 0 {
                continue;
            }

            let outcome = fetcher.fetch(ctx, &running, want, rng).await;
            let (supplied, degraded) = outcome.into_parts();
            Self::admit(slot.as_str(), &supplied, &running, want)?;
            running.absorb(&supplied);
            let supplied_count = supplied.len();
            collected.extend(supplied);

            let Some(reason) = degraded else {
                continue;
            };
            metrics::record_source_degraded(slot.as_str(), reason.as_str());
            debug!(
                user_id = %ctx.user.username,
                source = slot.as_str(),
                reason = reason.as_str(),
                requested = want,
                supplied = supplied_count,
                "Source degraded"
            );

            if let Some(tag) = fallback_tag(slot, reason) {
                let shortfall = want - supplied_count;
                let (backfill, _) = self
                    .discovery
                    .sample(ctx, &running, shortfall, tag, rng)
                    .await
                    .into_parts();
                Self::admit("discovery", &backfill, &running, shortfall)?;
                running.absorb(&backfill);
                collected.extend(backfill);
            }
        }

        if collected.len() < page_size {
            let shortfall = page_size - collected.len();
            let (top_up, _) = self
                .discovery
                .sample(ctx, &running, shortfall, SourceKind::Random, rng)
                .await
                .into_parts();
            Self::admit("discovery", &top_up, &running, shortfall)?;
            debug!(
                user_id = %ctx.user.username,
                requested = shortfall,
                supplied = top_up.len(),
                "Top-up from discovery"
            );
            running.absorb(&top_up);
            collected.extend(top_up);
        }

        // Discovery is exhausted; personalized sources may still hold posts beyond their slot
        for fetcher in &self.sources {
            let slot = fetcher.slot();
            if collected.len() >= page_size || slot == Slot::Discovery {
                continue;
            }
            let shortfall = page_size - collected.len();
            let (extra, _) = fetcher.fetch(ctx, &running, shortfall, rng).await.into_parts();
            Self::admit(slot.as_str(), &extra, &running, shortfall)?;
            if !extra.is_empty() {
                debug!(
                    user_id = %ctx.user.username,
                    source = slot.as_str(),
                    requested = shortfall,
                    supplied = extra.len(),
                    "Second pass"
                );
            }
            running.absorb(&extra);
            collected.extend(extra);
        }

        Ok(collected)
    }

    /// Enforce the fetcher contract before anything is merged
    fn admit(
        source_name: &'static str,
        supplied: &[Candidate],
        running: &ExclusionSet,
        requested: usize,
    ) -> Result<(), CompositionError> {
        if supplied.len() > requested {
            return Err(CompositionError::OverReturned {
                source_name,
                requested,
                returned: supplied.len(),
            });
        }

        let mut seen = HashSet::with_capacity(supplied.len());
        for candidate in supplied {
            let id = candidate.post_id();
            if running.contains(id) || !seen.insert(id) {
                return Err(CompositionError::ExclusionViolated {
                    source_name,
                    post_id: id,
                });
            }
        }
        Ok(())
    }
}
