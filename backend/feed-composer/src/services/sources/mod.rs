mod discovery;
mod following;
mod friends;
mod regional;

pub use discovery::DiscoveryFetcher;
pub use following::FollowingFetcher;
pub use friends::FriendsFetcher;
pub use regional::{RegionTier, RegionalFetcher};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;

use super::relationships::SocialGraph;
use crate::models::{Candidate, ExclusionSet, User};

/// Budget slot a fetcher serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Discovery,
    Following,
    Friends,
    Regional,
}

impl Slot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Discovery => "discovery",
            Slot::Following => "following",
            Slot::Friends => "friends",
            Slot::Regional => "regional",
        }
    }
}

/// Why a fetcher could not fill its count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradeReason {
    /// The user has no connections of the kind this source needs
    NoConnections,
    /// The user has no location attribute
    NoLocation,
    /// The eligible pool was smaller than requested
    ShortPool,
    /// The fetcher's own query failed
    QueryFailed,
}

impl DegradeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradeReason::NoConnections => "no_connections",
            DegradeReason::NoLocation => "no_location",
            DegradeReason::ShortPool => "short_pool",
            DegradeReason::QueryFailed => "query_failed",
        }
    }
}

/// Result of one fetch. Fetchers never fail; they report degradation instead and
/// leave the fallback decision to the composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Supplied(Vec<Candidate>),
    Degraded {
        partial: Vec<Candidate>,
        reason: DegradeReason,
    },
}

impl FetchOutcome {
    /// Supplied when `count` was reached, otherwise degraded with `shortfall_reason`
    pub fn from_partial(
        candidates: Vec<Candidate>,
        count: usize,
        shortfall_reason: DegradeReason,
    ) -> Self {
        if candidates.len() >= count {
            FetchOutcome::Supplied(candidates)
        } else {
            FetchOutcome::Degraded {
                partial: candidates,
                reason: shortfall_reason,
            }
        }
    }

    pub fn degraded(reason: DegradeReason) -> Self {
        FetchOutcome::Degraded {
            partial: Vec::new(),
            reason,
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        match self {
            FetchOutcome::Supplied(candidates) => candidates,
            FetchOutcome::Degraded { partial, .. } => partial,
        }
    }

    pub fn into_parts(self) -> (Vec<Candidate>, Option<DegradeReason>) {
        match self {
            FetchOutcome::Supplied(candidates) => (candidates, None),
            FetchOutcome::Degraded { partial, reason } => (partial, Some(reason)),
        }
    }
}

/// Per-request inputs shared by every fetcher
#[derive(Debug, Clone, Copy)]
pub struct FetchContext<'a> {
    pub user: &'a User,
    pub graph: &'a SocialGraph,
    /// Request time; every age window is measured from here
    pub now: DateTime<Utc>,
}

/// One content source: up to `count` candidates, none in `exclusion`
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    fn slot(&self) -> Slot;

    async fn fetch(
        &self,
        ctx: &FetchContext<'_>,
        exclusion: &ExclusionSet,
        count: usize,
        rng: &mut (dyn RngCore + Send),
    ) -> FetchOutcome;
}
