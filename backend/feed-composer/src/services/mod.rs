//! Feed core
//!
//! Relationship resolution, view history, the four content sources and the composer
//! that blends them. Everything here talks to storage through `ContentRepository` only.

pub mod browse;
pub mod composer;
pub mod enrichment;
pub mod feed;
pub mod relationships;
pub mod sources;
pub mod view_history;

pub use browse::BrowseParams;
pub use composer::{CompositionError, FeedComposer, SlotAllocation, SlotBudget};
pub use feed::{FeedRequest, FeedService};
pub use relationships::{RelationshipResolver, SocialGraph};
pub use sources::{
    DegradeReason, DiscoveryFetcher, FetchContext, FetchOutcome, FollowingFetcher,
    FriendsFetcher, RegionTier, RegionalFetcher, Slot, SourceFetcher,
};
pub use view_history::ViewHistoryTracker;
