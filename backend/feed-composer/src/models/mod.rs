use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Post primary key
pub type PostId = i64;

/// A user as seen by the feed. `username` is the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub username: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            city: None,
            region: None,
            country: None,
        }
    }

    pub fn with_location(
        mut self,
        city: Option<&str>,
        region: Option<&str>,
        country: Option<&str>,
    ) -> Self {
        self.city = city.map(str::to_string);
        self.region = region.map(str::to_string);
        self.country = country.map(str::to_string);
        self
    }

    pub fn has_location(&self) -> bool {
        self.city.is_some() || self.region.is_some() || self.country.is_some()
    }
}

/// Presentational profile fields, only used by enrichment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Status label on a directed relationship edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    Pending,
    Accepted,
    /// One-way follow. Stored as `none` by older writers.
    OneWay,
    Declined,
    Blocked,
}

impl RelationshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::OneWay => "one_way",
            Self::Declined => "declined",
            Self::Blocked => "blocked",
        }
    }

    /// Parse a stored status label. Unknown labels yield `None` and are ignored by the resolver.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "one_way" | "one-way" | "none" | "following" => Some(Self::OneWay),
            "declined" | "rejected" => Some(Self::Declined),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

impl std::fmt::Display for RelationshipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Directed relationship edge (initiator -> target)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub initiator: String,
    pub target: String,
    pub status: RelationshipStatus,
}

impl Relationship {
    pub fn new(
        initiator: impl Into<String>,
        target: impl Into<String>,
        status: RelationshipStatus,
    ) -> Self {
        Self {
            initiator: initiator.into(),
            target: target.into(),
            status,
        }
    }
}

/// Post record. Engagement counters may change between requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: PostId,
    pub author: String,
    pub content: String,
    pub category: Option<String>,
    /// Denormalized JSON metadata (tags and similar), parsed during enrichment
    pub metadata: Option<String>,
    pub reply_to: Option<PostId>,
    pub likes: i64,
    pub hearts: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// likes + hearts + comments. Ranks the friends source.
    pub fn engagement_score(&self) -> i64 {
        self.likes + self.hearts + self.comment_count
    }

    /// likes + hearts. Ranks the regional source.
    pub fn popularity(&self) -> i64 {
        self.likes + self.hearts
    }
}

/// A single view of a post. Duplicates are harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ViewEvent {
    pub username: String,
    pub post_id: PostId,
    pub viewed_at: DateTime<Utc>,
}

/// Provenance label of a candidate: the first source that supplied it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Random,
    Following,
    Friends,
    RegionalCity,
    RegionalRegion,
    RegionalCountry,
    Fallback,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Following => "following",
            Self::Friends => "friends",
            Self::RegionalCity => "regional_city",
            Self::RegionalRegion => "regional_region",
            Self::RegionalCountry => "regional_country",
            Self::Fallback => "fallback",
        }
    }

    /// Discovery-origin: sampled from the recent pool rather than a personalized source
    pub fn is_discovery(&self) -> bool {
        matches!(self, Self::Random | Self::Fallback)
    }

    pub fn is_regional(&self) -> bool {
        matches!(
            self,
            Self::RegionalCity | Self::RegionalRegion | Self::RegionalCountry
        )
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A post tagged with the source that supplied it. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub post: Post,
    pub source: SourceKind,
}

impl Candidate {
    pub fn new(post: Post, source: SourceKind) -> Self {
        Self { post, source }
    }

    pub fn post_id(&self) -> PostId {
        self.post.id
    }
}

/// Post ids a source must not return: recent views plus everything already chosen.
///
/// Owned by the composer and threaded through the fetchers in order; fetchers only
/// ever see it by shared reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    ids: HashSet<PostId>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: PostId) -> bool {
        self.ids.contains(&id)
    }

    pub fn insert(&mut self, id: PostId) -> bool {
        self.ids.insert(id)
    }

    /// Merge the ids of freshly selected candidates
    pub fn absorb(&mut self, candidates: &[Candidate]) {
        self.ids.extend(candidates.iter().map(Candidate::post_id));
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PostId> {
        self.ids.iter()
    }

    /// Snapshot for binding into a query
    pub fn to_vec(&self) -> Vec<PostId> {
        self.ids.iter().copied().collect()
    }
}

impl FromIterator<PostId> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = PostId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl Extend<PostId> for ExclusionSet {
    fn extend<I: IntoIterator<Item = PostId>>(&mut self, iter: I) {
        self.ids.extend(iter);
    }
}

/// Realized composition: candidate counts keyed by source kind.
///
/// Counts follow first attribution; they say nothing about positions in the shuffled page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Composition(BTreeMap<SourceKind, usize>);

impl Composition {
    pub fn from_candidates(candidates: &[Candidate]) -> Self {
        let mut counts = BTreeMap::new();
        for candidate in candidates {
            *counts.entry(candidate.source).or_insert(0) += 1;
        }
        Self(counts)
    }

    pub fn count(&self, source: SourceKind) -> usize {
        self.0.get(&source).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    /// Candidates that came from the random pool, either directly or as a fallback
    pub fn discovery_total(&self) -> usize {
        self.0
            .iter()
            .filter(|(source, _)| source.is_discovery())
            .map(|(_, count)| count)
            .sum()
    }

    pub fn regional_total(&self) -> usize {
        self.0
            .iter()
            .filter(|(source, _)| source.is_regional())
            .map(|(_, count)| count)
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SourceKind, &usize)> {
        self.0.iter()
    }
}

/// One composed page. Built fresh per request, never cached.
#[derive(Debug, Clone)]
pub struct FeedPage {
    pub candidates: Vec<Candidate>,
    pub composition: Composition,
    /// True when composition failed as a whole and the page is discovery-only
    pub composition_fallback: bool,
}

impl FeedPage {
    pub fn new(candidates: Vec<Candidate>, composition_fallback: bool) -> Self {
        let composition = Composition::from_candidates(&candidates);
        Self {
            candidates,
            composition,
            composition_fallback,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn post_ids(&self) -> Vec<PostId> {
        self.candidates.iter().map(Candidate::post_id).collect()
    }
}

/// Enriched post for feed and browse responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: PostId,
    pub user_id: String,
    pub content: String,
    pub created_at: i64,
    pub like_count: i64,
    pub heart_count: i64,
    pub comment_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<PostId>,
    /// Source that supplied the post; absent for non-personalized listings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_avatar: Option<String>,
}

/// Feed response body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub posts: Vec<FeedItem>,
    pub composition: Composition,
    /// Always true: exhaustion is not distinguished from abundance
    pub has_more: bool,
    pub page_size: usize,
}

/// Browse response body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListResponse {
    pub posts: Vec<FeedItem>,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}
