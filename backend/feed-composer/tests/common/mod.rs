#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use feed_composer::models::{
    ExclusionSet, Post, PostId, Profile, Relationship, RelationshipStatus, User, ViewEvent,
};
use feed_composer::repository::{
    BrowseQuery, ContentRepository, InMemoryContentRepository, PostFilter, PostQuery,
    RepositoryError,
};

pub fn post(id: PostId, author: &str, age_hours: i64, likes: i64) -> Post {
    Post {
        id,
        author: author.to_string(),
        content: format!("post {} by {}", id, author),
        category: None,
        metadata: None,
        reply_to: None,
        likes,
        hearts: 0,
        comment_count: 0,
        created_at: Utc::now() - Duration::hours(age_hours),
    }
}

/// Which operations a `FlakyRepository` fails
#[derive(Debug, Clone, Copy, Default)]
pub struct Failures {
    pub relationships: bool,
    pub views: bool,
    pub profiles: bool,
    /// Every post query
    pub posts: bool,
    /// Only author-scoped post queries (following, friends)
    pub author_posts: bool,
}

/// In-memory store that fails the selected operations with `Unavailable`
pub struct FlakyRepository {
    pub inner: Arc<InMemoryContentRepository>,
    pub failures: Failures,
}

impl FlakyRepository {
    pub fn new(inner: Arc<InMemoryContentRepository>, failures: Failures) -> Self {
        Self { inner, failures }
    }

    fn outage(what: &str) -> RepositoryError {
        RepositoryError::Unavailable(format!("{} backend timed out", what))
    }
}

#[async_trait]
impl ContentRepository for FlakyRepository {
    async fn fetch_user(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        self.inner.fetch_user(username).await
    }

    async fn fetch_relationships(
        &self,
        username: &str,
    ) -> Result<Vec<Relationship>, RepositoryError> {
        if self.failures.relationships {
            return Err(Self::outage("relationships"));
        }
        self.inner.fetch_relationships(username).await
    }

    async fn fetch_recent_views(
        &self,
        username: &str,
        since: DateTime<Utc>,
        cap: usize,
    ) -> Result<Vec<ViewEvent>, RepositoryError> {
        if self.failures.views {
            return Err(Self::outage("views"));
        }
        self.inner.fetch_recent_views(username, since, cap).await
    }

    async fn fetch_posts(
        &self,
        query: &PostQuery,
        exclude: &ExclusionSet,
    ) -> Result<Vec<Post>, RepositoryError> {
        if self.failures.posts {
            return Err(Self::outage("posts"));
        }
        if self.failures.author_posts && matches!(query.filter, PostFilter::ByAuthors(_)) {
            return Err(Self::outage("author posts"));
        }
        self.inner.fetch_posts(query, exclude).await
    }

    async fn fetch_post_ids(
        &self,
        filter: &PostFilter,
        exclude: &ExclusionSet,
    ) -> Result<Vec<PostId>, RepositoryError> {
        if self.failures.posts {
            return Err(Self::outage("posts"));
        }
        self.inner.fetch_post_ids(filter, exclude).await
    }

    async fn record_views(&self, events: &[ViewEvent]) -> Result<(), RepositoryError> {
        self.inner.record_views(events).await
    }

    async fn browse_posts(&self, query: &BrowseQuery) -> Result<Vec<Post>, RepositoryError> {
        self.inner.browse_posts(query).await
    }

    async fn fetch_profiles(&self, usernames: &[String]) -> Result<Vec<Profile>, RepositoryError> {
        if self.failures.profiles {
            return Err(Self::outage("profiles"));
        }
        self.inner.fetch_profiles(usernames).await
    }

    async fn fetch_posts_by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>, RepositoryError> {
        self.inner.fetch_posts_by_ids(ids).await
    }
}

/// A populated network around `me` (Porto, Norte, PT):
/// - friends f1..f3, 5 posts each (ids 100..)
/// - followed g1..g5, 5 posts each (ids 200..)
/// - local authors in Porto, 5 posts (ids 300..)
/// - 40 posts by strangers without location (ids 1..=40)
pub async fn populated_network() -> Arc<InMemoryContentRepository> {
    let repo = Arc::new(InMemoryContentRepository::new());
    repo.insert_user(User::new("me").with_location(Some("Porto"), Some("Norte"), Some("PT")))
        .await;
    repo.insert_profile(Profile {
        username: "f1".to_string(),
        display_name: Some("Friend One".to_string()),
        avatar_url: Some("https://cdn.example/f1.png".to_string()),
    })
    .await;

    let mut next_id = 100;
    for i in 1..=3 {
        let friend = format!("f{}", i);
        repo.insert_user(User::new(friend.as_str())).await;
        let edge = if i % 2 == 0 {
            Relationship::new(friend.as_str(), "me", RelationshipStatus::Accepted)
        } else {
            Relationship::new("me", friend.as_str(), RelationshipStatus::Accepted)
        };
        repo.insert_relationship(edge).await;
        for n in 0..5 {
            repo.insert_post(post(next_id, &friend, 2 + n, 10 * n)).await;
            next_id += 1;
        }
    }

    next_id = 200;
    for i in 1..=5 {
        let followed = format!("g{}", i);
        repo.insert_user(User::new(followed.as_str())).await;
        repo.insert_relationship(Relationship::new(
            "me",
            followed.as_str(),
            RelationshipStatus::OneWay,
        ))
        .await;
        for n in 0..5 {
            repo.insert_post(post(next_id, &followed, 3 + n, n)).await;
            next_id += 1;
        }
    }

    repo.insert_user(User::new("local").with_location(Some("Porto"), Some("Norte"), Some("PT")))
        .await;
    for n in 0..5 {
        repo.insert_post(post(300 + n, "local", 5 + n, 20 - n)).await;
    }

    for id in 1..=40 {
        repo.insert_post(post(id, &format!("stranger{}", id % 7), id, 0))
            .await;
    }

    repo
}

/// A user with no edges and no location
pub async fn add_loner(repo: &InMemoryContentRepository, username: &str) {
    repo.insert_user(User::new(username)).await;
}
