use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{
    BrowseQuery, ContentRepository, PostFilter, PostOrder, PostQuery, RepositoryError,
};
use crate::models::{ExclusionSet, Post, PostId, Profile, Relationship, User, ViewEvent};

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, User>,
    profiles: HashMap<String, Profile>,
    relationships: Vec<Relationship>,
    posts: Vec<Post>,
    views: Vec<ViewEvent>,
}

/// In-process content store with the same query semantics as the PostgreSQL one.
/// Used for embedding the core without a database and in tests.
#[derive(Default)]
pub struct InMemoryContentRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryContentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        let mut state = self.state.write().await;
        state.users.insert(user.username.clone(), user);
    }

    pub async fn insert_profile(&self, profile: Profile) {
        let mut state = self.state.write().await;
        state.profiles.insert(profile.username.clone(), profile);
    }

    pub async fn insert_relationship(&self, relationship: Relationship) {
        self.state.write().await.relationships.push(relationship);
    }

    pub async fn insert_post(&self, post: Post) {
        self.state.write().await.posts.push(post);
    }

    pub async fn view_count(&self) -> usize {
        self.state.read().await.views.len()
    }

    fn author_location<'a>(
        users: &'a HashMap<String, User>,
        author: &str,
        field: super::LocationField,
    ) -> Option<&'a str> {
        users.get(author).and_then(|user| field.value_for(user))
    }

    fn matches(users: &HashMap<String, User>, post: &Post, filter: &PostFilter) -> bool {
        match filter {
            PostFilter::CreatedSince(since) => post.created_at > *since,
            PostFilter::ByAuthors(authors) => authors.iter().any(|a| *a == post.author),
            PostFilter::ByLocation {
                field,
                value,
                since,
                exclude_author,
            } => {
                post.author != *exclude_author
                    && post.created_at > *since
                    && Self::author_location(users, &post.author, *field) == Some(value.as_str())
            }
        }
    }

    fn sort(posts: &mut [Post], order: PostOrder) {
        match order {
            PostOrder::Newest => posts.sort_by_key(|p| Reverse((p.created_at, p.id))),
            PostOrder::Engagement => {
                posts.sort_by_key(|p| Reverse((p.engagement_score(), p.created_at, p.id)))
            }
            PostOrder::Popularity => {
                posts.sort_by_key(|p| Reverse((p.popularity(), p.created_at, p.id)))
            }
        }
    }
}

#[async_trait]
impl ContentRepository for InMemoryContentRepository {
    async fn fetch_user(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.read().await.users.get(username).cloned())
    }

    async fn fetch_relationships(
        &self,
        username: &str,
    ) -> Result<Vec<Relationship>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .relationships
            .iter()
            .filter(|edge| edge.initiator == username || edge.target == username)
            .cloned()
            .collect())
    }

    async fn fetch_recent_views(
        &self,
        username: &str,
        since: DateTime<Utc>,
        cap: usize,
    ) -> Result<Vec<ViewEvent>, RepositoryError> {
        let state = self.state.read().await;
        let mut views: Vec<ViewEvent> = state
            .views
            .iter()
            .filter(|v| v.username == username && v.viewed_at >= since)
            .cloned()
            .collect();
        views.sort_by_key(|v| Reverse(v.viewed_at));
        views.truncate(cap);
        Ok(views)
    }

    async fn fetch_posts(
        &self,
        query: &PostQuery,
        exclude: &ExclusionSet,
    ) -> Result<Vec<Post>, RepositoryError> {
        let state = self.state.read().await;

        let mut posts: Vec<Post> = state
            .posts
            .iter()
            .filter(|post| !exclude.contains(post.id))
            .filter(|post| Self::matches(&state.users, post, &query.filter))
            .cloned()
            .collect();

        Self::sort(&mut posts, query.order);
        posts.truncate(query.limit);
        Ok(posts)
    }

    async fn fetch_post_ids(
        &self,
        filter: &PostFilter,
        exclude: &ExclusionSet,
    ) -> Result<Vec<PostId>, RepositoryError> {
        let state = self.state.read().await;
        let mut ids: Vec<PostId> = state
            .posts
            .iter()
            .filter(|post| !exclude.contains(post.id))
            .filter(|post| Self::matches(&state.users, post, filter))
            .map(|post| post.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn record_views(&self, events: &[ViewEvent]) -> Result<(), RepositoryError> {
        self.state.write().await.views.extend_from_slice(events);
        Ok(())
    }

    async fn browse_posts(&self, query: &BrowseQuery) -> Result<Vec<Post>, RepositoryError> {
        let state = self.state.read().await;
        let keyword = query.keyword.as_ref().map(|k| k.to_lowercase());

        let mut posts: Vec<Post> = state
            .posts
            .iter()
            .filter(|p| {
                keyword
                    .as_ref()
                    .map_or(true, |k| p.content.to_lowercase().contains(k.as_str()))
            })
            .filter(|p| {
                query
                    .category
                    .as_ref()
                    .map_or(true, |c| p.category.as_ref() == Some(c))
            })
            .filter(|p| query.since.map_or(true, |since| p.created_at >= since))
            .filter(|p| query.until.map_or(true, |until| p.created_at < until))
            .cloned()
            .collect();

        Self::sort(&mut posts, PostOrder::Newest);
        Ok(posts
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn fetch_profiles(&self, usernames: &[String]) -> Result<Vec<Profile>, RepositoryError> {
        let state = self.state.read().await;
        Ok(usernames
            .iter()
            .filter_map(|name| state.profiles.get(name).cloned())
            .collect())
    }

    async fn fetch_posts_by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .posts
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::LocationField;
    use chrono::Duration;

    fn post(id: PostId, author: &str, age_hours: i64, likes: i64) -> Post {
        Post {
            id,
            author: author.to_string(),
            content: format!("post {}", id),
            category: None,
            metadata: None,
            reply_to: None,
            likes,
            hearts: 0,
            comment_count: 0,
            created_at: Utc::now() - Duration::hours(age_hours),
        }
    }

    #[tokio::test]
    async fn test_fetch_posts_honors_exclusion_order_and_limit() {
        let repo = InMemoryContentRepository::new();
        for (id, age) in [(1, 5), (2, 1), (3, 3), (4, 2)] {
            repo.insert_post(post(id, "alice", age, 0)).await;
        }

        let query = PostQuery {
            filter: PostFilter::ByAuthors(vec!["alice".to_string()]),
            order: PostOrder::Newest,
            limit: 2,
        };
        let exclude: ExclusionSet = [2].into_iter().collect();

        let posts = repo.fetch_posts(&query, &exclude).await.unwrap();
        let ids: Vec<PostId> = posts.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[tokio::test]
    async fn test_location_filter_skips_own_posts() {
        let repo = InMemoryContentRepository::new();
        repo.insert_user(User::new("me").with_location(Some("Oslo"), None, None))
            .await;
        repo.insert_user(User::new("neighbor").with_location(Some("Oslo"), None, None))
            .await;
        repo.insert_post(post(1, "me", 1, 50)).await;
        repo.insert_post(post(2, "neighbor", 1, 10)).await;

        let query = PostQuery {
            filter: PostFilter::ByLocation {
                field: LocationField::City,
                value: "Oslo".to_string(),
                since: Utc::now() - Duration::days(3),
                exclude_author: "me".to_string(),
            },
            order: PostOrder::Popularity,
            limit: 10,
        };

        let posts = repo.fetch_posts(&query, &ExclusionSet::new()).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].author, "neighbor");
    }

    #[tokio::test]
    async fn test_post_ids_cover_the_whole_window() {
        let repo = InMemoryContentRepository::new();
        let now = Utc::now();
        for id in (1..=600).rev() {
            repo.insert_post(Post {
                created_at: now - Duration::minutes(15 * id),
                ..post(id, "alice", 0, 0)
            })
            .await;
        }
        // exactly on the window edge, not strictly newer
        repo.insert_post(Post {
            created_at: now - Duration::days(7),
            ..post(700, "alice", 0, 0)
        })
        .await;
        let exclude: ExclusionSet = [3].into_iter().collect();

        let ids = repo
            .fetch_post_ids(&PostFilter::CreatedSince(now - Duration::days(7)), &exclude)
            .await
            .unwrap();

        assert_eq!(ids.len(), 599);
        assert_eq!(ids.first(), Some(&1));
        assert_eq!(ids.last(), Some(&600));
        assert!(!ids.contains(&3));
        assert!(!ids.contains(&700));
    }

    #[tokio::test]
    async fn test_recent_views_are_capped_most_recent_first() {
        let repo = InMemoryContentRepository::new();
        let now = Utc::now();
        let events: Vec<ViewEvent> = (0..5)
            .map(|i| ViewEvent {
                username: "alice".to_string(),
                post_id: i,
                viewed_at: now - Duration::minutes(i),
            })
            .collect();
        repo.record_views(&events).await.unwrap();

        let views = repo
            .fetch_recent_views("alice", now - Duration::days(1), 3)
            .await
            .unwrap();
        let ids: Vec<PostId> = views.iter().map(|v| v.post_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
