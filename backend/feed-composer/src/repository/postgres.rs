use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use super::{
    BrowseQuery, ContentRepository, PostFilter, PostOrder, PostQuery, RepositoryError,
};
use crate::models::{
    ExclusionSet, Post, PostId, Profile, Relationship, RelationshipStatus, User, ViewEvent,
};

const POST_COLUMNS: &str = r#"
SELECT p.id, p.author, p.content, p.category, p.metadata, p.reply_to,
       p.likes, p.hearts, p.comment_count, p.created_at
FROM posts p
"#;

#[derive(sqlx::FromRow)]
struct RelationshipRow {
    initiator: String,
    target: String,
    status: String,
}

/// PostgreSQL content repository (schema in `migrations/`)
#[derive(Clone)]
pub struct PgContentRepository {
    pool: PgPool,
}

impl PgContentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_order(builder: &mut QueryBuilder<'static, Postgres>, order: PostOrder) {
        builder.push(match order {
            PostOrder::Newest => " ORDER BY p.created_at DESC, p.id DESC",
            PostOrder::Engagement => {
                " ORDER BY (p.likes + p.hearts + p.comment_count) DESC, p.created_at DESC, p.id DESC"
            }
            PostOrder::Popularity => {
                " ORDER BY (p.likes + p.hearts) DESC, p.created_at DESC, p.id DESC"
            }
        });
    }

    /// WHERE clause for a post filter plus the exclusion set
    fn push_filter(
        builder: &mut QueryBuilder<'static, Postgres>,
        filter: &PostFilter,
        exclude: &ExclusionSet,
    ) {
        match filter {
            PostFilter::CreatedSince(since) => {
                builder.push(" WHERE p.created_at > ").push_bind(*since);
            }
            PostFilter::ByAuthors(authors) => {
                builder.push(" WHERE p.author = ANY(").push_bind(authors.clone()).push(")");
            }
            PostFilter::ByLocation {
                field,
                value,
                since,
                exclude_author,
            } => {
                builder
                    .push(" JOIN users u ON u.username = p.author WHERE u.")
                    .push(field.column())
                    .push(" = ")
                    .push_bind(value.clone())
                    .push(" AND p.created_at > ")
                    .push_bind(*since)
                    .push(" AND p.author <> ")
                    .push_bind(exclude_author.clone());
            }
        }

        if !exclude.is_empty() {
            builder
                .push(" AND NOT (p.id = ANY(")
                .push_bind(exclude.to_vec())
                .push("))");
        }
    }

    fn post_query(query: &PostQuery, exclude: &ExclusionSet) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(POST_COLUMNS);
        Self::push_filter(&mut builder, &query.filter, exclude);
        Self::push_order(&mut builder, query.order);
        builder.push(" LIMIT ").push_bind(query.limit as i64);
        builder
    }

    fn post_id_query(filter: &PostFilter, exclude: &ExclusionSet) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new("SELECT p.id FROM posts p");
        Self::push_filter(&mut builder, filter, exclude);
        builder.push(" ORDER BY p.id");
        builder
    }

    /// Keyword is a literal substring, so `%` and `_` carry no pattern meaning
    fn browse_query(query: &BrowseQuery) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(POST_COLUMNS);
        builder.push(" WHERE TRUE");

        if let Some(keyword) = &query.keyword {
            builder
                .push(" AND strpos(lower(p.content), lower(")
                .push_bind(keyword.clone())
                .push(")) > 0");
        }
        if let Some(category) = &query.category {
            builder.push(" AND p.category = ").push_bind(category.clone());
        }
        if let Some(since) = query.since {
            builder.push(" AND p.created_at >= ").push_bind(since);
        }
        if let Some(until) = query.until {
            builder.push(" AND p.created_at < ").push_bind(until);
        }

        Self::push_order(&mut builder, PostOrder::Newest);
        builder
            .push(" LIMIT ")
            .push_bind(query.limit as i64)
            .push(" OFFSET ")
            .push_bind(query.offset as i64);
        builder
    }
}

#[async_trait]
impl ContentRepository for PgContentRepository {
    async fn fetch_user(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT username, city, region, country
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn fetch_relationships(
        &self,
        username: &str,
    ) -> Result<Vec<Relationship>, RepositoryError> {
        let rows = sqlx::query_as::<_, RelationshipRow>(
            r#"
            SELECT initiator, target, status
            FROM relationships
            WHERE initiator = $1 OR target = $1
            "#,
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        let edges: Vec<Relationship> = rows
            .into_iter()
            .filter_map(|row| {
                RelationshipStatus::parse(&row.status)
                    .map(|status| Relationship::new(row.initiator, row.target, status))
            })
            .collect();

        debug!("Loaded {} relationship edges for {}", edges.len(), username);
        Ok(edges)
    }

    async fn fetch_recent_views(
        &self,
        username: &str,
        since: DateTime<Utc>,
        cap: usize,
    ) -> Result<Vec<ViewEvent>, RepositoryError> {
        let views = sqlx::query_as::<_, ViewEvent>(
            r#"
            SELECT username, post_id, viewed_at
            FROM post_views
            WHERE username = $1 AND viewed_at >= $2
            ORDER BY viewed_at DESC
            LIMIT $3
            "#,
        )
        .bind(username)
        .bind(since)
        .bind(cap as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(views)
    }

    async fn fetch_posts(
        &self,
        query: &PostQuery,
        exclude: &ExclusionSet,
    ) -> Result<Vec<Post>, RepositoryError> {
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let mut builder = Self::post_query(query, exclude);
        let posts = builder
            .build_query_as::<Post>()
            .fetch_all(&self.pool)
            .await?;

        Ok(posts)
    }

    async fn fetch_post_ids(
        &self,
        filter: &PostFilter,
        exclude: &ExclusionSet,
    ) -> Result<Vec<PostId>, RepositoryError> {
        let ids = Self::post_id_query(filter, exclude)
            .build_query_scalar::<PostId>()
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    async fn record_views(&self, events: &[ViewEvent]) -> Result<(), RepositoryError> {
        if events.is_empty() {
            return Ok(());
        }

        let usernames: Vec<String> = events.iter().map(|e| e.username.clone()).collect();
        let post_ids: Vec<PostId> = events.iter().map(|e| e.post_id).collect();
        let viewed_at: Vec<DateTime<Utc>> = events.iter().map(|e| e.viewed_at).collect();

        sqlx::query(
            r#"
            INSERT INTO post_views (username, post_id, viewed_at)
            SELECT * FROM UNNEST($1::text[], $2::bigint[], $3::timestamptz[])
            "#,
        )
        .bind(usernames)
        .bind(post_ids)
        .bind(viewed_at)
        .execute(&self.pool)
        .await?;

        debug!("Recorded {} view events", events.len());
        Ok(())
    }

    async fn browse_posts(&self, query: &BrowseQuery) -> Result<Vec<Post>, RepositoryError> {
        let mut builder = Self::browse_query(query);
        let posts = builder
            .build_query_as::<Post>()
            .fetch_all(&self.pool)
            .await?;

        Ok(posts)
    }

    async fn fetch_profiles(&self, usernames: &[String]) -> Result<Vec<Profile>, RepositoryError> {
        if usernames.is_empty() {
            return Ok(Vec::new());
        }

        let profiles = sqlx::query_as::<_, Profile>(
            r#"
            SELECT username, display_name, avatar_url
            FROM users
            WHERE username = ANY($1)
            "#,
        )
        .bind(usernames.to_vec())
        .fetch_all(&self.pool)
        .await?;

        Ok(profiles)
    }

    async fn fetch_posts_by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Postgres>::new(POST_COLUMNS);
        builder
            .push(" WHERE p.id = ANY(")
            .push_bind(ids.to_vec())
            .push(")");

        let posts = builder
            .build_query_as::<Post>()
            .fetch_all(&self.pool)
            .await?;

        Ok(posts)
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
