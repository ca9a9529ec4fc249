/// Feed API handlers
///
/// Personalized pages, view recording and the plain post listing
use actix_web::{get, post, web, HttpResponse};
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::error::{AppError, FeedError, Result};
use crate::metrics;
use crate::models::{FeedPage, FeedResponse, PostId, PostListResponse};
use crate::services::{BrowseParams, FeedRequest, FeedService};

pub struct FeedHandlerState {
    pub service: Arc<FeedService>,
}

#[derive(Debug, Deserialize)]
pub struct FeedQueryParams {
    pub user_id: Option<String>,
    /// Kept as text so malformed values get the JSON error body
    pub page_size: Option<String>,
    /// Comma-separated post ids the client already holds
    pub exclude: Option<String>,
}

impl FeedQueryParams {
    fn user_id(&self) -> Result<String> {
        self.user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("user_id is required".to_string()))
    }

    fn page_size(&self) -> Result<Option<usize>> {
        match self.page_size.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse::<usize>().map(Some).map_err(|_| {
                AppError::BadRequest(format!("page_size must be a positive integer, got {raw}"))
            }),
        }
    }

    fn exclude(&self) -> Result<Vec<PostId>> {
        parse_id_list(self.exclude.as_deref().unwrap_or(""))
    }
}

fn parse_id_list(raw: &str) -> Result<Vec<PostId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<PostId>()
                .map_err(|_| AppError::BadRequest(format!("invalid post id in exclude: {s}")))
        })
        .collect()
}

fn outcome_label(result: &std::result::Result<FeedPage, FeedError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(FeedError::UserNotFound(_)) => "not_found",
        Err(FeedError::UpstreamUnavailable(_)) => "unavailable",
        Err(FeedError::InvalidRequest(_)) => "invalid",
    }
}

/// GET /api/v1/feed?user_id=&page_size=&exclude=
#[get("/feed")]
pub async fn get_feed(
    query: web::Query<FeedQueryParams>,
    state: web::Data<FeedHandlerState>,
) -> Result<HttpResponse> {
    let start = Instant::now();
    let request = FeedRequest {
        user_id: query.user_id()?,
        page_size: query.page_size()?,
        exclude: query.exclude()?,
    };
    let page_size = request
        .page_size
        .unwrap_or(state.service.config().default_page_size);

    let mut rng = StdRng::from_entropy();
    let result = state
        .service
        .build_feed(&request, Utc::now(), &mut rng)
        .await;
    metrics::record_request_duration(outcome_label(&result), start.elapsed());
    let page = result?;

    let posts = state.service.enrich_page(&page).await;
    debug!(
        user_id = %request.user_id,
        delivered = posts.len(),
        composition_fallback = page.composition_fallback,
        "Serving feed"
    );

    Ok(HttpResponse::Ok().json(FeedResponse {
        posts,
        composition: page.composition,
        has_more: true,
        page_size,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RecordViewsRequest {
    pub user_id: String,
    pub post_ids: Vec<PostId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordViewsResponse {
    pub recorded: usize,
}

/// POST /api/v1/views
#[post("/views")]
pub async fn record_views(
    body: web::Json<RecordViewsRequest>,
    state: web::Data<FeedHandlerState>,
) -> Result<HttpResponse> {
    let recorded = state
        .service
        .record_views(&body.user_id, &body.post_ids, Utc::now())
        .await?;

    debug!(user_id = %body.user_id, recorded, "Recorded views");
    Ok(HttpResponse::Ok().json(RecordViewsResponse { recorded }))
}

#[derive(Debug, Deserialize)]
pub struct BrowseQueryParams {
    /// Keyword matched against the post content
    pub q: Option<String>,
    pub category: Option<String>,
    /// RFC 3339 timestamp or unix seconds
    pub since: Option<String>,
    pub until: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

fn parse_timestamp(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    if let Ok(secs) = raw.parse::<i64>() {
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .map(Some)
            .ok_or_else(|| AppError::BadRequest(format!("{name} is out of range")));
    }

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|_| AppError::BadRequest(format!("{name} must be RFC 3339 or unix seconds")))
}

/// GET /api/v1/posts?q=&category=&since=&until=&limit=&offset=
#[get("/posts")]
pub async fn browse_posts(
    query: web::Query<BrowseQueryParams>,
    state: web::Data<FeedHandlerState>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let params = BrowseParams {
        since: parse_timestamp("since", query.since.as_deref())?,
        until: parse_timestamp("until", query.until.as_deref())?,
        keyword: query.q,
        category: query.category,
        limit: query.limit,
        offset: query.offset,
    };

    let (posts, limit, offset) = state.service.browse(params).await?;
    let has_more = posts.len() == limit;

    Ok(HttpResponse::Ok().json(PostListResponse {
        posts,
        limit,
        offset,
        has_more,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclude_list_parsing() {
        assert_eq!(parse_id_list("1, 2,,3").unwrap(), vec![1, 2, 3]);
        assert!(parse_id_list("").unwrap().is_empty());
        assert!(parse_id_list("1,abc").is_err());
    }

    #[test]
    fn test_page_size_must_be_numeric() {
        let params = FeedQueryParams {
            user_id: Some("me".to_string()),
            page_size: Some("-3".to_string()),
            exclude: None,
        };
        assert!(params.page_size().is_err());

        let params = FeedQueryParams {
            user_id: Some(" ".to_string()),
            page_size: Some("12".to_string()),
            exclude: None,
        };
        assert_eq!(params.page_size().unwrap(), Some(12));
        assert!(params.user_id().is_err());
    }

    #[test]
    fn test_timestamps_accept_rfc3339_and_unix_seconds() {
        let rfc = parse_timestamp("since", Some("2024-05-01T12:00:00Z")).unwrap();
        let unix = parse_timestamp("since", Some("1714564800")).unwrap();
        assert_eq!(rfc, unix);
        assert!(parse_timestamp("since", Some("yesterday")).is_err());
        assert_eq!(parse_timestamp("since", None).unwrap(), None);
    }
}
