mod common;

use actix_web::{http::StatusCode, test, web, App};
use serde_json::Value;
use std::sync::Arc;

use common::{populated_network, Failures, FlakyRepository};
use feed_composer::config::FeedConfig;
use feed_composer::handlers::{self, FeedHandlerState};
use feed_composer::models::Post;
use feed_composer::repository::{ContentRepository, InMemoryContentRepository};
use feed_composer::services::FeedService;

fn state(repo: Arc<dyn ContentRepository>) -> web::Data<FeedHandlerState> {
    web::Data::new(FeedHandlerState {
        service: Arc::new(FeedService::new(repo, FeedConfig::default())),
    })
}

macro_rules! app {
    ($repo:expr) => {
        test::init_service(
            App::new()
                .app_data(state($repo))
                .configure(handlers::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn feed_returns_a_full_enriched_page() {
    let repo = populated_network().await;
    let app = app!(repo);

    let req = test::TestRequest::get()
        .uri("/api/v1/feed?user_id=me")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    let posts = body["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 10);
    assert_eq!(body["pageSize"], 10);
    assert_eq!(body["hasMore"], true);
    assert_eq!(body["composition"]["random"], 4);
    assert_eq!(body["composition"]["following"], 3);
    assert_eq!(body["composition"]["friends"], 2);
    assert_eq!(body["composition"]["regional_city"], 1);
    assert!(posts.iter().all(|p| p["source"].is_string()));

    if let Some(from_f1) = posts.iter().find(|p| p["userId"] == "f1") {
        assert_eq!(from_f1["authorDisplayName"], "Friend One");
    }
}

#[actix_web::test]
async fn feed_honors_page_size_and_exclusions() {
    let repo = populated_network().await;
    let app = app!(repo);

    let req = test::TestRequest::get()
        .uri("/api/v1/feed?user_id=me&page_size=5&exclude=1,2,3,200")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    let ids: Vec<i64> = body["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids.len(), 5);
    assert_eq!(body["pageSize"], 5);
    assert!(ids.iter().all(|id| ![1, 2, 3, 200].contains(id)));
}

#[actix_web::test]
async fn feed_rejects_bad_input() {
    let repo = populated_network().await;
    let app = app!(repo);

    for uri in [
        "/api/v1/feed",
        "/api/v1/feed?user_id=",
        "/api/v1/feed?user_id=me&page_size=0",
        "/api/v1/feed?user_id=me&page_size=51",
        "/api/v1/feed?user_id=me&page_size=ten",
        "/api/v1/feed?user_id=me&exclude=1,x",
    ] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "INVALID_REQUEST", "{}", uri);
    }
}

#[actix_web::test]
async fn unknown_user_is_not_found() {
    let repo = populated_network().await;
    let app = app!(repo);

    let req = test::TestRequest::get()
        .uri("/api/v1/feed?user_id=ghost")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "USER_NOT_FOUND");
    assert_eq!(body["status"], 404);
}

#[actix_web::test]
async fn relationship_outage_is_service_unavailable() {
    let inner = populated_network().await;
    let repo = Arc::new(FlakyRepository::new(
        inner,
        Failures {
            relationships: true,
            ..Default::default()
        },
    ));
    let app = app!(repo);

    let req = test::TestRequest::get()
        .uri("/api/v1/feed?user_id=me")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "UPSTREAM_UNAVAILABLE");
    assert!(!body["message"].as_str().unwrap().contains("timed out"));
}

#[actix_web::test]
async fn profile_outage_drops_author_fields_only() {
    let inner = populated_network().await;
    let repo = Arc::new(FlakyRepository::new(
        inner,
        Failures {
            profiles: true,
            ..Default::default()
        },
    ));
    let app = app!(repo);

    let req = test::TestRequest::get()
        .uri("/api/v1/feed?user_id=me")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    let posts = body["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 10);
    assert!(posts.iter().all(|p| p.get("authorDisplayName").is_none()));
}

#[actix_web::test]
async fn recorded_views_are_counted() {
    let repo = populated_network().await;
    let app = app!(repo.clone());

    let req = test::TestRequest::post()
        .uri("/api/v1/views")
        .set_json(serde_json::json!({ "user_id": "me", "post_ids": [1, 2, 2, 424242] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["recorded"], 2);
    assert_eq!(repo.view_count().await, 2);
}

#[actix_web::test]
async fn browse_filters_and_clamps() {
    let repo = Arc::new(InMemoryContentRepository::new());
    for (id, content, category) in [
        (1, "Late night jazz session", Some("music")),
        (2, "jazz brunch", Some("food")),
        (3, "Morning run", Some("sport")),
        (4, "More JAZZ", Some("music")),
    ] {
        repo.insert_post(Post {
            content: content.to_string(),
            category: category.map(str::to_string),
            metadata: Some(r#"{"tags":["weekend"]}"#.to_string()),
            ..common::post(id, "someone", id, 0)
        })
        .await;
    }
    let app = app!(repo);

    let req = test::TestRequest::get()
        .uri("/api/v1/posts?q=jazz&category=music")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let ids: Vec<i64> = body["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 4]);
    assert_eq!(body["posts"][0]["tags"][0], "weekend");
    assert!(body["posts"][0].get("source").is_none());

    let req = test::TestRequest::get()
        .uri("/api/v1/posts?limit=1000")
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["limit"], 100);
    assert_eq!(body["hasMore"], false);

    let req = test::TestRequest::get()
        .uri("/api/v1/posts?since=2024-06-01T00:00:00Z&until=2024-01-01T00:00:00Z")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn health_and_metrics_are_served() {
    let repo = populated_network().await;
    let app = app!(repo);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let feed = test::TestRequest::get()
        .uri("/api/v1/feed?user_id=me")
        .to_request();
    assert_eq!(test::call_service(&app, feed).await.status(), StatusCode::OK);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("feed_candidates_total"));
}
