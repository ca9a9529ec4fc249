pub mod feed;
pub mod health;

use actix_web::web;

pub use feed::{browse_posts, get_feed, record_views, FeedHandlerState};
pub use health::{health_check, metrics_endpoint};

/// Routes: `/health`, `/metrics` and the `/api/v1` feed scope
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(metrics_endpoint)
        .service(
            web::scope("/api/v1")
                .service(get_feed)
                .service(record_views)
                .service(browse_posts),
        );
}
