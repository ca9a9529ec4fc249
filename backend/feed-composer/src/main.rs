use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_composer::config::Config;
use feed_composer::handlers::{self, FeedHandlerState};
use feed_composer::repository::{ContentRepository, PgContentRepository};
use feed_composer::services::FeedService;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration loading failed: {:#}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting feed-composer v{}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.env);

    let pool = match PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
        .connect(&config.database.url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Database pool creation failed: {:#}", e);
            eprintln!("ERROR: Failed to create database pool: {}", e);
            std::process::exit(1);
        }
    };

    if config.database.run_migrations {
        if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
            tracing::error!("Database migration failed: {:#}", e);
            eprintln!("ERROR: Failed to run migrations: {}", e);
            std::process::exit(1);
        }
        info!("Database migrations applied");
    }

    let repo: Arc<dyn ContentRepository> = Arc::new(PgContentRepository::new(pool));
    let service = Arc::new(FeedService::new(repo, config.feed.clone()));
    let state = web::Data::new(FeedHandlerState { service });

    info!(
        default_page_size = config.feed.default_page_size,
        max_page_size = config.feed.max_page_size,
        "Feed service initialized"
    );

    let bind_addr = format!("{}:{}", config.app.host, config.app.port);
    info!("HTTP server listening on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind(bind_addr)?
    .run()
    .await
}
