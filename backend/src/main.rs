//! Stock Allocation Server
//!
//! HTTP adapter over the allocation engine: order reference sequencing,
//! serial number resolution and a PostgreSQL-backed allocation ledger.

use axum::{routing::get, Router};
use shared::events::{EventRegistry, BUILD_ALLOCATION_COMPLETED, SHIPMENT_COMPLETED};
use shared::settings::ReferenceSettings;
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod handlers;
mod models;
mod routes;
mod services;

pub use config::Config;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub references: Arc<ReferenceSettings>,
    pub events: Arc<EventRegistry>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alloc_server=debug,tower_http=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::load()?;
    let references = config.references.settings()?;

    tracing::info!("Starting Stock Allocation Server");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    // Create application state
    let state = AppState {
        db: db_pool,
        config: Arc::new(config.clone()),
        references: Arc::new(references),
        events: Arc::new(event_registry()),
    };

    // Build application
    let app = create_app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Handlers run after a commit has been written
fn event_registry() -> EventRegistry {
    let mut events = EventRegistry::new();

    events.register(SHIPMENT_COMPLETED, |event| {
        tracing::info!(shipment = %event.id, payload = %event.payload, "Shipment completed");
    });
    events.register(BUILD_ALLOCATION_COMPLETED, |event| {
        tracing::info!(build = %event.id, payload = %event.payload, "Build allocation completed");
    });

    events
}

/// Create the application router with all routes and middleware
fn create_app(state: AppState) -> Router {
    let router = Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes());

    with_middleware(router).with_state(state)
}

/// Tracing, compression and CORS, outermost first
fn with_middleware<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(cors),
    )
}

/// Root endpoint
async fn root() -> &'static str {
    "Stock Allocation API v1.0"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    #[test]
    fn test_root_banner() {
        assert_eq!(tokio_test::block_on(root()), "Stock Allocation API v1.0");
    }

    #[test]
    fn test_middleware_answers_cross_origin_requests() {
        let app = with_middleware(Router::new().route("/", get(root)));
        let request = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "http://localhost:5173")
            .body(Body::empty())
            .unwrap();

        let response = tokio_test::block_on(app.oneshot(request)).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[test]
    fn test_event_registry_has_commit_handlers() {
        let events = event_registry();
        assert_eq!(events.handler_count(SHIPMENT_COMPLETED), 1);
        assert_eq!(events.handler_count(BUILD_ALLOCATION_COMPLETED), 1);
    }
}
