//! HR Desk Server - resource request approval and loan lifecycle
//!
//! A Rust REST API server for grade and role gated resource requests.

use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hrdesk_server::{
    api,
    config::AppConfig,
    repository::Repository,
    services::{
        email::EmailService, provisioning::MailProvisioner, Collaborators, Services,
    },
    workflow::{RbacPolicy, TracingAuditSink},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("hrdesk_server={},audit=info,tower_http=debug", config.logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting HR Desk Server v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("Database migrations completed");

    let server_host = config.server.host.clone();
    let server_port = config.server.port;

    // Create repository and services
    let repository = Arc::new(Repository::new(pool));
    let collaborators = Collaborators {
        actors: repository.clone(),
        requests: repository.clone(),
        settings: repository,
        provisioner: Arc::new(MailProvisioner::new(EmailService::new(config.email.clone()))),
        audit: Arc::new(TracingAuditSink),
        policy: Arc::new(RbacPolicy),
    };
    let services = Services::new(
        collaborators,
        config.workflow.clone(),
        config.maintenance.clone(),
    );

    // Create application state
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(server_host.parse()?, server_port);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Authentication
        .route("/auth/me", get(api::auth::me))
        // Requests
        .route(
            "/requests",
            get(api::requests::list_requests).post(api::requests::create_request),
        )
        .route(
            "/requests/:id",
            get(api::requests::get_request)
                .put(api::requests::update_request)
                .delete(api::requests::delete_request),
        )
        .route("/requests/:id/submit", post(api::requests::submit_request))
        .route("/requests/:id/endorse", post(api::requests::endorse_request))
        .route("/requests/:id/decision", post(api::requests::decide_request))
        .route("/requests/:id/cancel", post(api::requests::cancel_request))
        .route("/requests/:id/restore", post(api::requests::restore_request))
        // Loans
        .route("/requests/:id/issue", post(api::requests::issue_items))
        .route(
            "/requests/:id/transactions/:transaction_id/return",
            post(api::requests::return_items),
        )
        // Provisioning
        .route("/requests/:id/provisioning", post(api::requests::report_provisioning))
        .route(
            "/requests/:id/provisioning/retry",
            post(api::requests::retry_provisioning),
        )
        // Maintenance
        .route(
            "/maintenance",
            get(api::maintenance::get_maintenance).put(api::maintenance::update_maintenance),
        )
        // Actors
        .route("/actors/:id/roles", put(api::actors::update_roles))
        .route("/actors/:id/grade", put(api::actors::update_grade))
        .with_state(state);

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}
