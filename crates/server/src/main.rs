use std::net::SocketAddr;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower::util::ServiceExt;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod middleware;
mod routes;
mod services;
mod timeline;

use services::{ai::AiService, storage::PdfStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "researchhub_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::from_env();

    // Initialize database
    let db = db::Database::connect(&config.database_url).await?;
    db.run_migrations().await?;

    // PDF blob storage for published papers
    let pdf_store = PdfStore::new(&config.storage_path);
    pdf_store.init().await?;

    // Sweep out stale read notifications from previous runs
    match services::notify::cleanup_old(&db.pool).await {
        Ok(removed) if removed > 0 => {
            tracing::info!("removed {removed} old read notifications")
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("notification cleanup failed: {e}"),
    }

    // LLM provider wrapper (chat / proposals / reviews)
    let ai = AiService::from_config(&config);
    if !ai.configured() {
        tracing::warn!("no AI provider configured; AI endpoints will answer 503");
    }

    // Build application state
    let state = AppState {
        db,
        config: config.clone(),
        pdf_store,
        ai,
    };

    // Build protected routes (require authentication)
    let protected_routes = Router::new()
        .nest("/auth", routes::auth::profile_router())
        .nest("/research-projects", routes::research_projects::router())
        .nest("/budgets", routes::budgets::router())
        .nest("/milestones", routes::milestones::router())
        .nest("/notifications", routes::notifications::router())
        .nest("/admin", routes::admin::router())
        .nest("/ai", routes::ai::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    // Papers and surveys mix public and protected routes and carry their
    // own auth layering.
    let api_router = Router::new()
        .nest("/auth", routes::auth::router())
        .nest("/papers", routes::papers::router(state.clone()))
        .nest("/surveys", routes::surveys::router(state.clone()))
        .merge(protected_routes);

    // Build main router with SPA fallback
    let app = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_router)
        .fallback(serve_spa)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn serve_spa(req: Request<Body>) -> Response {
    let path = req.uri().path();

    // Try to serve static file first
    let static_path = format!("static{path}");
    if std::path::Path::new(&static_path).exists() {
        let serve_dir = ServeDir::new("static");
        let res = serve_dir.oneshot(req).await.unwrap();
        return res.into_response();
    }

    // For SPA routes, serve index.html
    match tokio::fs::read("static/index.html").await {
        Ok(contents) => Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/html")
            .body(Body::from(contents))
            .unwrap(),
        Err(_) => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("Not found"))
            .unwrap(),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: db::Database,
    pub config: config::Config,
    pub pdf_store: PdfStore,
    pub ai: AiService,
}
