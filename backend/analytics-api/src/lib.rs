use axum::{
    http::{header, HeaderName, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{AnalyticsError, AnalyticsResult};
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(middlewares::trace::TRACE_ID_HEADER),
        ])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    handlers::metrics_auth_middleware,
                )),
        )
        .nest(
            "/api/v1/analytics",
            analytics_routes()
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::auth::auth_middleware,
                ))
                .layer(cors),
        )
        .with_state(app_state)
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn analytics_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/basic", get(handlers::analytics::get_basic_stats))
        .route("/monthly", get(handlers::analytics::get_monthly_progress))
        .route("/study-time", get(handlers::analytics::get_study_time))
        .route(
            "/study-time/reset",
            post(handlers::analytics::reset_study_time),
        )
        .route("/skills", get(handlers::analytics::get_skill_scores))
        .route("/dashboard", get(handlers::analytics::get_dashboard))
        .route(
            "/progress",
            get(handlers::analytics::get_user_progress)
                .delete(handlers::analytics::reset_progress),
        )
        .route(
            "/progress/refresh",
            post(handlers::analytics::refresh_user_progress),
        )
        .route("/answers", post(handlers::analytics::record_answer))
}
