//! API route definitions.

use axum::http::{HeaderValue, Method, header};
use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::auth::authenticate;

use super::error::expose_error_details;
use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(state.auth.allowed_origins(), state.auth.is_dev_mode());

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Admin-only routes
    let admin_routes = Router::new()
        .route("/advance", post(handlers::grant_advance))
        .route("/payroll/{teacher_id}", get(handlers::get_payroll))
        .route("/finalize", post(handlers::finalize_salary))
        .route(
            "/teachers",
            get(handlers::list_teachers).post(handlers::create_teacher),
        )
        .route("/teachers/{teacher_id}", get(handlers::get_teacher))
        .route(
            "/teachers/{teacher_id}/salary",
            put(handlers::update_salary),
        )
        .route(
            "/teachers/{teacher_id}/advances",
            get(handlers::advance_history),
        )
        .route(
            "/teachers/{teacher_id}/salaries",
            get(handlers::salary_history),
        )
        .route("/auth/admin/me", get(handlers::me))
        .layer(middleware::from_fn_with_state(
            state.admin_gate.clone(),
            authenticate,
        ))
        .with_state(state.clone());

    // Student-only routes
    let student_routes = Router::new()
        .route("/auth/student/me", get(handlers::me))
        .layer(middleware::from_fn_with_state(
            state.student_gate.clone(),
            authenticate,
        ))
        .with_state(state.clone());

    // Public routes (no authentication)
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/admin/login", post(handlers::admin_login))
        .route("/auth/student/login", post(handlers::student_login))
        .route("/auth/logout", post(handlers::logout))
        .with_state(state.clone());

    let router = Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .merge(student_routes);

    let router = if state.expose_error_details {
        tracing::warn!("Internal error details are exposed in API responses");
        router.layer(middleware::from_fn(expose_error_details))
    } else {
        router
    };

    router.layer(cors).layer(trace_layer)
}

/// Build the CORS layer based on configuration.
///
/// In dev mode with no configured origins, allows localhost origins.
/// In production mode, requires explicit origin configuration.
fn build_cors_layer(allowed_origins: &[String], dev_mode: bool) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::OPTIONS];
    let headers = [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::ACCEPT,
        header::ORIGIN,
        header::COOKIE,
    ];

    let mut origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("CORS: Invalid origin in config: {}", origin);
                None
            })
        })
        .collect();

    if dev_mode {
        for origin in [
            "http://localhost:3000",
            "http://localhost:5173",
            "http://127.0.0.1:3000",
            "http://127.0.0.1:5173",
        ] {
            let value = HeaderValue::from_static(origin);
            if !origins.contains(&value) {
                origins.push(value);
            }
        }
    }

    if origins.is_empty() {
        tracing::warn!("CORS: No usable origins configured, denying all cross-origin requests");
        // No allow-origin at all, so not even `Origin: null` is accepted.
        return CorsLayer::new();
    }

    tracing::info!("CORS: Allowing {} origin(s)", origins.len());
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn preflight(cors: CorsLayer, origin: &str) -> Option<HeaderValue> {
        let router = Router::new()
            .route("/health", get(|| async { "ok" }))
            .layer(cors);
        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/health")
                    .header(header::ORIGIN, origin)
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .cloned()
    }

    #[tokio::test]
    async fn test_no_origins_denies_everything() {
        let cors = || build_cors_layer(&[], false);
        assert_eq!(preflight(cors(), "null").await, None);
        assert_eq!(preflight(cors(), "http://localhost:3000").await, None);
    }

    #[tokio::test]
    async fn test_configured_origin_allowed() {
        let origins = vec!["https://office.academy.test".to_string()];
        assert_eq!(
            preflight(build_cors_layer(&origins, false), "https://office.academy.test").await,
            Some(HeaderValue::from_static("https://office.academy.test"))
        );
        assert_eq!(
            preflight(build_cors_layer(&origins, false), "null").await,
            None
        );
    }

    #[tokio::test]
    async fn test_dev_mode_adds_localhost() {
        assert_eq!(
            preflight(build_cors_layer(&[], true), "http://localhost:5173").await,
            Some(HeaderValue::from_static("http://localhost:5173"))
        );
    }
}
