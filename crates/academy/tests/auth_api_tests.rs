//! Authentication gate and login integration tests.

use academy::auth::{AuthConfig, AuthState, Claims, Role};
use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::{TestApp, body_json, test_app};

async fn get_with_cookie(app: &TestApp, uri: &str, cookie: &str) -> axum::response::Response {
    app.router
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .method(Method::GET)
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app().await;

    let response = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = test_app().await;

    let response = app.send(Method::GET, "/teachers", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json, json!({ "success": false, "message": "Not authorized" }));
}

#[tokio::test]
async fn test_student_token_on_admin_route_is_forbidden() {
    let app = test_app().await;

    let response = app
        .send(Method::GET, "/teachers", Some(&app.student_token), None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json, json!({ "success": false, "message": "Access denied" }));

    let response = app
        .send(Method::GET, "/auth/student/me", Some(&app.admin_token), None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_expired_token_is_unauthorized() {
    let app = test_app().await;
    let past = Utc::now() - Duration::hours(1);
    let token = app
        .auth
        .sign(&Claims {
            sub: app.admin.id.clone(),
            role: Role::Admin,
            exp: past.timestamp(),
            iat: Some((past - Duration::hours(24)).timestamp()),
            iss: Some("academy".to_string()),
        })
        .unwrap();

    let response = app.send(Method::GET, "/teachers", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Not authorized");
}

#[tokio::test]
async fn test_foreign_signature_is_unauthorized() {
    let app = test_app().await;
    let other = AuthState::new(AuthConfig {
        jwt_secret: Some("another-secret-that-is-also-at-least-32-chars".to_string()),
        ..AuthConfig::default()
    });
    let token = other.issue_token(&app.admin).unwrap();

    let response = app.send(Method::GET, "/teachers", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(Method::GET, "/teachers", Some("not-a-jwt"), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_for_unknown_principal_is_unauthorized() {
    let app = test_app().await;
    let mut ghost = app.admin.clone();
    ghost.id = "adm_deleted".to_string();
    let token = app.auth.issue_token(&ghost).unwrap();

    let response = app.send(Method::GET, "/teachers", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cookie_credentials() {
    let app = test_app().await;

    let cookie = format!("theme=dark; token={}", app.admin_token);
    let response = get_with_cookie(&app, "/auth/admin/me", &cookie).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["user"]["id"], app.admin.id.as_str());
    assert_eq!(json["user"]["role"], "admin");
    assert_eq!(json["user"]["permissions"], json!(["payroll"]));

    let cookie = format!("authToken={}", app.admin_token);
    let response = get_with_cookie(&app, "/auth/admin/me", &cookie).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = format!("studentToken={}", app.student_token);
    let response = get_with_cookie(&app, "/auth/student/me", &cookie).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["user"]["id"], app.student.id.as_str());
    assert_eq!(json["user"]["role"], "student");

    // A student cookie is not an admin credential
    let response = get_with_cookie(&app, "/auth/admin/me", &cookie).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_login() {
    let app = test_app().await;

    let response = app
        .send(
            Method::POST,
            "/auth/admin/login",
            None,
            Some(json!({ "email": "ADMIN@academy.test", "password": "admin-password" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Secure"));
    assert!(cookie.contains("Max-Age=86400"));

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["user"]["email"], "admin@academy.test");
    let token = json["token"].as_str().unwrap().to_string();

    let response = app.send(Method::GET, "/teachers", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_student_login_and_role_separation() {
    let app = test_app().await;

    let response = app
        .send(
            Method::POST,
            "/auth/student/login",
            None,
            Some(json!({ "email": "sam@academy.test", "password": "student-password" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = body_json(response).await;
    let token = json["token"].as_str().unwrap().to_string();

    let response = app.send(Method::GET, "/teachers", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Student credentials do not work against the admin login
    let response = app
        .send(
            Method::POST,
            "/auth/admin/login",
            None,
            Some(json!({ "email": "sam@academy.test", "password": "student-password" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_rejections() {
    let app = test_app().await;

    let response = app
        .send(
            Method::POST,
            "/auth/admin/login",
            None,
            Some(json!({ "email": "admin@academy.test", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    let json = body_json(response).await;
    assert_eq!(json["message"], "Invalid email or password");

    let response = app
        .send(
            Method::POST,
            "/auth/admin/login",
            None,
            Some(json!({ "email": "nobody@academy.test", "password": "whatever" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(
            Method::POST,
            "/auth/admin/login",
            None,
            Some(json!({ "email": "admin@academy.test" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logout_clears_all_cookies() {
    let app = test_app().await;

    let response = app.send(Method::POST, "/auth/logout", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok().map(str::to_string))
        .collect();
    assert_eq!(cookies.len(), 3);
    for name in ["token=", "authToken=", "studentToken="] {
        assert!(
            cookies
                .iter()
                .any(|c| c.starts_with(name) && c.contains("Max-Age=0")),
            "{name}"
        );
    }
}
