//! Test utilities and common setup.

use std::sync::Arc;

use academy::api::{self, AppState};
use academy::auth::{
    AuthConfig, AuthState, NewPrincipal, Principal, RoleGate, SqlitePrincipalStore,
};
use academy::db::Database;
use academy::payroll::{
    CreateTeacherRequest, FixedClock, PayrollRepository, PayrollService, Teacher,
};
use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, header},
};
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test-secret-for-integration-tests-minimum-32-chars";

/// Test application with seeded principals and a pinned clock.
pub struct TestApp {
    pub router: Router,
    pub auth: AuthState,
    pub payroll: Arc<PayrollService>,
    pub clock: Arc<FixedClock>,
    pub admin: Principal,
    pub admin_token: String,
    pub student: Principal,
    pub student_token: String,
}

/// Create a test AuthConfig with a JWT secret for testing.
pub fn test_auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: Some(JWT_SECRET.to_string()),
        ..AuthConfig::default()
    }
}

/// Create a test application. The clock is pinned to 2024-03-15.
pub async fn test_app() -> TestApp {
    test_app_with(false).await
}

pub async fn test_app_with(expose_error_details: bool) -> TestApp {
    let db = Database::in_memory().await.unwrap();

    let admins = SqlitePrincipalStore::admins(db.pool().clone()).with_hash_cost(4);
    let students = SqlitePrincipalStore::students(db.pool().clone()).with_hash_cost(4);

    let admin = admins
        .create(NewPrincipal {
            name: "Office Admin".to_string(),
            email: "admin@academy.test".to_string(),
            password: "admin-password".to_string(),
            permissions: vec!["payroll".to_string()],
        })
        .await
        .unwrap();
    let student = students
        .create(NewPrincipal {
            name: "Sam Student".to_string(),
            email: "sam@academy.test".to_string(),
            password: "student-password".to_string(),
            permissions: Vec::new(),
        })
        .await
        .unwrap();

    let auth = AuthState::new(test_auth_config());
    let admin_token = auth.issue_token(&admin).unwrap();
    let student_token = auth.issue_token(&student).unwrap();

    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap(),
    ));
    let payroll = PayrollService::new(PayrollRepository::new(db.pool().clone()), clock.clone());

    let state = AppState::new(
        payroll,
        auth.clone(),
        RoleGate::admin(auth.clone(), Arc::new(admins)),
        RoleGate::student(auth.clone(), Arc::new(students)),
    )
    .with_error_details(expose_error_details);
    let payroll = state.payroll.clone();

    TestApp {
        router: api::create_router(state),
        auth,
        payroll,
        clock,
        admin,
        admin_token,
        student,
        student_token,
    }
}

impl TestApp {
    /// Register a teacher directly through the service.
    pub async fn teacher(&self, name: &str, base_salary: i64) -> Teacher {
        self.payroll
            .create_teacher(CreateTeacherRequest {
                name: name.to_string(),
                email: None,
                base_salary,
            })
            .await
            .unwrap()
    }

    /// Send a request with an optional bearer token and JSON body.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    pub async fn admin_get(&self, uri: &str) -> Response<Body> {
        self.send(Method::GET, uri, Some(&self.admin_token), None).await
    }

    pub async fn admin_post(&self, uri: &str, body: Value) -> Response<Body> {
        self.send(Method::POST, uri, Some(&self.admin_token), Some(body))
            .await
    }
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
