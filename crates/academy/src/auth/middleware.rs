//! Authentication middleware.

use axum::{
    extract::{FromRequestParts, State},
    http::{
        HeaderMap,
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
    },
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{AuthConfig, AuthError, Claims, Principal, PrincipalStore, Role};

/// Cookie carrying an admin credential.
pub const ADMIN_COOKIE: &str = "token";
/// Legacy admin cookie name, still accepted.
pub const ADMIN_COOKIE_LEGACY: &str = "authToken";
/// Cookie carrying a student credential.
pub const STUDENT_COOKIE: &str = "studentToken";

const TOKEN_ISSUER: &str = "academy";

/// Extract a Bearer token from an Authorization header value.
fn bearer_token_from_header(header_value: &str) -> Option<&str> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next()?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    Some(token)
}

fn token_from_cookie_header<'a>(cookie_header: &'a str, cookie_name: &str) -> Option<&'a str> {
    cookie_header.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name.trim() == cookie_name {
            Some(value.trim()).filter(|v| !v.is_empty())
        } else {
            None
        }
    })
}

/// Find the credential for a gate: named cookies first, then the bearer header.
fn extract_credential<'a>(headers: &'a HeaderMap, cookie_names: &[&str]) -> Option<&'a str> {
    let from_cookie = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .find_map(|cookie_header| {
            cookie_names
                .iter()
                .find_map(|name| token_from_cookie_header(cookie_header, name))
        });

    from_cookie.or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(bearer_token_from_header)
    })
}

/// Token signing and verification shared across gates.
#[derive(Clone)]
pub struct AuthState {
    config: Arc<AuthConfig>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthState {
    /// Create new auth state from config.
    ///
    /// Resolves `env:VAR_NAME` syntax in jwt_secret at construction time. In dev
    /// mode without a configured secret, a random one is generated, so tokens do
    /// not survive a restart.
    pub fn new(mut config: AuthConfig) -> Self {
        let secret = match config.resolve_jwt_secret() {
            Ok(Some(resolved)) => resolved,
            _ => {
                warn!("No usable JWT secret configured; generating an ephemeral one");
                AuthConfig::generate_jwt_secret()
            }
        };
        config.jwt_secret = Some(secret.clone());

        Self {
            config: Arc::new(config),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Check if dev mode is enabled.
    pub fn is_dev_mode(&self) -> bool {
        self.config.dev_mode
    }

    /// Get allowed CORS origins from config.
    pub fn allowed_origins(&self) -> &[String] {
        &self.config.allowed_origins
    }

    /// Token lifetime in seconds, used for cookie Max-Age.
    pub fn token_ttl_secs(&self) -> i64 {
        self.config.token_ttl_hours * 3600
    }

    /// Verify and decode a token.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.required_spec_claims.clear();
        validation.required_spec_claims.insert("exp".to_string());

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| AuthError::InvalidCredential(format!("{:?}", e.kind())))?;

        Ok(token_data.claims)
    }

    /// Issue a signed token for a principal.
    pub fn issue_token(&self, principal: &Principal) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: principal.id.clone(),
            role: principal.role,
            exp: (now + Duration::hours(self.config.token_ttl_hours)).timestamp(),
            iat: Some(now.timestamp()),
            iss: Some(TOKEN_ISSUER.to_string()),
        };
        self.sign(&claims)
    }

    /// Sign arbitrary claims.
    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }
}

/// One parameterized authenticate-as-role gate.
///
/// Each route class installs a gate configured with its expected role, the
/// cookie names it accepts and the store its principals live in.
#[derive(Clone)]
pub struct RoleGate {
    auth: AuthState,
    role: Role,
    cookie_names: &'static [&'static str],
    store: Arc<dyn PrincipalStore>,
}

impl RoleGate {
    /// Create a gate for an arbitrary role.
    pub fn new(
        auth: AuthState,
        role: Role,
        cookie_names: &'static [&'static str],
        store: Arc<dyn PrincipalStore>,
    ) -> Self {
        debug_assert_eq!(store.role(), role);
        Self {
            auth,
            role,
            cookie_names,
            store,
        }
    }

    /// Gate for admin-only routes.
    pub fn admin(auth: AuthState, store: Arc<dyn PrincipalStore>) -> Self {
        Self::new(
            auth,
            Role::Admin,
            &[ADMIN_COOKIE, ADMIN_COOKIE_LEGACY],
            store,
        )
    }

    /// Gate for student-only routes.
    pub fn student(auth: AuthState, store: Arc<dyn PrincipalStore>) -> Self {
        Self::new(auth, Role::Student, &[STUDENT_COOKIE], store)
    }

    /// Expected role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Principal store behind this gate.
    pub fn store(&self) -> &Arc<dyn PrincipalStore> {
        &self.store
    }

    /// Authenticate request headers against this gate.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let token = extract_credential(headers, self.cookie_names)
            .ok_or_else(|| AuthError::Unauthenticated("no credential".to_string()))?;

        let claims = self.auth.validate_token(token)?;

        if claims.role != self.role {
            return Err(AuthError::Forbidden {
                expected: self.role,
                actual: claims.role,
            });
        }

        let principal = self
            .store
            .find_principal(&claims.sub)
            .await
            .map_err(|e| AuthError::Internal(format!("{e:#}")))?
            .ok_or_else(|| AuthError::Unauthenticated("principal not found".to_string()))?;

        debug!(principal_id = %principal.id, role = %self.role, "Authenticated");
        Ok(principal)
    }
}

/// Authenticated principal extracted from request.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(CurrentPrincipal)
            .ok_or_else(|| AuthError::Unauthenticated("route is not behind a gate".to_string()))
    }
}

/// Authentication middleware.
///
/// Short-circuits with 401/403 on failure; on success the resolved
/// [`Principal`] is injected into request extensions.
pub async fn authenticate(
    State(gate): State<RoleGate>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let principal = gate.authenticate(req.headers()).await?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

#[cfg(test)]
#[allow(clippy::field_reassign_with_default)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::http::HeaderValue;

    struct FixedStore {
        role: Role,
        principals: Vec<Principal>,
    }

    #[async_trait]
    impl PrincipalStore for FixedStore {
        fn role(&self) -> Role {
            self.role
        }

        async fn find_principal(&self, id: &str) -> Result<Option<Principal>> {
            Ok(self.principals.iter().find(|p| p.id == id).cloned())
        }

        async fn verify_login(&self, _email: &str, _password: &str) -> Result<Option<Principal>> {
            Ok(None)
        }
    }

    fn principal(id: &str, role: Role) -> Principal {
        Principal {
            id: id.to_string(),
            name: id.to_string(),
            email: format!("{id}@school.test"),
            role,
            permissions: vec![],
        }
    }

    fn auth_state() -> AuthState {
        let mut config = AuthConfig::default();
        config.jwt_secret = Some("test-secret-for-unit-tests-minimum-32-chars-long".to_string());
        AuthState::new(config)
    }

    fn admin_gate(auth: &AuthState) -> RoleGate {
        RoleGate::admin(
            auth.clone(),
            Arc::new(FixedStore {
                role: Role::Admin,
                principals: vec![principal("adm_1", Role::Admin)],
            }),
        )
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_bearer_token_from_header() {
        assert_eq!(bearer_token_from_header("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token_from_header("bearer   token123"), Some("token123"));
        for case in ["", "Bearer", "Token something", "Bearer token extra"] {
            assert!(bearer_token_from_header(case).is_none(), "{case} should fail");
        }
    }

    #[test]
    fn test_token_from_cookie_header() {
        let header = "theme=dark; token=abc; studentToken=xyz";
        assert_eq!(token_from_cookie_header(header, "token"), Some("abc"));
        assert_eq!(token_from_cookie_header(header, "studentToken"), Some("xyz"));
        assert_eq!(token_from_cookie_header(header, "authToken"), None);
        assert_eq!(token_from_cookie_header("token=", "token"), None);
    }

    #[test]
    fn test_cookie_takes_precedence_over_header() {
        let map = headers(&[
            ("cookie", "authToken=from-cookie"),
            ("authorization", "Bearer from-header"),
        ]);
        assert_eq!(
            extract_credential(&map, &[ADMIN_COOKIE, ADMIN_COOKIE_LEGACY]),
            Some("from-cookie")
        );

        let map = headers(&[("authorization", "Bearer from-header")]);
        assert_eq!(
            extract_credential(&map, &[STUDENT_COOKIE]),
            Some("from-header")
        );
    }

    #[test]
    fn test_issue_and_validate_token() {
        let auth = auth_state();
        let token = auth.issue_token(&principal("adm_1", Role::Admin)).unwrap();
        let claims = auth.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "adm_1");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.iss.as_deref(), Some("academy"));
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let auth = auth_state();
        let mut other_config = AuthConfig::default();
        other_config.jwt_secret = Some("another-secret-for-unit-tests-min-32-chars".to_string());
        let other = AuthState::new(other_config);

        let token = other.issue_token(&principal("adm_1", Role::Admin)).unwrap();
        assert!(matches!(
            auth.validate_token(&token),
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn test_gate_accepts_matching_role() {
        let auth = auth_state();
        let gate = admin_gate(&auth);
        let token = auth.issue_token(&principal("adm_1", Role::Admin)).unwrap();

        let cookie = format!("token={token}");
        let p = gate
            .authenticate(&headers(&[("cookie", cookie.as_str())]))
            .await
            .unwrap();
        assert_eq!(p.id, "adm_1");
    }

    #[tokio::test]
    async fn test_gate_failures() {
        let auth = auth_state();
        let gate = admin_gate(&auth);

        // No credential
        assert!(matches!(
            gate.authenticate(&HeaderMap::new()).await,
            Err(AuthError::Unauthenticated(_))
        ));

        // Garbage credential
        assert!(matches!(
            gate.authenticate(&headers(&[("authorization", "Bearer not-a-jwt")]))
                .await,
            Err(AuthError::InvalidCredential(_))
        ));

        // Wrong role
        let student_token = auth.issue_token(&principal("stu_1", Role::Student)).unwrap();
        let bearer = format!("Bearer {student_token}");
        assert!(matches!(
            gate.authenticate(&headers(&[("authorization", bearer.as_str())]))
                .await,
            Err(AuthError::Forbidden { .. })
        ));

        // Valid admin token for a principal that no longer exists
        let ghost = auth.issue_token(&principal("adm_ghost", Role::Admin)).unwrap();
        let bearer = format!("Bearer {ghost}");
        assert!(matches!(
            gate.authenticate(&headers(&[("authorization", bearer.as_str())]))
                .await,
            Err(AuthError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_gate_rejects_expired_token() {
        let auth = auth_state();
        let gate = admin_gate(&auth);
        let expired = auth
            .sign(&Claims {
                sub: "adm_1".to_string(),
                role: Role::Admin,
                exp: Utc::now().timestamp() - 60,
                iat: None,
                iss: None,
            })
            .unwrap();

        let bearer = format!("Bearer {expired}");
        assert!(matches!(
            gate.authenticate(&headers(&[("authorization", bearer.as_str())]))
                .await,
            Err(AuthError::InvalidCredential(_))
        ));
    }
}
