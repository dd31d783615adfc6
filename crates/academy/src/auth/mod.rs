//! Authentication module.
//!
//! Provides a role-parameterized JWT gate:
//! - credentials from named cookies or `Authorization: Bearer`
//! - HS256 verification with expiry
//! - principal resolution against a per-role store

mod claims;
mod config;
mod error;
mod middleware;
mod store;

pub use claims::{Claims, Role};
pub use config::{AuthConfig, ConfigValidationError};
pub use error::AuthError;
pub use middleware::{
    ADMIN_COOKIE, ADMIN_COOKIE_LEGACY, AuthState, CurrentPrincipal, RoleGate, STUDENT_COOKIE,
    authenticate,
};
pub use store::{NewPrincipal, Principal, PrincipalStore, SqlitePrincipalStore};
