//! Authentication configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const INSECURE_DEFAULT_SECRET: &str = "dev-secret-change-in-production";
const MIN_SECRET_LENGTH: usize = 32;

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Development mode: cookies are issued without the Secure flag and a
    /// throwaway signing secret is generated when none is configured.
    pub dev_mode: bool,

    /// JWT secret for HS256. Supports `env:VAR_NAME`.
    /// REQUIRED when dev_mode is false.
    pub jwt_secret: Option<String>,

    /// Lifetime of issued tokens.
    pub token_ttl_hours: i64,

    /// Allowed CORS origins. If empty, CORS is disabled.
    pub allowed_origins: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            // No default JWT secret - must be explicitly configured
            jwt_secret: None,
            token_ttl_hours: 24,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

impl AuthConfig {
    /// Resolve the JWT secret, expanding `env:VAR_NAME` syntax.
    pub fn resolve_jwt_secret(&self) -> Result<Option<String>, ConfigValidationError> {
        match &self.jwt_secret {
            None => Ok(None),
            Some(value) => {
                if let Some(var_name) = value.strip_prefix("env:") {
                    match std::env::var(var_name) {
                        Ok(secret) if !secret.is_empty() => Ok(Some(secret)),
                        Ok(_) => Err(ConfigValidationError::EnvVarEmpty(var_name.to_string())),
                        Err(_) => Err(ConfigValidationError::EnvVarNotFound(var_name.to_string())),
                    }
                } else {
                    Ok(Some(value.clone()))
                }
            }
        }
    }

    /// Validate the configuration for the current mode.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.token_ttl_hours <= 0 {
            return Err(ConfigValidationError::InvalidTokenTtl);
        }

        if !self.dev_mode {
            let secret = self
                .resolve_jwt_secret()?
                .ok_or(ConfigValidationError::MissingJwtSecret)?;

            if secret == INSECURE_DEFAULT_SECRET {
                return Err(ConfigValidationError::InsecureJwtSecret);
            }
            if secret.len() < MIN_SECRET_LENGTH {
                return Err(ConfigValidationError::JwtSecretTooShort);
            }
        }

        Ok(())
    }

    /// Generate a random JWT secret from the OS-backed thread RNG.
    pub fn generate_jwt_secret() -> String {
        use rand::Rng;

        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        const SECRET_LENGTH: usize = 64;

        let mut rng = rand::rng();
        (0..SECRET_LENGTH)
            .map(|_| {
                let idx = rng.random_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect()
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error(
        "JWT secret is required when dev_mode is false. Set ACADEMY__AUTH__JWT_SECRET or auth.jwt_secret in config."
    )]
    MissingJwtSecret,

    #[error("JWT secret cannot be the default insecure value in production.")]
    InsecureJwtSecret,

    #[error("JWT secret must be at least 32 characters long.")]
    JwtSecretTooShort,

    #[error("token_ttl_hours must be positive.")]
    InvalidTokenTtl,

    #[error("Environment variable '{0}' not found (referenced via env:{0} in config).")]
    EnvVarNotFound(String),

    #[error("Environment variable '{0}' is empty (referenced via env:{0} in config).")]
    EnvVarEmpty(String),
}
