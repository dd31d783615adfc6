//! Principal stores backing the auth gate.

use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, instrument};

use super::Role;

/// An authenticated actor resolved from a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Administrative permissions. Always empty for students.
    pub permissions: Vec<String>,
}

/// Lookup of principals for one role.
///
/// Implementations never load password hashes into a [`Principal`].
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Role of every principal in this store.
    fn role(&self) -> Role;

    /// Resolve a principal by ID.
    async fn find_principal(&self, id: &str) -> Result<Option<Principal>>;

    /// Check login credentials, returning the principal on success.
    async fn verify_login(&self, email: &str, password: &str) -> Result<Option<Principal>>;
}

/// Request to register a new principal.
#[derive(Debug, Clone, Default)]
pub struct NewPrincipal {
    pub name: String,
    pub email: String,
    pub password: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, FromRow)]
struct PrincipalRow {
    id: String,
    name: String,
    email: String,
    permissions: String,
}

#[derive(Debug, FromRow)]
struct CredentialRow {
    id: String,
    password_hash: String,
}

/// SQLite-backed principal store (`admins` or `students` table).
#[derive(Debug, Clone)]
pub struct SqlitePrincipalStore {
    pool: SqlitePool,
    role: Role,
    hash_cost: u32,
    /// Hash at `hash_cost` checked on unknown emails so both login paths
    /// pay for one bcrypt verify.
    dummy_hash: Arc<OnceLock<String>>,
}

impl SqlitePrincipalStore {
    /// Store over the `admins` table.
    pub fn admins(pool: SqlitePool) -> Self {
        Self {
            pool,
            role: Role::Admin,
            hash_cost: bcrypt::DEFAULT_COST,
            dummy_hash: Arc::default(),
        }
    }

    /// Store over the `students` table.
    pub fn students(pool: SqlitePool) -> Self {
        Self {
            pool,
            role: Role::Student,
            hash_cost: bcrypt::DEFAULT_COST,
            dummy_hash: Arc::default(),
        }
    }

    /// Override the bcrypt cost (tests use the minimum).
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self.dummy_hash = Arc::default();
        self
    }

    fn dummy_hash(&self) -> &str {
        self.dummy_hash.get_or_init(|| {
            bcrypt::hash("not-a-real-password", self.hash_cost).unwrap_or_default()
        })
    }

    fn table(&self) -> &'static str {
        match self.role {
            Role::Admin => "admins",
            Role::Student => "students",
        }
    }

    fn id_prefix(&self) -> &'static str {
        match self.role {
            Role::Admin => "adm",
            Role::Student => "stu",
        }
    }

    fn permissions_column(&self) -> &'static str {
        match self.role {
            Role::Admin => "permissions",
            Role::Student => "'[]' AS permissions",
        }
    }

    fn principal_from_row(&self, row: PrincipalRow) -> Result<Principal> {
        let permissions: Vec<String> =
            serde_json::from_str(&row.permissions).context("decoding permissions")?;
        Ok(Principal {
            id: row.id,
            name: row.name,
            email: row.email,
            role: self.role,
            permissions,
        })
    }

    /// Register a new principal with a bcrypt-hashed password.
    #[instrument(skip(self, request), fields(role = %self.role, email = %request.email))]
    pub async fn create(&self, request: NewPrincipal) -> Result<Principal> {
        let name = request.name.trim();
        let email = request.email.trim().to_lowercase();
        if name.is_empty() {
            bail!("Name must not be empty.");
        }
        if !email.contains('@') {
            bail!("Invalid email format.");
        }
        if request.password.len() < 6 {
            bail!("Password must be at least 6 characters.");
        }
        if self.role == Role::Student && !request.permissions.is_empty() {
            bail!("Students cannot hold permissions.");
        }

        let id = format!("{}_{}", self.id_prefix(), nanoid::nanoid!(12));
        let password_hash =
            bcrypt::hash(&request.password, self.hash_cost).context("hashing password")?;

        let result = match self.role {
            Role::Admin => {
                let permissions =
                    serde_json::to_string(&request.permissions).context("encoding permissions")?;
                sqlx::query(
                    "INSERT INTO admins (id, name, email, password_hash, permissions) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&id)
                .bind(name)
                .bind(&email)
                .bind(&password_hash)
                .bind(permissions)
                .execute(&self.pool)
                .await
            }
            Role::Student => {
                sqlx::query(
                    "INSERT INTO students (id, name, email, password_hash) VALUES (?, ?, ?, ?)",
                )
                .bind(&id)
                .bind(name)
                .bind(&email)
                .bind(&password_hash)
                .execute(&self.pool)
                .await
            }
        };

        if let Err(e) = result {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    bail!("Email '{}' is already registered.", email);
                }
            }
            return Err(e).context("inserting principal");
        }

        info!(principal_id = %id, "Created principal");

        self.find_principal(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Principal not found after creation"))
    }
}

#[async_trait]
impl PrincipalStore for SqlitePrincipalStore {
    fn role(&self) -> Role {
        self.role
    }

    #[instrument(skip(self), fields(role = %self.role))]
    async fn find_principal(&self, id: &str) -> Result<Option<Principal>> {
        let sql = format!(
            "SELECT id, name, email, {} FROM {} WHERE id = ?",
            self.permissions_column(),
            self.table()
        );
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("fetching principal")?;

        row.map(|row| self.principal_from_row(row)).transpose()
    }

    #[instrument(skip(self, password), fields(role = %self.role))]
    async fn verify_login(&self, email: &str, password: &str) -> Result<Option<Principal>> {
        let sql = format!(
            "SELECT id, password_hash FROM {} WHERE email = ?",
            self.table()
        );
        let row = sqlx::query_as::<_, CredentialRow>(&sql)
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await
            .context("fetching credentials")?;

        let Some(row) = row else {
            let _ = bcrypt::verify(password, self.dummy_hash());
            debug!("Login for unknown email");
            return Ok(None);
        };

        if !bcrypt::verify(password, &row.password_hash).unwrap_or(false) {
            debug!(principal_id = %row.id, "Login with wrong password");
            return Ok(None);
        }

        self.find_principal(&row.id).await
    }
}
